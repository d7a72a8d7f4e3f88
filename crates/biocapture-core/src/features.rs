//! Fixed-length feature vectors derived from a landmark set.
//!
//! Coordinates are normalized against the bounding box of the whole set, so
//! the vectors do not depend on where the face sits in the frame or how large
//! it appears. They are not pose-invariant.

use serde::{Deserialize, Serialize};

use crate::landmarks::{BoundingBox, Point, PointSet};

/// Length of the face feature vector.
pub const FACE_DIM: usize = 128;
/// Length of each ear feature vector (per side and merged).
pub const EAR_DIM: usize = 64;

/// Mesh indices along the left jaw line towards the ear.
const LEFT_EAR_INDICES: [usize; 12] = [234, 93, 132, 58, 172, 136, 150, 149, 176, 148, 152, 377];
/// Mesh indices along the right jaw line towards the ear.
const RIGHT_EAR_INDICES: [usize; 12] = [454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152, 151];

/// Which side of the face an ear vector describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn indices(self) -> &'static [usize] {
        match self {
            Side::Left => &LEFT_EAR_INDICES,
            Side::Right => &RIGHT_EAR_INDICES,
        }
    }
}

/// A fixed-length feature vector. Serializes as a bare number array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Zero-pad or truncate `values` to exactly `dim` entries.
    pub fn fit(mut values: Vec<f32>, dim: usize) -> Self {
        values.resize(dim, 0.0);
        Self(values)
    }

    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl AsRef<[f32]> for FeatureVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Sample the whole mesh into a [`FACE_DIM`]-float vector.
///
/// Walks the points with stride `max(1, N / 64)` collecting normalized
/// `(x, y)` pairs until the vector is full; short sets are zero-padded.
pub fn extract_face(points: &PointSet) -> FeatureVector {
    let bb = points.bounding_box();
    let stride = (points.len() / 64).max(1);

    let mut coords = Vec::with_capacity(FACE_DIM);
    for p in points.points.iter().step_by(stride) {
        if coords.len() >= FACE_DIM {
            break;
        }
        let (nx, ny) = normalized(&bb, p);
        coords.push(nx);
        coords.push(ny);
    }

    FeatureVector::fit(coords, FACE_DIM)
}

/// Collect the lateral jaw/ear landmarks for `side` into an [`EAR_DIM`]-float vector.
///
/// Indices beyond the end of the set are skipped.
pub fn extract_ear_side(points: &PointSet, side: Side) -> FeatureVector {
    let bb = points.bounding_box();

    let mut coords = Vec::with_capacity(EAR_DIM);
    for p in side.indices().iter().filter_map(|&i| points.get(i)) {
        let (nx, ny) = normalized(&bb, p);
        coords.push(nx);
        coords.push(ny);
    }

    FeatureVector::fit(coords, EAR_DIM)
}

/// Invalid points keep their slot but contribute zeros.
fn normalized(bb: &BoundingBox, p: &Point) -> (f32, f32) {
    if p.is_valid() {
        bb.normalize(p)
    } else {
        (0.0, 0.0)
    }
}
