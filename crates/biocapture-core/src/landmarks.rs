use serde::{Deserialize, Serialize};

/// Landmark index of the nose tip in the 468-point face mesh ordering.
pub const NOSE_TIP: usize = 1;

/// A single predicted landmark in frame-normalized coordinates.
///
/// `x` and `y` are nominally in `[0, 1]`, but detectors occasionally report
/// points slightly outside the frame; these are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    /// Relative depth. Not used by any heuristic; carried for fidelity.
    #[serde(default)]
    pub z: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// A point is valid when both planar coordinates are finite.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Planar Euclidean distance.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned bounding box of a point set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Map a point into box-relative coordinates.
    ///
    /// A degenerate axis (zero extent) divides by 1 instead of 0.
    pub fn normalize(&self, p: &Point) -> (f32, f32) {
        let w = if self.width == 0.0 { 1.0 } else { self.width };
        let h = if self.height == 0.0 { 1.0 } else { self.height };
        ((p.x - self.x) / w, (p.y - self.y) / h)
    }
}

/// The ordered landmarks for one face in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    pub points: Vec<Point>,
}

impl PointSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    /// Number of points with finite coordinates. Used as the detection-confidence proxy.
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_valid()).count()
    }

    pub fn nose_tip(&self) -> Option<&Point> {
        self.get(NOSE_TIP)
    }

    /// Bounding box over the valid points. A set without any valid point
    /// yields the zero box.
    pub fn bounding_box(&self) -> BoundingBox {
        if self.valid_count() == 0 {
            return BoundingBox::default();
        }

        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;

        for p in self.points.iter().filter(|p| p.is_valid()) {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

impl From<Vec<Point>> for PointSet {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}
