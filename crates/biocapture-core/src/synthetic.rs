//! Deterministic synthetic face meshes.
//!
//! Used by the demo command and by tests to drive the scan sequence without a
//! camera. Geometry is crude but respects the mesh indices the liveness
//! heuristics read: the nose tip, both eye contours and the jaw line.

use crate::features::Side;
use crate::landmarks::{Point, PointSet, NOSE_TIP};
use crate::liveness::{LEFT_EYE, RIGHT_EYE};

/// Landmark count of a full mesh.
pub const MESH_POINTS: usize = 468;

const GOLDEN_ANGLE: f32 = 2.399_963;
const FACE_RADIUS: f32 = 0.2;
const EYE_WIDTH: f32 = 0.04;

/// Pose parameters for a synthetic frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePose {
    /// Nose-tip x coordinate; the whole face is centred on it.
    pub nose_x: f32,
    /// Eye-aspect-ratio applied to both eyes.
    pub eye_aspect: f32,
    /// Number of landmarks to emit (the mesh is truncated below 468).
    pub points: usize,
}

impl Default for FacePose {
    fn default() -> Self {
        Self {
            nose_x: 0.5,
            eye_aspect: 0.3,
            points: MESH_POINTS,
        }
    }
}

/// Build a mesh for the given pose.
pub fn face(pose: FacePose) -> PointSet {
    let cx = pose.nose_x;
    let cy = 0.5;

    let mut points: Vec<Point> = (0..MESH_POINTS)
        .map(|i| {
            let r = FACE_RADIUS * ((i as f32 + 0.5) / MESH_POINTS as f32).sqrt();
            let theta = i as f32 * GOLDEN_ANGLE;
            Point::new(cx + 0.8 * r * theta.cos(), cy + r * theta.sin())
        })
        .collect();

    place_eye(&mut points, &LEFT_EYE, cx - 0.06, cy - 0.05, pose.eye_aspect);
    place_eye(&mut points, &RIGHT_EYE, cx + 0.06, cy - 0.05, pose.eye_aspect);
    points[NOSE_TIP] = Point::new(cx, cy);

    points.truncate(pose.points);
    PointSet::new(points)
}

/// Lay out a six-point eye contour so its aspect ratio equals `aspect`.
fn place_eye(points: &mut [Point], indices: &[usize; 6], ex: f32, ey: f32, aspect: f32) {
    let w = EYE_WIDTH;
    let h = aspect * w;
    let layout = [
        (ex - w / 2.0, ey),
        (ex - w / 6.0, ey - h / 2.0),
        (ex + w / 6.0, ey - h / 2.0),
        (ex + w / 2.0, ey),
        (ex + w / 6.0, ey + h / 2.0),
        (ex - w / 6.0, ey + h / 2.0),
    ];
    for (&idx, &(x, y)) in indices.iter().zip(layout.iter()) {
        points[idx] = Point::new(x, y);
    }
}

/// Full mesh, looking straight at the camera, eyes open.
pub fn frontal() -> PointSet {
    face(FacePose::default())
}

/// Full frontal mesh with both eyes at the given aspect ratio.
pub fn with_eye_aspect(eye_aspect: f32) -> PointSet {
    face(FacePose {
        eye_aspect,
        ..FacePose::default()
    })
}

/// Full mesh with the head turned towards `side`.
pub fn turned(side: Side) -> PointSet {
    let nose_x = match side {
        Side::Left => 0.30,
        Side::Right => 0.70,
    };
    face(FacePose {
        nose_x,
        ..FacePose::default()
    })
}

/// A complete guided sequence: a missed frame, a frontal hold, a blink,
/// a left turn and a right turn. `None` stands for a frame without a face.
pub fn guided_sequence() -> Vec<Option<PointSet>> {
    vec![
        None,
        Some(frontal()),
        Some(frontal()),
        Some(with_eye_aspect(0.1)),
        Some(frontal()),
        Some(turned(Side::Left)),
        Some(frontal()),
        Some(turned(Side::Right)),
    ]
}
