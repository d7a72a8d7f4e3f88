//! Active liveness checks over face-mesh landmarks.
//!
//! A printed photograph can hold a frontal pose, but it cannot blink on cue or
//! turn its head when prompted. Each scan step asks for one of these actions
//! and this module decides, frame by frame, whether the landmarks show it.
//!
//! The evaluator is stateless: it scores a single frame against a single step.
//! Stickiness (a step passes at most once) is the state machine's job.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs and static images held in front of the camera.
//! - **Does not block:** Video replay of a subject performing the same prompts,
//!   or masks with articulated eyelids.

use crate::landmarks::PointSet;
use crate::scan::{ScanStep, StepOutcome};
use crate::thresholds::Thresholds;

/// Left-eye contour indices, ordered `[corner, top, top, corner, bottom, bottom]`.
pub const LEFT_EYE: [usize; 6] = [33, 159, 145, 133, 153, 144];
/// Right-eye contour indices, same ordering as [`LEFT_EYE`].
pub const RIGHT_EYE: [usize; 6] = [263, 386, 374, 362, 380, 373];

/// Result of scoring one frame against the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEvaluation {
    /// Step outcome for this frame alone. `succeeded` means the frame
    /// satisfies the step; it says nothing about earlier frames.
    pub outcome: StepOutcome,
    /// Whether the frame carried enough landmarks to count as a detection.
    pub detected: bool,
}

impl FrameEvaluation {
    pub fn passed(&self) -> bool {
        self.outcome.succeeded
    }
}

/// Eye aspect ratio: `(|p1 − p5| + |p2 − p4|) / (2 · |p0 − p3|)`.
///
/// Returns `None` if any contour index is missing or the eye has no width.
pub fn eye_aspect_ratio(points: &PointSet, eye: &[usize; 6]) -> Option<f32> {
    let p = |i: usize| points.get(eye[i]);
    let (p0, p1, p2, p3, p4, p5) = (p(0)?, p(1)?, p(2)?, p(3)?, p(4)?, p(5)?);

    let width = p0.distance(p3);
    if width <= f32::EPSILON {
        return None;
    }
    Some((p1.distance(p5) + p2.distance(p4)) / (2.0 * width))
}

/// Mean EAR over both eyes, if both can be measured.
pub fn mean_eye_aspect_ratio(points: &PointSet) -> Option<f32> {
    let left = eye_aspect_ratio(points, &LEFT_EYE)?;
    let right = eye_aspect_ratio(points, &RIGHT_EYE)?;
    Some((left + right) / 2.0)
}

/// Score one frame against `step`.
///
/// Frames below the detection floor never pass, whatever the step.
pub fn evaluate(step: ScanStep, points: &PointSet, thresholds: &Thresholds) -> FrameEvaluation {
    let valid = points.valid_count();
    let detected = thresholds.is_detection(valid);
    let pose = thresholds.pose_confidence(valid);

    let (confidence, passed) = match step {
        ScanStep::Forward => (pose, pose > thresholds.forward_confidence),
        ScanStep::Blink => {
            let blink = mean_eye_aspect_ratio(points)
                .map(|ear| ear < thresholds.blink_ear)
                .unwrap_or(false);
            (if blink { 1.0 } else { 0.0 }, blink)
        }
        ScanStep::Left => {
            let yawed = points
                .nose_tip()
                .map(|n| n.x < thresholds.left_yaw_max)
                .unwrap_or(false);
            (pose, yawed && pose > thresholds.turn_confidence)
        }
        ScanStep::Right => {
            let yawed = points
                .nose_tip()
                .map(|n| n.x > thresholds.right_yaw_min)
                .unwrap_or(false);
            (pose, yawed && pose > thresholds.turn_confidence)
        }
        ScanStep::Done => (0.0, false),
    };

    FrameEvaluation {
        outcome: StepOutcome {
            step,
            confidence,
            succeeded: detected && passed,
        },
        detected,
    }
}
