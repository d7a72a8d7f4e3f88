use serde::{Deserialize, Serialize};

/// Tunable decision thresholds for the liveness steps.
///
/// The defaults are operating points carried over from the field deployment.
/// They have not been calibrated against a labelled dataset; treat them as
/// starting values and override per installation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Landmark count of a complete face mesh. Pose quality is
    /// `valid_points / expected_points`, capped at 1.
    pub expected_points: usize,
    /// A frame counts as a detection only when strictly more valid points
    /// than this are present.
    pub min_valid_points: usize,
    /// Pose quality required to pass the frontal step.
    pub forward_confidence: f32,
    /// Pose quality required to pass either head-turn step.
    pub turn_confidence: f32,
    /// Mean eye-aspect-ratio below which a frame counts as a blink.
    pub blink_ear: f32,
    /// Nose-tip x below which the head counts as turned left.
    pub left_yaw_max: f32,
    /// Nose-tip x above which the head counts as turned right.
    pub right_yaw_min: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            expected_points: 468,
            min_valid_points: 260,
            forward_confidence: 0.7,
            turn_confidence: 0.65,
            blink_ear: 0.20,
            left_yaw_max: 0.35,
            right_yaw_min: 0.65,
        }
    }
}

impl Thresholds {
    /// Pose-quality confidence for a frame with `valid` usable landmarks.
    pub fn pose_confidence(&self, valid: usize) -> f32 {
        if self.expected_points == 0 {
            return 0.0;
        }
        (valid as f32 / self.expected_points as f32).min(1.0)
    }

    /// Whether a frame with `valid` landmarks is a usable detection.
    pub fn is_detection(&self, valid: usize) -> bool {
        valid > self.min_valid_points
    }
}
