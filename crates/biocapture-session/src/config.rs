use std::time::Duration;

use biocapture_core::Thresholds;

use crate::camera::CameraConstraints;
use crate::detector::{DetectorOptions, RetryPolicy};

/// Session configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Liveness decision thresholds.
    pub thresholds: Thresholds,
    /// Preferred camera format for the first acquisition attempt.
    pub camera: CameraConstraints,
    /// Options handed to the landmark detector.
    pub detector: DetectorOptions,
    /// Wall-clock limit for the whole step sequence, counted from the first
    /// detection frame.
    pub session_deadline: Duration,
    /// Limit for camera acquisition plus detector initialization.
    pub init_timeout: Duration,
    /// Limit for any single step. `None` disables the per-step check.
    pub step_timeout: Option<Duration>,
    /// Pause between reaching the last step and handing over the capture, so
    /// feedback can announce completion. Correctness does not depend on it.
    pub completion_grace: Duration,
    /// Scan sessions allowed before the caller must reset.
    pub max_attempts: u32,
    /// Detector initialization attempts, including the first.
    pub detector_retries: u32,
    /// Pause between detector initialization attempts.
    pub detector_retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            camera: CameraConstraints::default(),
            detector: DetectorOptions::default(),
            session_deadline: Duration::from_secs(20),
            init_timeout: Duration::from_secs(10),
            step_timeout: None,
            completion_grace: Duration::from_millis(500),
            max_attempts: 3,
            detector_retries: 3,
            detector_retry_delay: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    /// Load configuration from `BIOCAPTURE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let t = d.thresholds;

        Self {
            thresholds: Thresholds {
                expected_points: env_usize("BIOCAPTURE_EXPECTED_POINTS", t.expected_points),
                min_valid_points: env_usize("BIOCAPTURE_MIN_VALID_POINTS", t.min_valid_points),
                forward_confidence: env_f32("BIOCAPTURE_FORWARD_CONFIDENCE", t.forward_confidence),
                turn_confidence: env_f32("BIOCAPTURE_TURN_CONFIDENCE", t.turn_confidence),
                blink_ear: env_f32("BIOCAPTURE_BLINK_EAR", t.blink_ear),
                left_yaw_max: env_f32("BIOCAPTURE_LEFT_YAW_MAX", t.left_yaw_max),
                right_yaw_min: env_f32("BIOCAPTURE_RIGHT_YAW_MIN", t.right_yaw_min),
            },
            camera: d.camera,
            detector: d.detector,
            session_deadline: Duration::from_secs(env_u64(
                "BIOCAPTURE_SESSION_DEADLINE_SECS",
                d.session_deadline.as_secs(),
            )),
            init_timeout: Duration::from_secs(env_u64(
                "BIOCAPTURE_INIT_TIMEOUT_SECS",
                d.init_timeout.as_secs(),
            )),
            step_timeout: std::env::var("BIOCAPTURE_STEP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
            completion_grace: Duration::from_millis(env_u64(
                "BIOCAPTURE_COMPLETION_GRACE_MS",
                d.completion_grace.as_millis() as u64,
            )),
            max_attempts: env_u32("BIOCAPTURE_MAX_ATTEMPTS", d.max_attempts),
            detector_retries: env_u32("BIOCAPTURE_DETECTOR_RETRIES", d.detector_retries),
            detector_retry_delay: Duration::from_millis(env_u64(
                "BIOCAPTURE_DETECTOR_RETRY_DELAY_MS",
                d.detector_retry_delay.as_millis() as u64,
            )),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.detector_retries,
            delay: self.detector_retry_delay,
        }
    }

    /// Effective configuration as JSON, for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "thresholds": self.thresholds,
            "camera": self.camera,
            "detector": self.detector,
            "session_deadline_secs": self.session_deadline.as_secs_f64(),
            "init_timeout_secs": self.init_timeout.as_secs_f64(),
            "step_timeout_secs": self.step_timeout.map(|d| d.as_secs_f64()),
            "completion_grace_ms": self.completion_grace.as_millis() as u64,
            "max_attempts": self.max_attempts,
            "detector_retries": self.detector_retries,
            "detector_retry_delay_ms": self.detector_retry_delay.as_millis() as u64,
        })
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
