//! Landmark detection collaborator and its bootstrap.
//!
//! The detector itself is an external capability. This module fixes the
//! shape of the boundary: one initialization per session, then exactly one
//! result per submitted frame, returned before the next frame is submitted.

use std::time::Duration;

use biocapture_core::PointSet;
use serde::Serialize;
use thiserror::Error;

use crate::camera::Frame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("landmark model failed to load: {0}")]
    Load(String),
    #[error("landmark detector not ready after {0:?}")]
    InitTimeout(Duration),
    #[error("landmark inference failed: {0}")]
    Inference(String),
}

/// Options passed to the detector at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectorOptions {
    pub max_faces: u32,
    /// Request the refined eye/iris contour.
    pub refine_landmarks: bool,
    /// Mirror frames so the subject sees themselves naturally.
    pub selfie_mode: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: true,
            selfie_mode: true,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.7,
        }
    }
}

/// A ready detector. Results correspond 1:1 to submitted frames.
pub trait LandmarkDetector: Send {
    /// Landmarks of the single most prominent face, or `None` if no face.
    fn detect(&mut self, frame: &Frame) -> Result<Option<PointSet>, DetectorError>;
}

/// Loads a detector. May be slow (model download, warmup).
pub trait DetectorFactory: Send + Sync {
    fn initialize(&self, options: &DetectorOptions) -> Result<Box<dyn LandmarkDetector>, DetectorError>;
}

/// Bounded retry for detector initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Initialize a detector, retrying up to `policy.attempts` times.
///
/// `abandoned` is polled between attempts; once it reports true the last
/// error is returned without further tries.
pub fn initialize_with_retry(
    factory: &dyn DetectorFactory,
    options: &DetectorOptions,
    policy: &RetryPolicy,
    abandoned: impl Fn() -> bool,
) -> Result<Box<dyn LandmarkDetector>, DetectorError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match factory.initialize(options) {
            Ok(detector) => {
                tracing::info!(attempt, "landmark detector initialized");
                return Ok(detector);
            }
            Err(e) if attempt < attempts && !abandoned() => {
                tracing::warn!(error = %e, attempt, max = attempts, "detector init failed, retrying");
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, attempt, "detector init failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoFace;

    impl LandmarkDetector for NoFace {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<PointSet>, DetectorError> {
            Ok(None)
        }
    }

    /// Fails the first `failures` initializations.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl DetectorFactory for Flaky {
        fn initialize(&self, _options: &DetectorOptions) -> Result<Box<dyn LandmarkDetector>, DetectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(DetectorError::Load(format!("attempt {call}")));
            }
            Ok(Box::new(NoFace))
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_first_try_succeeds() {
        let factory = Flaky::new(0);
        assert!(initialize_with_retry(&factory, &DetectorOptions::default(), &quick(), || false).is_ok());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recovers_within_budget() {
        let factory = Flaky::new(2);
        assert!(initialize_with_retry(&factory, &DetectorOptions::default(), &quick(), || false).is_ok());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let factory = Flaky::new(10);
        let err = initialize_with_retry(&factory, &DetectorOptions::default(), &quick(), || false)
            .err()
            .unwrap();
        assert_eq!(err, DetectorError::Load("attempt 3".into()));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stops_when_abandoned() {
        let factory = Flaky::new(10);
        let result = initialize_with_retry(&factory, &DetectorOptions::default(), &quick(), || true);
        assert!(result.is_err());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_options() {
        let opts = DetectorOptions::default();
        assert_eq!(opts.max_faces, 1);
        assert!(opts.refine_landmarks);
        assert_eq!(opts.min_detection_confidence, 0.7);
    }
}
