//! Biocapture core: turns per-frame facial landmarks into a fixed-shape
//! biometric signature through a guided liveness sequence.
//!
//! Everything in this crate is synchronous and free of I/O. Camera ownership,
//! timers and event delivery live in `biocapture-session`.

pub mod capture;
pub mod features;
pub mod fusion;
pub mod landmarks;
pub mod liveness;
pub mod scan;
pub mod synthetic;
pub mod thresholds;

pub use capture::{BiometricCapture, CaptureError, VerificationKind};
pub use features::{extract_ear_side, extract_face, FeatureVector, Side, EAR_DIM, FACE_DIM};
pub use fusion::{aggregate_confidence, merge_ear_vectors};
pub use landmarks::{BoundingBox, Point, PointSet};
pub use liveness::{evaluate, FrameEvaluation};
pub use scan::{FrameVerdict, ScanMachine, ScanStep, StepOutcome, StepOutcomes};
pub use thresholds::Thresholds;
