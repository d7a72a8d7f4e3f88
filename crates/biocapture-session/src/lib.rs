//! Biocapture session: runs one guided liveness scan at a time against a
//! camera and a landmark detector.
//!
//! The controller owns the camera for the lifetime of a session, enforces the
//! init and session deadlines, and publishes [`ScanEvent`]s for feedback.
//! Frame processing happens on a dedicated thread; the deadline timer is a
//! Tokio task.

pub mod attempts;
pub mod camera;
pub mod config;
pub mod controller;
pub mod detector;
pub mod events;

pub use attempts::{AttemptTracker, AttemptsExhausted};
pub use camera::{
    CameraBackend, CameraConstraints, CameraError, CameraGate, CameraRequest, DeviceInfo, Facing,
    Frame, FrameSource,
};
pub use config::SessionConfig;
pub use controller::{
    Canceller, ScanController, ScanMode, SessionError, SessionHandle, SessionSnapshot,
    SessionState,
};
pub use detector::{DetectorError, DetectorFactory, DetectorOptions, LandmarkDetector, RetryPolicy};
pub use events::{EventSink, ScanEvent};
