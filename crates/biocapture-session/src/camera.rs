//! Camera collaborator interface, acquisition fallback and the exclusive lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NotFound,
    #[error("camera not supported")]
    Unsupported,
    #[error("camera is in use by another scan session")]
    Busy,
    #[error("camera error: {0}")]
    Device(String),
}

impl CameraError {
    /// Guidance for the person in front of the camera.
    pub fn suggestion(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => "Please allow camera access and try again",
            CameraError::NotFound => "Please connect a camera and try again",
            CameraError::Unsupported => "Try using a different browser or device",
            CameraError::Busy => "Finish or cancel the running scan first",
            CameraError::Device(_) => "Check camera permissions and try again",
        }
    }
}

/// One captured video frame. Pixel layout is whatever the detector expects.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    User,
    Environment,
}

/// Preferred capture format, with hard minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub ideal_fps: u32,
    pub min_fps: u32,
    pub facing: Facing,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            min_width: 320,
            min_height: 240,
            ideal_fps: 30,
            min_fps: 15,
            facing: Facing::User,
        }
    }
}

/// How to ask the backend for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraRequest {
    Preferred(CameraConstraints),
    Any,
    Device(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// An open video stream. Frames arrive in order, one per call.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stop the stream and hand the device back to the system.
    fn stop(&mut self);
}

/// Platform camera access.
pub trait CameraBackend: Send + Sync {
    fn open(&self, request: &CameraRequest) -> Result<Box<dyn FrameSource>, CameraError>;

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError>;
}

/// Open a stream: the preferred format first, then any camera, then the first
/// enumerated video device. Reports the any-camera error if nothing works.
pub fn acquire(
    backend: &dyn CameraBackend,
    constraints: &CameraConstraints,
) -> Result<Box<dyn FrameSource>, CameraError> {
    match backend.open(&CameraRequest::Preferred(*constraints)) {
        Ok(source) => return Ok(source),
        Err(e) => tracing::warn!(error = %e, "preferred camera request failed, trying any camera"),
    }

    let any_err = match backend.open(&CameraRequest::Any) {
        Ok(source) => return Ok(source),
        Err(e) => e,
    };
    tracing::warn!(error = %any_err, "any-camera request failed, enumerating devices");

    let devices = backend.devices()?;
    let Some(first) = devices.first() else {
        return Err(any_err);
    };
    tracing::info!(device = %first.id, label = %first.label, "opening first enumerated camera");
    backend.open(&CameraRequest::Device(first.id.clone()))
}

/// Guards the one camera that all sessions of a controller share.
#[derive(Debug, Clone, Default)]
pub struct CameraGate {
    busy: Arc<AtomicBool>,
}

impl CameraGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the camera for a new session, failing with [`CameraError::Busy`]
    /// if another session holds it.
    pub fn claim(&self) -> Result<CameraClaim, CameraError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CameraError::Busy)?;
        Ok(CameraClaim {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_claimed(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Exclusive right to the camera, before a stream is open.
#[derive(Debug)]
pub struct CameraClaim {
    busy: Arc<AtomicBool>,
}

impl CameraClaim {
    /// Bind an open stream to this claim.
    pub fn attach(self, source: Box<dyn FrameSource>) -> CameraLease {
        CameraLease {
            source,
            _claim: self,
        }
    }
}

impl Drop for CameraClaim {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// An open stream held exclusively by one session.
///
/// Dropping the lease stops the stream and frees the claim, exactly once.
pub struct CameraLease {
    source: Box<dyn FrameSource>,
    _claim: CameraClaim,
}

impl CameraLease {
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.source.next_frame()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.source.stop();
        tracing::debug!("camera released");
    }
}
