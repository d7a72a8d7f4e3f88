//! Recorded landmark streams standing in for a camera and detector.
//!
//! A replay file is JSON Lines: one `{"points": [{"x":..,"y":..}, ...]}`
//! object per frame, or `null` for a frame without a face. Blank lines are
//! skipped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use biocapture_core::PointSet;
use biocapture_session::{
    CameraBackend, CameraError, CameraRequest, DetectorError, DetectorFactory, DetectorOptions,
    DeviceInfo, Frame, FrameSource, LandmarkDetector,
};

pub type Script = Arc<Vec<Option<PointSet>>>;

/// Parse a replay file.
pub fn load(path: &Path) -> Result<Script> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&text).with_context(|| format!("invalid replay file {}", path.display()))
}

pub fn parse(text: &str) -> Result<Script> {
    let mut frames = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame: Option<PointSet> =
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))?;
        frames.push(frame);
    }
    Ok(Arc::new(frames))
}

/// A camera that emits empty frames at a fixed rate, forever.
pub struct ReplayCamera {
    interval: Duration,
}

impl ReplayCamera {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
        }
    }
}

impl CameraBackend for ReplayCamera {
    fn open(&self, request: &CameraRequest) -> Result<Box<dyn FrameSource>, CameraError> {
        tracing::debug!(?request, "opening replay camera");
        Ok(Box::new(ReplayStream {
            interval: self.interval,
            sequence: 0,
        }))
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(vec![DeviceInfo {
            id: "replay-0".into(),
            label: "Replay camera".into(),
        }])
    }
}

struct ReplayStream {
    interval: Duration,
    sequence: u64,
}

impl FrameSource for ReplayStream {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        std::thread::sleep(self.interval);
        self.sequence += 1;
        Ok(Frame {
            sequence: self.sequence,
            ..Frame::default()
        })
    }

    fn stop(&mut self) {
        tracing::debug!(frames = self.sequence, "replay camera stopped");
    }
}

/// Hands out detectors that replay a script frame by frame.
pub struct ReplayDetectorFactory {
    script: Script,
}

impl ReplayDetectorFactory {
    pub fn new(script: Script) -> Self {
        Self { script }
    }
}

impl DetectorFactory for ReplayDetectorFactory {
    fn initialize(
        &self,
        options: &DetectorOptions,
    ) -> Result<Box<dyn LandmarkDetector>, DetectorError> {
        tracing::debug!(frames = self.script.len(), ?options, "replay detector ready");
        Ok(Box::new(ReplayDetector {
            script: Arc::clone(&self.script),
            cursor: 0,
        }))
    }
}

struct ReplayDetector {
    script: Script,
    cursor: usize,
}

impl LandmarkDetector for ReplayDetector {
    /// Past the end of the script every frame is faceless.
    fn detect(&mut self, _frame: &Frame) -> Result<Option<PointSet>, DetectorError> {
        let result = self.script.get(self.cursor).cloned().flatten();
        self.cursor += 1;
        Ok(result)
    }
}
