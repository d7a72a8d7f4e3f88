use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use biocapture_core::{synthetic, PointSet, ScanStep, VerificationKind};
use biocapture_session::{
    CameraBackend, CameraError, CameraRequest, DetectorError, DetectorFactory, DetectorOptions,
    DeviceInfo, Frame, FrameSource, LandmarkDetector, ScanController, ScanEvent, ScanMode,
    SessionConfig, SessionError, SessionHandle, SessionState,
};
use tokio::sync::broadcast::error::TryRecvError;

struct FakeSource {
    sequence: u64,
    stops: Arc<AtomicUsize>,
}

impl FrameSource for FakeSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        std::thread::sleep(Duration::from_millis(1));
        self.sequence += 1;
        Ok(Frame {
            sequence: self.sequence,
            ..Frame::default()
        })
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeCamera {
    fail: Option<CameraError>,
    stops: Arc<AtomicUsize>,
}

impl CameraBackend for FakeCamera {
    fn open(&self, _request: &CameraRequest) -> Result<Box<dyn FrameSource>, CameraError> {
        if let Some(e) = &self.fail {
            return Err(e.clone());
        }
        Ok(Box::new(FakeSource {
            sequence: 0,
            stops: Arc::clone(&self.stops),
        }))
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(Vec::new())
    }
}

/// Replays a fixed script, then reports no face forever.
struct ScriptedDetector {
    frames: VecDeque<Option<PointSet>>,
}

impl LandmarkDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<PointSet>, DetectorError> {
        Ok(self.frames.pop_front().flatten())
    }
}

#[derive(Default)]
struct ScriptFactory {
    script: Vec<Option<PointSet>>,
    failures: u32,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptFactory {
    fn replaying(script: Vec<Option<PointSet>>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }
}

impl DetectorFactory for ScriptFactory {
    fn initialize(
        &self,
        _options: &DetectorOptions,
    ) -> Result<Box<dyn LandmarkDetector>, DetectorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        std::thread::sleep(self.delay);
        if call <= self.failures {
            return Err(DetectorError::Load(format!("model missing ({call})")));
        }
        Ok(Box::new(ScriptedDetector {
            frames: self.script.iter().cloned().collect(),
        }))
    }
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        session_deadline: Duration::from_secs(5),
        init_timeout: Duration::from_secs(2),
        completion_grace: Duration::ZERO,
        detector_retry_delay: Duration::from_millis(1),
        ..SessionConfig::default()
    }
}

fn controller(
    config: SessionConfig,
    camera: FakeCamera,
    factory: ScriptFactory,
) -> (ScanController, Arc<AtomicUsize>, Arc<ScriptFactory>) {
    let stops = Arc::clone(&camera.stops);
    let factory = Arc::new(factory);
    let controller = ScanController::new(config, Arc::new(camera), factory.clone());
    (controller, stops, factory)
}

async fn wait_for_detecting(handle: &SessionHandle) {
    for _ in 0..400 {
        if handle.state() == SessionState::Detecting {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached Detecting");
}

#[tokio::test]
async fn test_full_sequence_produces_capture() {
    let (controller, stops, _) = controller(
        fast_config(),
        FakeCamera::default(),
        ScriptFactory::replaying(synthetic::guided_sequence()),
    );

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    let capture = handle.wait().await.unwrap();

    capture.validate().unwrap();
    assert_eq!(capture.face_features().len(), 128);
    assert_eq!(capture.ear_features().len(), 64);
    assert!(capture.confidence() >= 0.5 && capture.confidence() <= 0.99);
    assert_eq!(capture.verification_type(), VerificationKind::Both);

    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(!controller.camera_in_use());
    // A completed capture gives the attempt back
    assert_eq!(controller.attempts_used(), 0);
}

#[tokio::test]
async fn test_no_face_until_deadline_times_out() {
    let config = SessionConfig {
        session_deadline: Duration::from_millis(100),
        ..fast_config()
    };
    let (controller, stops, _) =
        controller(config, FakeCamera::default(), ScriptFactory::default());
    let mut events = controller.subscribe();

    let handle = controller
        .start(ScanMode::Verification, VerificationKind::Face)
        .unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(err, SessionError::SessionTimeout(d) if d == Duration::from_millis(100)));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(!controller.camera_in_use());

    // Far more NoFace events than the channel holds; only the newest survive
    let mut saw_no_face = false;
    let mut saw_error = false;
    loop {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        };
        match event {
            ScanEvent::NoFace { .. } => saw_no_face = true,
            ScanEvent::SessionError { reason, .. } => {
                assert!(reason.contains("did not finish"));
                saw_error = true;
            }
            ScanEvent::Progress { .. } | ScanEvent::SessionComplete { .. } => {
                panic!("unexpected {event:?}")
            }
            _ => {}
        }
    }
    assert!(saw_no_face);
    assert!(saw_error);
}

#[tokio::test]
async fn test_cancel_discards_progress() {
    let script = vec![Some(synthetic::frontal())];
    let (controller, stops, _) = controller(
        fast_config(),
        FakeCamera::default(),
        ScriptFactory::replaying(script),
    );

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    wait_for_detecting(&handle).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(handle.cancel());
    assert!(!handle.cancel());

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.current_step, ScanStep::Forward);
    assert_eq!(snapshot.progress, 0);
    assert_eq!(snapshot.step_outcomes.completed_count(), 0);

    assert!(matches!(handle.wait().await, Err(SessionError::Cancelled)));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(!controller.camera_in_use());
}

#[tokio::test]
async fn test_second_session_finds_camera_busy() {
    let (controller, stops, _) = controller(
        fast_config(),
        FakeCamera::default(),
        ScriptFactory::default(),
    );

    let first = controller
        .start(ScanMode::Verification, VerificationKind::Face)
        .unwrap();
    let second = controller.start(ScanMode::Verification, VerificationKind::Face);
    assert!(matches!(
        second,
        Err(SessionError::CameraUnavailable(CameraError::Busy))
    ));
    // Refused before an attempt was counted
    assert_eq!(controller.attempts_used(), 1);

    first.cancel();
    assert!(first.wait().await.is_err());
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    let third = controller
        .start(ScanMode::Verification, VerificationKind::Face)
        .unwrap();
    third.cancel();
    let _ = third.wait().await;
}

#[tokio::test]
async fn test_attempts_are_bounded() {
    let config = SessionConfig {
        max_attempts: 1,
        ..fast_config()
    };
    let (controller, _, _) = controller(config, FakeCamera::default(), ScriptFactory::default());

    let first = controller
        .start(ScanMode::Verification, VerificationKind::Face)
        .unwrap();
    assert_eq!(first.snapshot().attempts, 1);
    assert_eq!(first.snapshot().max_attempts, 1);
    first.cancel();
    let _ = first.wait().await;

    let refused = controller.start(ScanMode::Verification, VerificationKind::Face);
    assert!(matches!(refused, Err(SessionError::AttemptsExhausted(e)) if e.max == 1));
    assert!(!controller.camera_in_use());

    controller.reset_attempts();
    let again = controller
        .start(ScanMode::Verification, VerificationKind::Face)
        .unwrap();
    again.cancel();
    let _ = again.wait().await;
}

#[tokio::test]
async fn test_camera_unavailable_is_fatal() {
    let camera = FakeCamera {
        fail: Some(CameraError::PermissionDenied),
        ..FakeCamera::default()
    };
    let (controller, stops, factory) = controller(fast_config(), camera, ScriptFactory::default());

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::CameraUnavailable(CameraError::PermissionDenied)
    ));
    assert_eq!(stops.load(Ordering::SeqCst), 0);
    assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
    assert!(!controller.camera_in_use());
    assert_eq!(controller.attempts_used(), 1);
}

#[tokio::test]
async fn test_detector_failure_after_retries() {
    let factory = ScriptFactory {
        failures: 10,
        ..ScriptFactory::default()
    };
    let (controller, stops, factory) = controller(fast_config(), FakeCamera::default(), factory);

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::DetectorInitFailure(DetectorError::Load(_))
    ));
    assert_eq!(factory.calls.load(Ordering::SeqCst), 3);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_detector_hits_init_timeout() {
    let config = SessionConfig {
        init_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let factory = ScriptFactory {
        delay: Duration::from_millis(300),
        ..ScriptFactory::default()
    };
    let (controller, stops, _) = controller(config, FakeCamera::default(), factory);

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::DetectorInitFailure(DetectorError::InitTimeout(d)) if d == Duration::from_millis(50)
    ));
    // wait() returns only after the session thread let go of the camera
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

struct PanickingFactory;

impl DetectorFactory for PanickingFactory {
    fn initialize(
        &self,
        _options: &DetectorOptions,
    ) -> Result<Box<dyn LandmarkDetector>, DetectorError> {
        panic!("detector runtime crashed");
    }
}

#[tokio::test]
async fn test_session_thread_panic_resolves_wait() {
    let config = SessionConfig {
        init_timeout: Duration::from_secs(5),
        ..fast_config()
    };
    let camera = FakeCamera::default();
    let stops = Arc::clone(&camera.stops);
    let controller = ScanController::new(config, Arc::new(camera), Arc::new(PanickingFactory));
    let mut events = controller.subscribe();

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("wait() must resolve after the session thread dies");

    assert!(matches!(result, Err(SessionError::ChannelClosed)));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(!controller.camera_in_use());

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::SessionError { .. } = event {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_step_timeout() {
    let config = SessionConfig {
        step_timeout: Some(Duration::from_millis(50)),
        ..fast_config()
    };
    let script = vec![Some(synthetic::frontal())];
    let (controller, stops, _) =
        controller(config, FakeCamera::default(), ScriptFactory::replaying(script));

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::StepTimeout {
            step: ScanStep::Blink,
            ..
        }
    ));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_event_order() {
    let (controller, _, _) = controller(
        fast_config(),
        FakeCamera::default(),
        ScriptFactory::replaying(synthetic::guided_sequence()),
    );
    let mut events = controller.subscribe();

    let handle = controller
        .start(ScanMode::Registration, VerificationKind::Both)
        .unwrap();
    let session = handle.id();
    handle.wait().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.session(), session);
        match event {
            ScanEvent::NoFace { .. } => {}
            ScanEvent::SessionComplete { .. } => seen.push("complete".to_string()),
            ScanEvent::StepEntered { step, .. } => seen.push(format!("enter:{step}")),
            ScanEvent::Progress { percent, .. } => seen.push(format!("progress:{percent}")),
            other => panic!("unexpected {other:?}"),
        }
    }

    assert_eq!(
        seen,
        vec![
            "enter:forward",
            "progress:25",
            "enter:blink",
            "progress:50",
            "enter:left",
            "progress:75",
            "enter:right",
            "progress:100",
            "enter:done",
            "complete",
        ]
    );
}

#[tokio::test]
async fn test_snapshot_while_detecting() {
    let (controller, _, _) = controller(
        fast_config(),
        FakeCamera::default(),
        ScriptFactory::default(),
    );

    let handle = controller
        .start(ScanMode::Verification, VerificationKind::Ear)
        .unwrap();
    wait_for_detecting(&handle).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.id, handle.id());
    assert_eq!(snapshot.mode, ScanMode::Verification);
    assert_eq!(snapshot.current_step, ScanStep::Forward);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.deadline.is_some());
    assert!(controller.camera_in_use());

    handle.cancel();
    let _ = handle.wait().await;
}
