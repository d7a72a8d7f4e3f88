use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use biocapture_core::{
    BiometricCapture, CaptureError, FrameVerdict, PointSet, ScanMachine, ScanStep, StepOutcomes,
    VerificationKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use crate::attempts::{AttemptTracker, AttemptsExhausted};
use crate::camera::{self, CameraBackend, CameraClaim, CameraError, CameraGate};
use crate::config::SessionConfig;
use crate::detector::{self, DetectorError, DetectorFactory};
use crate::events::{EventSink, ScanEvent};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),
    #[error("detector initialization failed: {0}")]
    DetectorInitFailure(#[from] DetectorError),
    #[error("scan did not finish within {0:?}")]
    SessionTimeout(Duration),
    #[error("step '{step}' did not pass within {after:?}")]
    StepTimeout { step: ScanStep, after: Duration },
    #[error("scan cancelled")]
    Cancelled,
    #[error(transparent)]
    AttemptsExhausted(#[from] AttemptsExhausted),
    #[error("capture assembly failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("failed to spawn session thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("session thread exited")]
    ChannelClosed,
}

/// Coarse lifecycle of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Initializing,
    Detecting,
    Processing,
    Complete,
    Error,
}

/// Why the capture is being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Registration,
    Verification,
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "verification" => Ok(Self::Verification),
            other => Err(format!("unknown scan mode '{other}'")),
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub mode: ScanMode,
    pub state: SessionState,
    pub current_step: ScanStep,
    pub step_outcomes: StepOutcomes,
    pub progress: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Set once detection starts.
    pub deadline: Option<DateTime<Utc>>,
}

type Reply = oneshot::Sender<Result<BiometricCapture, SessionError>>;

struct Shared {
    snapshot: SessionSnapshot,
    settled: bool,
    reply: Option<Reply>,
    timer: Option<tokio::task::AbortHandle>,
}

/// State reachable from the frame thread, the deadline timer and the caller.
///
/// Every terminal transition goes through [`settle`](Self::settle): the first
/// caller decides the outcome and later calls are no-ops.
struct SessionCore {
    id: Uuid,
    shared: Mutex<Shared>,
    events: EventSink,
}

impl SessionCore {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_settled(&self) -> bool {
        self.lock().settled
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot.clone()
    }

    /// Apply `f` to the snapshot unless the session is already settled.
    fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) -> bool {
        let mut shared = self.lock();
        if shared.settled {
            return false;
        }
        f(&mut shared.snapshot);
        true
    }

    fn set_timer(&self, handle: tokio::task::AbortHandle) {
        let mut shared = self.lock();
        if shared.settled {
            handle.abort();
        } else {
            shared.timer = Some(handle);
        }
    }

    /// Stop deadline enforcement once every step has passed.
    fn disarm_timer(&self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
    }

    fn emit(&self, event: ScanEvent) {
        self.events.emit(event);
    }

    /// Decide the session outcome. Returns false if it was already decided.
    fn settle(&self, result: Result<BiometricCapture, SessionError>) -> bool {
        let mut shared = self.lock();
        if shared.settled {
            return false;
        }
        shared.settled = true;

        let session = self.id;
        match &result {
            Ok(capture) => {
                shared.snapshot.state = SessionState::Complete;
                shared.snapshot.progress = 100;
                tracing::info!(session_id = %session, confidence = capture.confidence(), "scan complete");
                self.events.emit(ScanEvent::SessionComplete {
                    session,
                    confidence: capture.confidence(),
                });
            }
            Err(e) => {
                let snap = &mut shared.snapshot;
                snap.state = match e {
                    SessionError::Cancelled => SessionState::Idle,
                    _ => SessionState::Error,
                };
                snap.current_step = ScanStep::Forward;
                snap.step_outcomes = StepOutcomes::default();
                snap.progress = 0;

                if let SessionError::Cancelled = e {
                    tracing::info!(session_id = %session, "scan cancelled");
                    self.events.emit(ScanEvent::SessionCancelled { session });
                } else {
                    tracing::error!(session_id = %session, error = %e, "scan failed");
                    self.events.emit(ScanEvent::SessionError {
                        session,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(timer) = shared.timer.take() {
            timer.abort();
        }
        if let Some(reply) = shared.reply.take() {
            let _ = reply.send(result);
        }
        true
    }
}

/// Handle to one running scan session.
pub struct SessionHandle {
    core: Arc<SessionCore>,
    reply: oneshot::Receiver<Result<BiometricCapture, SessionError>>,
    exited: oneshot::Receiver<()>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().snapshot.state
    }

    pub fn progress(&self) -> u8 {
        self.core.lock().snapshot.progress
    }

    /// Abandon the session before it completes. Step progress is discarded
    /// and the session returns to `Idle`. Returns false if the session had
    /// already finished.
    ///
    /// The frame being processed, if any, runs to completion; the camera is
    /// released before the next frame would have been read.
    pub fn cancel(&self) -> bool {
        self.core.settle(Err(SessionError::Cancelled))
    }

    /// Detached cancel handle, usable after [`wait`](Self::wait) has taken
    /// the session handle.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            core: Arc::clone(&self.core),
        }
    }

    /// Wait for the session outcome.
    ///
    /// Resolves once the outcome is decided and the session thread has
    /// released the camera.
    pub async fn wait(self) -> Result<BiometricCapture, SessionError> {
        let result = self.reply.await.map_err(|_| SessionError::ChannelClosed)?;
        // Sender is dropped when the session thread exits
        let _ = self.exited.await;
        result
    }
}

/// Cancels one session from another task.
#[derive(Clone)]
pub struct Canceller {
    core: Arc<SessionCore>,
}

impl Canceller {
    /// Same as [`SessionHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.core.settle(Err(SessionError::Cancelled))
    }
}

/// Starts scan sessions and owns the resources they share: the camera, the
/// detector factory, the attempt counter and the event stream.
pub struct ScanController {
    config: SessionConfig,
    camera: Arc<dyn CameraBackend>,
    detector: Arc<dyn DetectorFactory>,
    gate: CameraGate,
    attempts: Arc<Mutex<AttemptTracker>>,
    events: EventSink,
}

impl ScanController {
    pub fn new(
        config: SessionConfig,
        camera: Arc<dyn CameraBackend>,
        detector: Arc<dyn DetectorFactory>,
    ) -> Self {
        let attempts = Arc::new(Mutex::new(AttemptTracker::new(config.max_attempts)));
        Self {
            config,
            camera,
            detector,
            gate: CameraGate::new(),
            attempts,
            events: EventSink::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Attempts used since the last completed capture or reset.
    pub fn attempts_used(&self) -> u32 {
        lock_attempts(&self.attempts).used()
    }

    /// Allow a fresh round of attempts.
    pub fn reset_attempts(&self) {
        lock_attempts(&self.attempts).reset();
    }

    /// Whether a session currently holds the camera.
    pub fn camera_in_use(&self) -> bool {
        self.gate.is_claimed()
    }

    /// Start a scan session.
    ///
    /// Fails immediately if another session holds the camera or the attempt
    /// budget is spent. Everything else is reported through the handle.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; the deadline timer is a
    /// Tokio task.
    pub fn start(
        &self,
        mode: ScanMode,
        kind: VerificationKind,
    ) -> Result<SessionHandle, SessionError> {
        let claim = self.gate.claim()?;
        let attempt = lock_attempts(&self.attempts).begin()?;

        let id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (detecting_tx, detecting_rx) = oneshot::channel();

        let core = Arc::new(SessionCore {
            id,
            shared: Mutex::new(Shared {
                snapshot: SessionSnapshot {
                    id,
                    mode,
                    state: SessionState::Initializing,
                    current_step: ScanStep::Forward,
                    step_outcomes: StepOutcomes::default(),
                    progress: 0,
                    attempts: attempt,
                    max_attempts: self.config.max_attempts,
                    deadline: None,
                },
                settled: false,
                reply: Some(reply_tx),
                timer: None,
            }),
            events: self.events.clone(),
        });

        tracing::info!(
            session_id = %id,
            mode = ?mode,
            kind = ?kind,
            attempt,
            max = self.config.max_attempts,
            "scan session starting"
        );

        let timer = tokio::spawn(run_timer(
            Arc::clone(&core),
            self.config.init_timeout,
            self.config.session_deadline,
            detecting_rx,
        ));
        core.set_timer(timer.abort_handle());

        let session = SessionRun {
            core: Arc::clone(&core),
            claim,
            camera: Arc::clone(&self.camera),
            detector: Arc::clone(&self.detector),
            config: self.config.clone(),
            kind,
            attempts: Arc::clone(&self.attempts),
            detecting: detecting_tx,
            exited: exit_tx,
        };

        let spawned = std::thread::Builder::new()
            .name(format!("biocapture-{}", &id.simple().to_string()[..8]))
            .spawn(move || session.run());
        if let Err(e) = spawned {
            // The closure (and with it the claim) was dropped; tell the waiter.
            core.settle(Err(SessionError::ChannelClosed));
            return Err(SessionError::Spawn(e));
        }

        Ok(SessionHandle {
            core,
            reply: reply_rx,
            exited: exit_rx,
        })
    }
}

fn lock_attempts(attempts: &Mutex<AttemptTracker>) -> MutexGuard<'_, AttemptTracker> {
    attempts.lock().unwrap_or_else(|e| e.into_inner())
}

/// Independent deadline enforcement: first the init timeout, then, once
/// detection has started, the session deadline.
async fn run_timer(
    core: Arc<SessionCore>,
    init_timeout: Duration,
    deadline: Duration,
    detecting: oneshot::Receiver<()>,
) {
    match tokio::time::timeout(init_timeout, detecting).await {
        Ok(Ok(())) => {}
        // Session thread finished during initialization
        Ok(Err(_)) => return,
        Err(_) => {
            core.settle(Err(SessionError::DetectorInitFailure(
                DetectorError::InitTimeout(init_timeout),
            )));
            return;
        }
    }

    tokio::time::sleep(deadline).await;
    if core.settle(Err(SessionError::SessionTimeout(deadline))) {
        tracing::warn!(session_id = %core.id, deadline = ?deadline, "scan deadline exceeded");
    }
}

/// Everything the session thread owns.
struct SessionRun {
    core: Arc<SessionCore>,
    claim: CameraClaim,
    camera: Arc<dyn CameraBackend>,
    detector: Arc<dyn DetectorFactory>,
    config: SessionConfig,
    kind: VerificationKind,
    attempts: Arc<Mutex<AttemptTracker>>,
    detecting: oneshot::Sender<()>,
    exited: oneshot::Sender<()>,
}

impl SessionRun {
    fn run(self) {
        let SessionRun {
            core,
            claim,
            camera,
            detector,
            config,
            kind,
            attempts,
            detecting,
            exited,
        } = self;
        let _unwind = SettleOnUnwind(&core);

        let result = drive(
            &core,
            claim,
            camera.as_ref(),
            detector.as_ref(),
            &config,
            kind,
            detecting,
        );
        let completed = result.is_ok();
        if core.settle(result) && completed {
            lock_attempts(&attempts).record_success();
        }
        drop(exited);
    }
}

/// Settles the session if the session thread panics before deciding it.
struct SettleOnUnwind<'a>(&'a SessionCore);

impl Drop for SettleOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() && self.0.settle(Err(SessionError::ChannelClosed)) {
            tracing::error!(session_id = %self.0.id, "session thread panicked");
        }
    }
}

/// The frame loop. Owns the scan machine and the camera lease; both are
/// dropped on return, whichever path returns.
///
/// When the session was settled elsewhere (timer or cancel) this returns
/// `Cancelled`, which `settle` then ignores.
fn drive(
    core: &SessionCore,
    claim: CameraClaim,
    backend: &dyn CameraBackend,
    detector: &dyn DetectorFactory,
    config: &SessionConfig,
    kind: VerificationKind,
    detecting: oneshot::Sender<()>,
) -> Result<BiometricCapture, SessionError> {
    let session = core.id;

    let source = camera::acquire(backend, &config.camera)?;
    let mut lease = claim.attach(source);
    tracing::info!(session_id = %session, "camera acquired");

    let mut landmarks = detector::initialize_with_retry(
        detector,
        &config.detector,
        &config.retry_policy(),
        || core.is_settled(),
    )?;

    let _ = detecting.send(());
    let deadline = chrono::Duration::from_std(config.session_deadline)
        .ok()
        .map(|d| Utc::now() + d);
    if !core.update(|s| {
        s.state = SessionState::Detecting;
        s.deadline = deadline;
    }) {
        return Err(SessionError::Cancelled);
    }
    core.emit(ScanEvent::StepEntered {
        session,
        step: ScanStep::Forward,
    });

    let mut machine = ScanMachine::new(config.thresholds);
    let mut step_started = Instant::now();

    while !machine.is_done() {
        if core.is_settled() {
            return Err(SessionError::Cancelled);
        }
        if let Some(limit) = config.step_timeout {
            if step_started.elapsed() >= limit {
                return Err(SessionError::StepTimeout {
                    step: machine.current_step(),
                    after: limit,
                });
            }
        }

        let frame = lease.next_frame()?;
        let points = match landmarks.detect(&frame) {
            Ok(points) => points.unwrap_or_default(),
            Err(e) => {
                tracing::debug!(session_id = %session, frame = frame.sequence, error = %e, "frame rejected");
                PointSet::default()
            }
        };

        let verdict = machine.process(&points);
        let outcomes = machine.outcomes().clone();
        let progress = machine.progress();
        let step = machine.current_step();
        core.update(|s| {
            s.current_step = step;
            s.step_outcomes = outcomes;
            s.progress = progress;
        });

        match verdict {
            FrameVerdict::NoFace => core.emit(ScanEvent::NoFace { session }),
            FrameVerdict::Advanced { from, to } => {
                step_started = Instant::now();
                tracing::info!(session_id = %session, from = %from, to = %to, progress, "step passed");
                core.emit(ScanEvent::Progress {
                    session,
                    percent: progress,
                });
                core.emit(ScanEvent::StepEntered { session, step: to });
            }
            FrameVerdict::Holding { .. } | FrameVerdict::Finished => {}
        }
    }

    if !core.update(|s| s.state = SessionState::Processing) {
        return Err(SessionError::Cancelled);
    }
    core.disarm_timer();
    drop(lease);

    if !config.completion_grace.is_zero() {
        std::thread::sleep(config.completion_grace);
    }

    Ok(machine.finish(kind, Utc::now())?)
}
