use biocapture_core::ScanStep;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notifications for UI and voice feedback.
///
/// Delivery is best effort: a slow or absent subscriber never holds up frame
/// processing, and lagging receivers lose the oldest events.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    StepEntered { session: Uuid, step: ScanStep },
    Progress { session: Uuid, percent: u8 },
    /// The last frame had no usable face. Advisory only.
    NoFace { session: Uuid },
    SessionComplete { session: Uuid, confidence: f32 },
    SessionError { session: Uuid, reason: String },
    SessionCancelled { session: Uuid },
}

impl ScanEvent {
    pub fn session(&self) -> Uuid {
        match self {
            ScanEvent::StepEntered { session, .. }
            | ScanEvent::Progress { session, .. }
            | ScanEvent::NoFace { session }
            | ScanEvent::SessionComplete { session, .. }
            | ScanEvent::SessionError { session, .. }
            | ScanEvent::SessionCancelled { session } => *session,
        }
    }
}

const EVENT_BUFFER: usize = 64;

/// Fire-and-forget publisher of [`ScanEvent`]s.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ScanEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ScanEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}
