//! The guided scan sequence: frontal pose → blink → left turn → right turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::{BiometricCapture, CaptureError, VerificationKind};
use crate::features::{extract_ear_side, extract_face, FeatureVector, Side};
use crate::landmarks::PointSet;
use crate::liveness::evaluate;
use crate::thresholds::Thresholds;

/// One prompted action in the scan sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStep {
    Forward,
    Blink,
    Left,
    Right,
    Done,
}

impl ScanStep {
    /// The steps that must pass, in order.
    pub const SEQUENCE: [ScanStep; 4] = [
        ScanStep::Forward,
        ScanStep::Blink,
        ScanStep::Left,
        ScanStep::Right,
    ];

    /// The step that follows this one. `Done` is absorbing.
    pub fn next(self) -> ScanStep {
        match self {
            ScanStep::Forward => ScanStep::Blink,
            ScanStep::Blink => ScanStep::Left,
            ScanStep::Left => ScanStep::Right,
            ScanStep::Right | ScanStep::Done => ScanStep::Done,
        }
    }

    fn slot(self) -> Option<usize> {
        match self {
            ScanStep::Forward => Some(0),
            ScanStep::Blink => Some(1),
            ScanStep::Left => Some(2),
            ScanStep::Right => Some(3),
            ScanStep::Done => None,
        }
    }

    /// Guidance to give the subject when this step becomes current.
    pub fn prompt(self) -> &'static str {
        match self {
            ScanStep::Forward => "Look straight at the camera.",
            ScanStep::Blink => "Face detected. Please blink once.",
            ScanStep::Left => "Great. Now turn your head to the left.",
            ScanStep::Right => "Now turn your head to the right.",
            ScanStep::Done => "Biometric scan complete. Thank you.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanStep::Forward => "forward",
            ScanStep::Blink => "blink",
            ScanStep::Left => "left",
            ScanStep::Right => "right",
            ScanStep::Done => "done",
        }
    }
}

impl std::fmt::Display for ScanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence and success flag for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepOutcome {
    pub step: ScanStep,
    /// Latest per-frame quality signal, in `[0, 1]`. Frozen once the step is left.
    pub confidence: f32,
    /// Set at most once and never cleared.
    pub succeeded: bool,
}

impl StepOutcome {
    fn pending(step: ScanStep) -> Self {
        Self {
            step,
            confidence: 0.0,
            succeeded: false,
        }
    }
}

/// Outcomes for the four scored steps, in sequence order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepOutcomes([StepOutcome; 4]);

impl Default for StepOutcomes {
    fn default() -> Self {
        Self(ScanStep::SEQUENCE.map(StepOutcome::pending))
    }
}

impl StepOutcomes {
    /// Build outcomes directly from per-step confidences, all marked succeeded.
    pub fn completed(confidences: [f32; 4]) -> Self {
        let mut outcomes = Self::default();
        for (slot, confidence) in outcomes.0.iter_mut().zip(confidences) {
            slot.confidence = confidence;
            slot.succeeded = true;
        }
        outcomes
    }

    pub fn get(&self, step: ScanStep) -> Option<&StepOutcome> {
        step.slot().map(|i| &self.0[i])
    }

    fn get_mut(&mut self, step: ScanStep) -> Option<&mut StepOutcome> {
        step.slot().map(move |i| &mut self.0[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepOutcome> {
        self.0.iter()
    }

    pub fn completed_count(&self) -> usize {
        self.0.iter().filter(|o| o.succeeded).count()
    }
}

/// What a single frame did to the machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameVerdict {
    /// No usable face in the frame. Transient; the step is unchanged.
    NoFace,
    /// Face seen but the current step is not yet satisfied.
    Holding { step: ScanStep, confidence: f32 },
    /// The step `from` passed; `to` is now current.
    Advanced { from: ScanStep, to: ScanStep },
    /// The sequence had already finished; the frame was ignored.
    Finished,
}

/// Owns step progression and the features captured along the way.
///
/// A session holds exactly one machine and feeds it frames one at a time.
#[derive(Debug, Clone)]
pub struct ScanMachine {
    thresholds: Thresholds,
    step: ScanStep,
    outcomes: StepOutcomes,
    face: Option<FeatureVector>,
    ear_left: Option<FeatureVector>,
    ear_right: Option<FeatureVector>,
}

impl Default for ScanMachine {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl ScanMachine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            step: ScanStep::Forward,
            outcomes: StepOutcomes::default(),
            face: None,
            ear_left: None,
            ear_right: None,
        }
    }

    pub fn current_step(&self) -> ScanStep {
        self.step
    }

    pub fn outcomes(&self) -> &StepOutcomes {
        &self.outcomes
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn is_done(&self) -> bool {
        self.step == ScanStep::Done
    }

    /// Progress in 25-point increments per completed step.
    pub fn progress(&self) -> u8 {
        (self.outcomes.completed_count() * 25) as u8
    }

    /// Apply one frame's landmarks to the current step.
    pub fn process(&mut self, points: &PointSet) -> FrameVerdict {
        let step = self.step;
        if step == ScanStep::Done {
            return FrameVerdict::Finished;
        }
        if points.is_empty() {
            return FrameVerdict::NoFace;
        }

        let eval = evaluate(step, points, &self.thresholds);
        if !eval.detected {
            return FrameVerdict::NoFace;
        }

        let Some(slot) = self.outcomes.get_mut(step) else {
            return FrameVerdict::Finished;
        };
        slot.confidence = eval.outcome.confidence;
        if !eval.passed() || slot.succeeded {
            return FrameVerdict::Holding {
                step,
                confidence: eval.outcome.confidence,
            };
        }

        slot.succeeded = true;
        match step {
            ScanStep::Forward => self.face = Some(extract_face(points)),
            ScanStep::Left => self.ear_left = Some(extract_ear_side(points, Side::Left)),
            ScanStep::Right => self.ear_right = Some(extract_ear_side(points, Side::Right)),
            ScanStep::Blink | ScanStep::Done => {}
        }

        let next = step.next();
        if let Some(entered) = self.outcomes.get_mut(next) {
            entered.confidence = 0.0;
        }
        self.step = next;

        tracing::debug!(
            from = %step,
            to = %next,
            confidence = eval.outcome.confidence,
            progress = self.progress(),
            "scan step passed"
        );

        FrameVerdict::Advanced { from: step, to: next }
    }

    /// Assemble the final capture. Only a machine that reached `Done` can finish.
    pub fn finish(
        self,
        kind: VerificationKind,
        timestamp: DateTime<Utc>,
    ) -> Result<BiometricCapture, CaptureError> {
        if self.step != ScanStep::Done {
            return Err(CaptureError::Incomplete { step: self.step });
        }
        let (Some(face), Some(ear_left), Some(ear_right)) =
            (self.face, self.ear_left, self.ear_right)
        else {
            return Err(CaptureError::Incomplete { step: self.step });
        };
        BiometricCapture::assemble(face, ear_left, ear_right, &self.outcomes, kind, timestamp)
    }
}
