use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("maximum scan attempts reached ({max}); reset before scanning again")]
pub struct AttemptsExhausted {
    pub max: u32,
}

/// Counts scan sessions started against a caller-supplied maximum.
///
/// Every started session uses an attempt, whatever its outcome. A completed
/// capture resets the counter. Once the maximum is reached further starts are
/// refused until [`reset`](Self::reset) is called; nothing is retried on the
/// caller's behalf.
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    used: u32,
    max: u32,
}

impl AttemptTracker {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    /// Use one attempt. Returns the 1-based attempt number.
    pub fn begin(&mut self) -> Result<u32, AttemptsExhausted> {
        if self.used >= self.max {
            tracing::warn!(used = self.used, max = self.max, "scan attempts exhausted");
            return Err(AttemptsExhausted { max: self.max });
        }
        self.used += 1;
        tracing::debug!(attempt = self.used, max = self.max, "scan attempt started");
        Ok(self.used)
    }

    /// A capture completed; the counter starts over.
    pub fn record_success(&mut self) {
        self.used = 0;
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }
}
