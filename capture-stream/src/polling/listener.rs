//! Poll result callbacks

use std::fmt;
use std::time::Duration;

use capture_api::{BoxError, CaptureError, SubscriptionKey, Value};

/// How a failed read will be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Read again at the next scheduled time (after backoff)
    Transient { next_attempt_in: Duration },
}

/// A failed field read as reported to [`PollListener::on_failure`]
#[derive(Debug)]
pub struct PollFailure {
    pub key: SubscriptionKey,
    pub error: CaptureError,
    /// Consecutive failures so far, capped at 100
    pub failure_count: u32,
    pub retry: RetryClass,
}

impl fmt::Display for PollFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read of {} failed ({} in a row): {}",
            self.key, self.failure_count, self.error
        )
    }
}

/// Receives poll results on the scheduler's worker thread
///
/// Errors returned from either method are logged and otherwise ignored.
pub trait PollListener: Send + Sync {
    /// A sampled value; with change-only reporting, only values that differ
    /// from the previous sample arrive here
    fn on_success(&self, key: &SubscriptionKey, value: &Value) -> Result<(), BoxError>;

    /// Called for every failed read
    fn on_failure(&self, failure: &PollFailure) -> Result<(), BoxError> {
        let _ = failure;
        Ok(())
    }
}
