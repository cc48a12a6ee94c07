//! Wait Gate Error Types

use thiserror::Error;

/// Errors returned by a blocking wait
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The predicate was not satisfied before the timer fired
    #[error("Timeout waiting on {target} after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    /// The wait was attempted on the thread that dispatches the events it
    /// waits for, which can never make progress
    #[error("Wait on {target} called from the event dispatch thread")]
    DispatchThread { target: String },
}

impl WaitError {
    /// Whether the caller may reasonably try the operation again
    pub fn is_retryable(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}
