//! Capture Error Types

use crate::listener::ListenerState;
use integrity::IntegrityError;
use telemetry_protocol::{ProtocolError, TransportError};
use thiserror::Error;

/// Errors from capturing and parsing a notification batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Lifecycle call out of order
    #[error("Cannot {operation} listener in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ListenerState,
    },

    /// Subscription failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A buffered record could not be decoded
    #[error("Failed to decode notification {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: ProtocolError,
    },

    /// The decoded batch failed validation
    #[error("Capture rejected: {0}")]
    Integrity(#[from] IntegrityError),
}

impl CaptureError {
    /// Whether repeating the operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CaptureError::Transport(err) => err.is_retryable(),
            _ => false,
        }
    }
}
