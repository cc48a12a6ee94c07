//! Pipeline Error Types

use capture::CaptureError;
use telemetry_protocol::{ProtocolError, TransportError};
use thiserror::Error;
use wait_gate::WaitError;

/// Errors while running a capture session
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether running the session again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Wait(e) => e.is_retryable(),
            PipelineError::Capture(e) => e.is_retryable(),
            PipelineError::Protocol(e) => e.is_retryable(),
            PipelineError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}
