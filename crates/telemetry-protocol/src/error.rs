//! Protocol and Transport Error Types

use thiserror::Error;

/// Category of a transport failure, used by callers to decide on retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Another operation of the same kind is already running
    InProgress,
    /// The transport service is not ready yet
    NotReady,
    /// The remote did not answer in time
    Timeout,
    /// The link to the device is gone
    Disconnected,
    /// The operation is not permitted on this endpoint
    NotPermitted,
    /// Any other failure
    Failed,
}

impl TransportErrorKind {
    /// Whether an operation failing with this kind may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::InProgress | TransportErrorKind::NotReady | TransportErrorKind::Timeout
        )
    }
}

/// Error reported by a transport collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transport error ({kind:?}): {message}")]
pub struct TransportError {
    /// Classification of the failure
    pub kind: TransportErrorKind,
    /// Human-readable detail from the transport
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Disconnected, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Failed, message)
    }

    /// Whether the caller may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
            std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => TransportErrorKind::Disconnected,
            std::io::ErrorKind::PermissionDenied => TransportErrorKind::NotPermitted,
            _ => TransportErrorKind::Failed,
        };
        TransportError::new(kind, err.to_string())
    }
}

/// Errors from record decoding and control encoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Record length is not `8 * N + 2`
    #[error("Malformed record: {len} bytes is not a whole number of scan blocks plus trailer")]
    MalformedRecord { len: usize },

    /// Sample value cannot be produced by the sensor's sign rule
    #[error("Sample value {value} is outside the encodable range")]
    SampleOutOfRange { value: i32 },

    /// Control value rejected before it reached the transport
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Control value read back from the device could not be parsed
    #[error("Invalid response from {point}: expected {expected} bytes, got {actual}")]
    InvalidResponse {
        point: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Transport failure while talking to the device
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Whether the failed operation may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtocolError::Transport(err) => err.is_retryable(),
            _ => false,
        }
    }
}
