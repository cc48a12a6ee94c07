//! Integrity Error Types

use thiserror::Error;

/// Reasons a captured batch is unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// A sequence number was skipped or repeated
    #[error("Sequence gap after packet {index}: expected {expected}, got {actual}")]
    SequenceGap { expected: u8, actual: u8, index: usize },

    /// Timestamp did not advance across a 255 -> 0 wrap
    #[error("Timestamp at packet {index} does not advance across sequence wrap")]
    TimestampOrder { index: usize },

    /// Packets and timestamps are not paired one to one
    #[error("Batch has {packets} packets but {timestamps} timestamps")]
    LengthMismatch { packets: usize, timestamps: usize },

    /// Record size differs from the first record of the batch
    #[error("Record {index} is {actual} bytes, expected {expected}")]
    InconsistentRecordLength {
        index: usize,
        expected: usize,
        actual: usize,
    },
}
