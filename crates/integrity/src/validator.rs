//! Sequence and Timestamp Validator

use crate::error::IntegrityError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use telemetry_protocol::TelemetryPacket;
use tracing::{debug, warn};

/// Validator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Check timestamp ordering at sequence wraps
    pub check_timestamps: bool,
    /// Require every record to match the first record's length
    pub check_record_length: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            check_timestamps: true,
            check_record_length: true,
        }
    }
}

impl ValidatorConfig {
    /// Sequence continuity only
    pub fn sequence_only() -> Self {
        Self {
            check_timestamps: false,
            check_record_length: false,
        }
    }
}

/// Validator for captured batches
#[derive(Debug, Clone, Default)]
pub struct IntegrityValidator {
    config: ValidatorConfig,
}

impl IntegrityValidator {
    /// Create a new validator with given config
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a whole batch
    ///
    /// `timestamps[i]` is the re-based arrival time of `packets[i]`. A gap
    /// between packets `i - 1` and `i` is reported with `index = i - 1`; a
    /// timestamp error at a wrap is reported with `index = i`.
    pub fn validate(
        &self,
        packets: &[TelemetryPacket],
        timestamps: &[Duration],
    ) -> Result<(), IntegrityError> {
        if packets.len() != timestamps.len() {
            return Err(IntegrityError::LengthMismatch {
                packets: packets.len(),
                timestamps: timestamps.len(),
            });
        }

        let Some(first) = packets.first() else {
            return Ok(());
        };
        let expected_len = first.record_len();
        let mut wraps = 0usize;

        for i in 1..packets.len() {
            let previous = &packets[i - 1];
            let current = &packets[i];

            if self.config.check_record_length && current.record_len() != expected_len {
                return Err(IntegrityError::InconsistentRecordLength {
                    index: i,
                    expected: expected_len,
                    actual: current.record_len(),
                });
            }

            let expected = previous.sequence_number.wrapping_add(1);
            if current.sequence_number != expected {
                warn!(
                    "Sequence gap after packet {}: expected {}, got {}",
                    i - 1,
                    expected,
                    current.sequence_number
                );
                return Err(IntegrityError::SequenceGap {
                    expected,
                    actual: current.sequence_number,
                    index: i - 1,
                });
            }

            if current.sequence_number == 0 {
                wraps += 1;
                if self.config.check_timestamps && timestamps[i] <= timestamps[i - 1] {
                    warn!("Timestamp at packet {} does not advance across wrap", i);
                    return Err(IntegrityError::TimestampOrder { index: i });
                }
            }
        }

        debug!(
            "Validated {} packets ({} sequence wraps)",
            packets.len(),
            wraps
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_protocol::ScanRecord;

    fn packet(sequence_number: u8) -> TelemetryPacket {
        TelemetryPacket {
            scans: vec![ScanRecord::new(1, 2, 3, 4)],
            channel_settings: 0,
            sequence_number,
        }
    }

    fn ticks(n: usize) -> Vec<Duration> {
        (0..n).map(|i| Duration::from_millis(i as u64)).collect()
    }

    #[test]
    fn test_continuous_batch_with_wrap() {
        let packets: Vec<_> = (0..300).map(|i| packet((i % 256) as u8)).collect();
        let validator = IntegrityValidator::default();
        assert!(validator.validate(&packets, &ticks(300)).is_ok());
    }

    #[test]
    fn test_gap_reports_preceding_index() {
        let packets: Vec<_> = (0..=255u8).filter(|s| *s != 131).map(packet).collect();
        let err = IntegrityValidator::default()
            .validate(&packets, &ticks(packets.len()))
            .unwrap_err();
        assert_eq!(
            err,
            IntegrityError::SequenceGap {
                expected: 131,
                actual: 132,
                index: 130
            }
        );
    }

    #[test]
    fn test_repeated_sequence_is_gap() {
        let packets = vec![packet(7), packet(7)];
        assert!(matches!(
            IntegrityValidator::default().validate(&packets, &ticks(2)),
            Err(IntegrityError::SequenceGap { expected: 8, actual: 7, index: 0 })
        ));
    }

    #[test]
    fn test_timestamp_checked_only_at_wrap() {
        let packets = vec![packet(254), packet(255), packet(0), packet(1)];
        let validator = IntegrityValidator::default();

        // Non-advancing timestamps away from the wrap are accepted
        let flat_before_wrap = vec![
            Duration::from_millis(5),
            Duration::from_millis(5),
            Duration::from_millis(6),
            Duration::from_millis(6),
        ];
        assert!(validator.validate(&packets, &flat_before_wrap).is_ok());

        let stalled_at_wrap = vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(2),
            Duration::from_millis(3),
        ];
        assert_eq!(
            validator.validate(&packets, &stalled_at_wrap),
            Err(IntegrityError::TimestampOrder { index: 2 })
        );

        let lenient = IntegrityValidator::new(ValidatorConfig::sequence_only());
        assert!(lenient.validate(&packets, &stalled_at_wrap).is_ok());
    }

    #[test]
    fn test_length_mismatch() {
        let packets = vec![packet(0), packet(1)];
        assert_eq!(
            IntegrityValidator::default().validate(&packets, &ticks(1)),
            Err(IntegrityError::LengthMismatch {
                packets: 2,
                timestamps: 1
            })
        );
    }

    #[test]
    fn test_inconsistent_record_length() {
        let mut short = packet(1);
        short.scans.clear();
        let packets = vec![packet(0), short];
        assert_eq!(
            IntegrityValidator::default().validate(&packets, &ticks(2)),
            Err(IntegrityError::InconsistentRecordLength {
                index: 1,
                expected: 10,
                actual: 2
            })
        );
    }

    #[test]
    fn test_empty_and_single() {
        let validator = IntegrityValidator::default();
        assert!(validator.validate(&[], &[]).is_ok());
        assert!(validator.validate(&[packet(200)], &ticks(1)).is_ok());
    }
}
