//! Decode raw records and validate them as one batch

use integrity::{IntegrityError, IntegrityValidator};
use proptest::prelude::*;
use std::time::Duration;
use telemetry_protocol::{ScanRecord, TelemetryPacket};

fn raw_records(sequences: impl Iterator<Item = u8>) -> Vec<Vec<u8>> {
    sequences
        .map(|sequence_number| {
            TelemetryPacket {
                scans: vec![ScanRecord::new(-25535, 0, 100, -1); 3],
                channel_settings: 0x0F,
                sequence_number,
            }
            .encode()
            .unwrap()
        })
        .collect()
}

fn decode_all(records: &[Vec<u8>]) -> Vec<TelemetryPacket> {
    records
        .iter()
        .map(|record| TelemetryPacket::decode(record).unwrap())
        .collect()
}

fn evenly_spaced(n: usize) -> Vec<Duration> {
    (0..n).map(|i| Duration::from_micros(1500 * i as u64)).collect()
}

#[test]
fn test_full_cycle_of_sequence_numbers() {
    let records = raw_records((0..512usize).map(|i| (i % 256) as u8));
    let packets = decode_all(&records);
    assert_eq!(packets[1].scans[0].fx, -25535);

    let validator = IntegrityValidator::default();
    assert!(validator.validate(&packets, &evenly_spaced(packets.len())).is_ok());
}

#[test]
fn test_single_dropped_notification_rejects_batch() {
    let records = raw_records((0..=255u8).filter(|s| *s != 131));
    let packets = decode_all(&records);

    let err = IntegrityValidator::default()
        .validate(&packets, &evenly_spaced(packets.len()))
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

proptest! {
    #[test]
    fn prop_gap_index_is_packet_before_gap(start in any::<u8>(), len in 3usize..400, skip in 1usize..399) {
        prop_assume!(skip < len - 1);
        let sequences: Vec<u8> = (0..len)
            .filter(|i| *i != skip)
            .map(|i| start.wrapping_add(i as u8))
            .collect();
        let packets = decode_all(&raw_records(sequences.into_iter()));

        let result = IntegrityValidator::default().validate(&packets, &evenly_spaced(packets.len()));
        prop_assert_eq!(result, Err(IntegrityError::SequenceGap {
            expected: start.wrapping_add(skip as u8),
            actual: start.wrapping_add((skip + 1) as u8),
            index: skip - 1,
        }));
    }
}
