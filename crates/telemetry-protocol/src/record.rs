//! Telemetry Record Decoding
//!
//! One data notification carries `N` scan blocks followed by a
//! channel-settings byte and a sequence number:
//!
//! ```text
//! | Fx Fy Fz Mz | Fx Fy Fz Mz | ... | channel settings | sequence |
//!   8 bytes       8 bytes             1 byte             1 byte
//! ```
//!
//! Each sample arrives as two bytes which must be swapped before use, and
//! is then made signed by subtracting 65535 (not 65536) from values above
//! 32767. The sensor firmware has not been checked against this rule, so it
//! is reproduced as observed.

use crate::error::ProtocolError;
use crate::layout::{SAMPLE_MAX, SAMPLE_MIN, SCAN_BLOCK_LEN, TRAILER_LEN};
use serde::{Deserialize, Serialize};

/// One physical sample of the four measurement channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Force X
    pub fx: i32,
    /// Force Y
    pub fy: i32,
    /// Force Z
    pub fz: i32,
    /// Moment Z
    pub mz: i32,
}

impl ScanRecord {
    pub fn new(fx: i32, fy: i32, fz: i32, mz: i32) -> Self {
        Self { fx, fy, fz, mz }
    }

    /// Channels in output order `[Fx, Fy, Fz, Mz]`
    pub fn channels(&self) -> [i32; 4] {
        [self.fx, self.fy, self.fz, self.mz]
    }
}

/// A decoded data notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryPacket {
    /// Scan blocks in transmission order
    pub scans: Vec<ScanRecord>,
    /// Channel configuration byte
    pub channel_settings: u8,
    /// Sequence number (wraps 255 -> 0)
    pub sequence_number: u8,
}

impl TelemetryPacket {
    /// Decode one raw record
    pub fn decode(record: &[u8]) -> Result<Self, ProtocolError> {
        let scan_count = scans_in_record(record.len())?;
        let sequence_number = record[record.len() - 1];
        let channel_settings = record[record.len() - 2];

        let scans = record[..scan_count * SCAN_BLOCK_LEN]
            .chunks_exact(SCAN_BLOCK_LEN)
            .map(|block| {
                ScanRecord::new(
                    decode_sample(block[0], block[1]),
                    decode_sample(block[2], block[3]),
                    decode_sample(block[4], block[5]),
                    decode_sample(block[6], block[7]),
                )
            })
            .collect();

        Ok(Self {
            scans,
            channel_settings,
            sequence_number,
        })
    }

    /// Encode back into the on-wire layout
    ///
    /// Fails for samples outside `-32767..=32767`, which the sign rule can
    /// never produce.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut record = Vec::with_capacity(self.record_len());
        for scan in &self.scans {
            for value in scan.channels() {
                record.extend_from_slice(&encode_sample(value)?);
            }
        }
        record.push(self.channel_settings);
        record.push(self.sequence_number);
        Ok(record)
    }

    /// Number of scan blocks
    pub fn scan_count(&self) -> usize {
        self.scans.len()
    }

    /// Size of the encoded record in bytes
    pub fn record_len(&self) -> usize {
        record_len(self.scans.len())
    }
}

/// Size in bytes of a record carrying `scans` scan blocks
pub fn record_len(scans: usize) -> usize {
    scans * SCAN_BLOCK_LEN + TRAILER_LEN
}

/// Number of scan blocks in a record of `len` bytes
pub fn scans_in_record(len: usize) -> Result<usize, ProtocolError> {
    if len < TRAILER_LEN || (len - TRAILER_LEN) % SCAN_BLOCK_LEN != 0 {
        return Err(ProtocolError::MalformedRecord { len });
    }
    Ok((len - TRAILER_LEN) / SCAN_BLOCK_LEN)
}

/// Swap the two bytes of a raw 16-bit field: `(raw & 0xFF) * 256 + (raw >> 8)`
pub fn swap_bytes(raw: u16) -> u16 {
    ((raw & 0x00FF) << 8) | (raw >> 8)
}

/// Sensor sign rule: `v - 65535` for `v > 32767`
pub fn to_signed(swapped: u16) -> i32 {
    let value = swapped as i32;
    if value > 32767 {
        value - 65535
    } else {
        value
    }
}

/// Decode one sample from its two on-wire bytes (low byte first)
pub fn decode_sample(low: u8, high: u8) -> i32 {
    let raw = u16::from_le_bytes([low, high]);
    to_signed(swap_bytes(raw))
}

/// Encode one sample into its two on-wire bytes
///
/// Zero always encodes as `0x0000`, although `0xFFFF` decodes to zero too.
pub fn encode_sample(value: i32) -> Result<[u8; 2], ProtocolError> {
    if !(SAMPLE_MIN..=SAMPLE_MAX).contains(&value) {
        return Err(ProtocolError::SampleOutOfRange { value });
    }
    let swapped = if value < 0 { value + 65535 } else { value } as u16;
    Ok(swap_bytes(swapped).to_le_bytes())
}
