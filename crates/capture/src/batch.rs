//! Captured Notification Batches

use crate::error::CaptureError;
use integrity::IntegrityValidator;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use telemetry_protocol::TelemetryPacket;
use tracing::{debug, warn};

/// A notification as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub payload: Vec<u8>,
    pub arrived_at: Instant,
}

impl RawNotification {
    pub fn new(payload: impl Into<Vec<u8>>, arrived_at: Instant) -> Self {
        Self {
            payload: payload.into(),
            arrived_at,
        }
    }
}

/// A retained notification with its arrival time relative to the first one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedNotification {
    pub payload: Vec<u8>,
    pub offset: Duration,
}

/// Decoded packets paired with their arrival offsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCapture {
    pub timestamps: Vec<Duration>,
    pub packets: Vec<TelemetryPacket>,
}

impl ParsedCapture {
    /// Total number of scan blocks over all packets
    pub fn scan_count(&self) -> usize {
        self.packets.iter().map(|p| p.scan_count()).sum()
    }
}

/// Inter-arrival statistics of a batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Number of intervals the statistics cover
    pub intervals: usize,
}

impl TimingStats {
    /// Statistics over ascending offsets; `None` with fewer than two entries
    pub fn from_offsets(offsets: &[Duration]) -> Option<Self> {
        if offsets.len() < 2 {
            return None;
        }
        let deltas: Vec<Duration> = offsets
            .windows(2)
            .map(|pair| pair[1].saturating_sub(pair[0]))
            .collect();
        let total: Duration = deltas.iter().sum();

        Some(Self {
            average: total / deltas.len() as u32,
            min: deltas.iter().copied().min().unwrap_or_default(),
            max: deltas.iter().copied().max().unwrap_or_default(),
            intervals: deltas.len(),
        })
    }
}

/// A finished capture, owned by the consumer after `stop()`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedBatch {
    notifications: Vec<CapturedNotification>,
}

impl CapturedBatch {
    /// Trim the tail and re-base arrival times to the first retained entry
    ///
    /// Batches that do not outlast the trimmed tail are dropped entirely.
    pub fn from_raw(mut raw: Vec<RawNotification>, ignore_end_count: usize) -> Self {
        if raw.is_empty() {
            warn!("Received no data");
            return Self::default();
        }
        if raw.len() <= ignore_end_count {
            warn!(
                "Received only {} notifications, all within the {} dropped at the end",
                raw.len(),
                ignore_end_count
            );
            return Self::default();
        }

        raw.truncate(raw.len() - ignore_end_count);
        let origin = raw[0].arrived_at;
        let notifications = raw
            .into_iter()
            .map(|n| CapturedNotification {
                offset: n.arrived_at.saturating_duration_since(origin),
                payload: n.payload,
            })
            .collect();

        Self { notifications }
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Retained notifications in arrival order
    pub fn notifications(&self) -> &[CapturedNotification] {
        &self.notifications
    }

    pub fn into_notifications(self) -> Vec<CapturedNotification> {
        self.notifications
    }

    pub fn offsets(&self) -> Vec<Duration> {
        self.notifications.iter().map(|n| n.offset).collect()
    }

    /// Offset of the last retained notification
    pub fn duration(&self) -> Duration {
        self.notifications
            .last()
            .map(|n| n.offset)
            .unwrap_or_default()
    }

    pub fn timing(&self) -> Option<TimingStats> {
        TimingStats::from_offsets(&self.offsets())
    }

    /// Decode and validate with the default validator
    pub fn decode(&self) -> Result<ParsedCapture, CaptureError> {
        self.decode_with(&IntegrityValidator::default())
    }

    /// Decode every record, then validate the batch as a whole
    ///
    /// Any malformed record or integrity failure rejects the entire batch.
    pub fn decode_with(&self, validator: &IntegrityValidator) -> Result<ParsedCapture, CaptureError> {
        let packets = self
            .notifications
            .iter()
            .enumerate()
            .map(|(index, n)| {
                TelemetryPacket::decode(&n.payload)
                    .map_err(|source| CaptureError::Decode { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let timestamps = self.offsets();

        validator.validate(&packets, &timestamps)?;
        debug!("Decoded {} packets", packets.len());

        Ok(ParsedCapture {
            timestamps,
            packets,
        })
    }
}
