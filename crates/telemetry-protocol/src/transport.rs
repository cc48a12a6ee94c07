//! Transport Seams
//!
//! The pipeline only needs a push-style notification subscription and raw
//! read/write access to a handful of control points. Discovery, connection
//! and characteristic addressing stay with the implementor.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Callback invoked with the payload of every data notification
pub type NotificationCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Handle for an active notification subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Push-style notification channel
///
/// Callbacks must be delivered on a single thread, in arrival order. A
/// callback may still be running when `unsubscribe` returns.
pub trait NotificationSource: Send + Sync {
    /// Start delivering notifications to `callback`
    fn subscribe(&self, callback: NotificationCallback) -> Result<SubscriptionId, TransportError>;

    /// Stop delivering notifications for `id`
    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError>;
}

/// Named control values exposed by the sensor and its simulator service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlPoint {
    /// Sensor state (idle / streaming)
    State,
    /// Channel settings
    ChannelSettings,
    /// Status message
    Status,
    /// Data stream
    Data,
    /// Calibration
    Calibration,
    /// Notification interval and data length of the stream
    StreamConfig,
    /// Simulator: connection parameters
    SimConnectionParameters,
    /// Simulator: sampling interval (us)
    SimSamplingInterval,
    /// Simulator: scans per data notification
    SimScansPerNotification,
    /// Simulator: channels per scan
    SimChannelsPerScan,
    /// Simulator: signal source
    SimSignalSource,
    /// Simulator: signal amplitudes
    SimSignalAmplitude,
    /// Simulator: signal interval (ms)
    SimSignalInterval,
}

impl ControlPoint {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            ControlPoint::State => "State",
            ControlPoint::ChannelSettings => "Channel Settings",
            ControlPoint::Status => "Status",
            ControlPoint::Data => "Data",
            ControlPoint::Calibration => "Calibration",
            ControlPoint::StreamConfig => "Stream Config",
            ControlPoint::SimConnectionParameters => "Sim Connection Parameters",
            ControlPoint::SimSamplingInterval => "Sim Sampling Interval",
            ControlPoint::SimScansPerNotification => "Sim Scans per Data Notification",
            ControlPoint::SimChannelsPerScan => "Sim Channels per Scan",
            ControlPoint::SimSignalSource => "Sim Channel Signal Source",
            ControlPoint::SimSignalAmplitude => "Sim Signal Amplitude",
            ControlPoint::SimSignalInterval => "Sim Signal Interval",
        }
    }

    /// Whether the control point belongs to the simulator service
    pub fn is_simulator(&self) -> bool {
        matches!(
            self,
            ControlPoint::SimConnectionParameters
                | ControlPoint::SimSamplingInterval
                | ControlPoint::SimScansPerNotification
                | ControlPoint::SimChannelsPerScan
                | ControlPoint::SimSignalSource
                | ControlPoint::SimSignalAmplitude
                | ControlPoint::SimSignalInterval
        )
    }
}

impl fmt::Display for ControlPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw read/write access to the sensor's control points
pub trait DataEndpoint: Send + Sync {
    fn read(&self, point: ControlPoint) -> Result<Vec<u8>, TransportError>;

    fn write(&self, point: ControlPoint, data: &[u8]) -> Result<(), TransportError>;
}
