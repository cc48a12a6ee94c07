//! Sensor Link Telemetry Protocol
//!
//! This crate provides the fixed-layout binary record format streamed by the
//! force sensor (Fx, Fy, Fz, Mz scan blocks plus a channel-settings byte and
//! an 8-bit sequence number), the transport seams the pipeline consumes, and
//! encoders for the sensor's control values.

mod control;
mod error;
mod record;
mod transport;

pub use control::{
    ConnectionParameters, SamplingInterval, SensorCommand, SensorControl, SensorState,
    SignalAmplitudes, SignalInterval, SignalSource, StreamConfig, ThroughputPlan,
};
pub use error::{ProtocolError, TransportError, TransportErrorKind};
pub use record::{
    decode_sample, encode_sample, record_len, scans_in_record, swap_bytes, to_signed, ScanRecord,
    TelemetryPacket,
};
pub use transport::{
    ControlPoint, DataEndpoint, NotificationCallback, NotificationSource, SubscriptionId,
};

/// Record layout constants
pub mod layout {
    /// Bytes per scan block (four 16-bit samples)
    pub const SCAN_BLOCK_LEN: usize = 8;
    /// Trailing bytes: channel settings, sequence number
    pub const TRAILER_LEN: usize = 2;
    /// Samples per scan block
    pub const CHANNELS_PER_SCAN: usize = 4;
    /// Largest decoded sample magnitude under the sensor's sign rule
    pub const SAMPLE_MAX: i32 = 32767;
    /// Smallest decoded sample under the sensor's sign rule
    pub const SAMPLE_MIN: i32 = -32767;
}
