//! Sensor Control Values
//!
//! Encoders for the values written to the sensor and its simulator service.
//! All multi-byte fields are little-endian.

use crate::error::ProtocolError;
use crate::record::record_len;
use crate::transport::{ControlPoint, DataEndpoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Sensor acquisition state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorState {
    Idle = 0,
    Streaming = 1,
}

/// Notification interval and payload length of the data stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Notification interval (ms)
    pub interval: u16,
    /// Data length per notification (bytes)
    pub data_len: u8,
}

impl StreamConfig {
    pub const ENCODED_LEN: usize = 3;

    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.interval.to_le_bytes().to_vec();
        data.push(self.data_len);
        data
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(ProtocolError::InvalidResponse {
                point: "Stream Config",
                expected: Self::ENCODED_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            interval: u16::from_le_bytes([bytes[0], bytes[1]]),
            data_len: bytes[2],
        })
    }
}

/// Simulator sampling interval in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingInterval {
    pub micros: u16,
}

impl SamplingInterval {
    /// Closest interval for a sampling frequency in Hz
    pub fn from_frequency(hz: f64) -> Result<Self, ProtocolError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ProtocolError::InvalidCommand(format!(
                "sampling frequency must be positive, got {}",
                hz
            )));
        }
        let micros = (1e6 / hz).round();
        if micros < 1.0 || micros > u16::MAX as f64 {
            return Err(ProtocolError::InvalidCommand(format!(
                "sampling frequency {:.3} Hz needs an interval of {} us",
                hz, micros
            )));
        }
        Ok(Self {
            micros: micros as u16,
        })
    }

    /// Frequency actually produced by this interval (Hz)
    pub fn frequency(&self) -> f64 {
        1e6 / self.micros as f64
    }

    pub fn encode(&self) -> Vec<u8> {
        self.micros.to_le_bytes().to_vec()
    }
}

/// Signal generator feeding the simulated channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignalSource {
    Adc = 0,
    Constant = 1,
    Sawtooth = 2,
    Sine = 3,
    Rectangle = 4,
}

impl SignalSource {
    /// Source for an on-wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SignalSource::Adc),
            1 => Some(SignalSource::Constant),
            2 => Some(SignalSource::Sawtooth),
            3 => Some(SignalSource::Sine),
            4 => Some(SignalSource::Rectangle),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalSource::Adc => "ADC",
            SignalSource::Constant => "CONSTANT",
            SignalSource::Sawtooth => "SAWTOOTH",
            SignalSource::Sine => "SINE",
            SignalSource::Rectangle => "RECTANGLE",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignalSource {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADC" => Ok(SignalSource::Adc),
            "CONSTANT" => Ok(SignalSource::Constant),
            "SAWTOOTH" => Ok(SignalSource::Sawtooth),
            "SINE" => Ok(SignalSource::Sine),
            "RECTANGLE" => Ok(SignalSource::Rectangle),
            _ => Err(ProtocolError::InvalidCommand(format!(
                "unknown signal source \"{}\"",
                s
            ))),
        }
    }
}

/// Simulated signal amplitudes per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalAmplitudes {
    pub fx: u16,
    pub fy: u16,
    pub fz: u16,
    pub mz: u16,
}

impl SignalAmplitudes {
    /// On-wire order is `[Mz, Fx, Fy, Fz]`
    pub fn encode(&self) -> Vec<u8> {
        [self.mz, self.fx, self.fy, self.fz]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }
}

/// Period of the simulated signal in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInterval {
    pub millis: u16,
}

impl SignalInterval {
    /// Period for a signal frequency in Hz, truncated to whole milliseconds
    pub fn from_frequency(hz: f64) -> Result<Self, ProtocolError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ProtocolError::InvalidCommand(format!(
                "signal frequency must be positive, got {}",
                hz
            )));
        }
        let millis = (1000.0 / hz).trunc();
        if millis < 1.0 || millis > u16::MAX as f64 {
            return Err(ProtocolError::InvalidCommand(format!(
                "signal frequency {:.3} Hz is out of range",
                hz
            )));
        }
        Ok(Self {
            millis: millis as u16,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.millis.to_le_bytes().to_vec()
    }
}

/// Link-layer connection parameters requested through the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Minimum connection interval (N * 1.25 ms, N = 6..3200)
    pub min_interval: u16,
    /// Maximum connection interval (N * 1.25 ms, N = 6..3200)
    pub max_interval: u16,
    /// Peripheral latency in connection events
    pub latency: u16,
    /// Supervision timeout (N * 10 ms, N = 10..3200)
    pub timeout: u16,
}

impl ConnectionParameters {
    /// Create validated connection parameters
    pub fn new(
        min_interval: u16,
        max_interval: u16,
        latency: u16,
        timeout: u16,
    ) -> Result<Self, ProtocolError> {
        let interval_range = 6..=3200;
        if !interval_range.contains(&min_interval) || !interval_range.contains(&max_interval) {
            return Err(ProtocolError::InvalidCommand(format!(
                "connection interval {}..{} outside 6..3200",
                min_interval, max_interval
            )));
        }
        if min_interval > max_interval {
            return Err(ProtocolError::InvalidCommand(format!(
                "min interval {} exceeds max interval {}",
                min_interval, max_interval
            )));
        }
        if !(10..=3200).contains(&timeout) {
            return Err(ProtocolError::InvalidCommand(format!(
                "supervision timeout {} outside 10..3200",
                timeout
            )));
        }
        // timeout_ms / max_interval_ms = (timeout * 10) / (max * 1.25)
        let max_events = timeout as u32 * 8 / max_interval as u32;
        if latency as u32 + 1 > max_events {
            return Err(ProtocolError::InvalidCommand(format!(
                "latency {} too large for timeout {} and max interval {}",
                latency, timeout, max_interval
            )));
        }
        Ok(Self {
            min_interval,
            max_interval,
            latency,
            timeout,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        [self.min_interval, self.max_interval, self.latency, self.timeout]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }
}

/// Simulator settings needed to reach a target data throughput
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputPlan {
    /// Requested throughput (Mbit/s)
    pub requested_mbit_s: f64,
    /// Scan blocks per notification
    pub scans_per_notification: u8,
    /// Sampling frequency needed for the requested throughput (Hz)
    pub sampling_frequency_hz: f64,
    /// Interval sent to the simulator
    pub interval: SamplingInterval,
    /// Throughput after rounding the interval (Mbit/s)
    pub realized_mbit_s: f64,
}

impl ThroughputPlan {
    pub fn for_target(mbit_s: f64, scans_per_notification: u8) -> Result<Self, ProtocolError> {
        if scans_per_notification == 0 {
            return Err(ProtocolError::InvalidCommand(
                "scans per notification must be at least 1".to_string(),
            ));
        }
        let scans = scans_per_notification as f64;
        let notification_len = record_len(scans_per_notification as usize) as f64;

        let bytes_per_second = mbit_s / 8.0 * 1024.0 * 1024.0;
        let sampling_frequency_hz = bytes_per_second / notification_len * scans;
        let interval = SamplingInterval::from_frequency(sampling_frequency_hz)?;
        let realized_mbit_s =
            interval.frequency() / scans * notification_len * 8.0 / 1024.0 / 1024.0;

        Ok(Self {
            requested_mbit_s: mbit_s,
            scans_per_notification,
            sampling_frequency_hz,
            interval,
            realized_mbit_s,
        })
    }
}

/// A single control write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorCommand {
    SetState(SensorState),
    SetStreamConfig(StreamConfig),
    SetSamplingInterval(SamplingInterval),
    SetScansPerNotification(u8),
    SetChannelsPerScan(u8),
    SetSignalSource(SignalSource),
    SetSignalAmplitudes(SignalAmplitudes),
    SetSignalInterval(SignalInterval),
    SetConnectionParameters(ConnectionParameters),
}

impl SensorCommand {
    /// Control point the command is written to
    pub fn control_point(&self) -> ControlPoint {
        match self {
            SensorCommand::SetState(_) => ControlPoint::State,
            SensorCommand::SetStreamConfig(_) => ControlPoint::StreamConfig,
            SensorCommand::SetSamplingInterval(_) => ControlPoint::SimSamplingInterval,
            SensorCommand::SetScansPerNotification(_) => ControlPoint::SimScansPerNotification,
            SensorCommand::SetChannelsPerScan(_) => ControlPoint::SimChannelsPerScan,
            SensorCommand::SetSignalSource(_) => ControlPoint::SimSignalSource,
            SensorCommand::SetSignalAmplitudes(_) => ControlPoint::SimSignalAmplitude,
            SensorCommand::SetSignalInterval(_) => ControlPoint::SimSignalInterval,
            SensorCommand::SetConnectionParameters(_) => ControlPoint::SimConnectionParameters,
        }
    }

    /// Encoded payload
    pub fn encode(&self) -> Vec<u8> {
        match self {
            SensorCommand::SetState(state) => vec![*state as u8],
            SensorCommand::SetStreamConfig(config) => config.encode(),
            SensorCommand::SetSamplingInterval(interval) => interval.encode(),
            SensorCommand::SetScansPerNotification(n) => vec![*n],
            SensorCommand::SetChannelsPerScan(n) => vec![*n],
            SensorCommand::SetSignalSource(source) => vec![*source as u8],
            SensorCommand::SetSignalAmplitudes(amplitudes) => amplitudes.encode(),
            SensorCommand::SetSignalInterval(interval) => interval.encode(),
            SensorCommand::SetConnectionParameters(params) => params.encode(),
        }
    }
}

/// Applies control commands through a data endpoint
pub struct SensorControl<E: DataEndpoint> {
    endpoint: Arc<E>,
}

impl<E: DataEndpoint> SensorControl<E> {
    pub fn new(endpoint: Arc<E>) -> Self {
        Self { endpoint }
    }

    /// Write one command
    pub fn send(&self, command: SensorCommand) -> Result<(), ProtocolError> {
        let point = command.control_point();
        let data = command.encode();
        info!("Writing {:02X?} to \"{}\"", data, point);
        self.endpoint.write(point, &data)?;
        Ok(())
    }

    /// Put the sensor into streaming state
    pub fn start_streaming(&self) -> Result<(), ProtocolError> {
        self.send(SensorCommand::SetState(SensorState::Streaming))
    }

    /// Put the sensor back into idle state
    pub fn stop_streaming(&self) -> Result<(), ProtocolError> {
        self.send(SensorCommand::SetState(SensorState::Idle))
    }

    /// Read the current stream configuration
    pub fn read_stream_config(&self) -> Result<StreamConfig, ProtocolError> {
        let bytes = self.endpoint.read(ControlPoint::StreamConfig)?;
        let config = StreamConfig::decode(&bytes)?;
        debug!("Stream config: {:?}", config);
        Ok(config)
    }

    /// Configure the simulator for a target throughput
    pub fn apply_throughput_plan(&self, plan: &ThroughputPlan) -> Result<(), ProtocolError> {
        info!(
            "Set throughput to {:.3} Mbit/s (requested: {:.3} Mbit/s) with {} scans/notification",
            plan.realized_mbit_s, plan.requested_mbit_s, plan.scans_per_notification
        );
        self.send(SensorCommand::SetSamplingInterval(plan.interval))?;
        self.send(SensorCommand::SetScansPerNotification(plan.scans_per_notification))
    }
}
