//! Pipeline configuration

use crate::error::PipelineError;
use capture::CaptureConfig;
use config::{Config, Environment, File, FileFormat};
use integrity::ValidatorConfig;
use serde::{Deserialize, Serialize};
use telemetry_protocol::{SignalAmplitudes, SignalSource};
use wait_gate::timeouts;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SENSOR_LINK";

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "SENSOR_LINK_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
    /// Include the event target
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Timeouts for blocking property waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Connection establishment (milliseconds)
    pub connect_timeout_ms: u64,
    /// Any other property change (milliseconds)
    pub property_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: timeouts::CONNECTION_MS,
            property_timeout_ms: timeouts::PROPERTY_CHANGE_MS,
        }
    }
}

/// Simulated sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Target data throughput (Mbit/s)
    pub throughput_mbit_s: f64,
    /// Scan blocks per data notification
    pub scans_per_notification: u8,
    /// Signal generator for all channels
    pub signal_source: SignalSource,
    /// Signal amplitudes
    pub amplitudes: SignalAmplitudes,
    /// Signal frequency (Hz)
    pub signal_frequency_hz: f64,
    /// Delay before the link reports itself connected (milliseconds)
    pub connect_delay_ms: u64,
    /// Channel settings byte sent with every record
    pub channel_settings: u8,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            throughput_mbit_s: 1.0,
            scans_per_notification: 30,
            signal_source: SignalSource::Sine,
            amplitudes: SignalAmplitudes {
                fx: 1000,
                fy: 2000,
                fz: 3000,
                mz: 500,
            },
            signal_frequency_hz: 5.0,
            connect_delay_ms: 100,
            channel_settings: 0x0F,
        }
    }
}

impl SimulatorConfig {
    /// Low rate stream
    pub fn low_rate() -> Self {
        Self {
            throughput_mbit_s: 0.1,
            scans_per_notification: 10,
            ..Default::default()
        }
    }
}

/// Capture session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to stream (milliseconds)
    pub capture_duration_ms: u64,
    /// Interval of live throughput reports (milliseconds)
    pub report_interval_ms: u64,
    /// Live feed channel capacity
    pub live_feed_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_duration_ms: 2000,
            report_interval_ms: 500,
            live_feed_capacity: 256,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub logging: LoggingConfig,
    pub gate: GateConfig,
    pub capture: CaptureConfig,
    pub validator: ValidatorConfig,
    pub simulator: SimulatorConfig,
    pub session: SessionConfig,
}

impl PipelineConfig {
    /// Short capture for smoke runs
    pub fn quick() -> Self {
        Self {
            session: SessionConfig {
                capture_duration_ms: 400,
                report_interval_ms: 100,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load from an optional TOML file, then `SENSOR_LINK_*` overrides
    ///
    /// Nested keys use `__`, e.g. `SENSOR_LINK_CAPTURE__IGNORE_END_COUNT=0`.
    pub fn load(path: Option<&str>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        let config = builder.add_source(env_source()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load using the file named by `SENSOR_LINK_CONFIG`, if set
    pub fn from_env() -> Result<Self, PipelineError> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load(path.as_deref())
    }

    /// Parse a TOML document without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self, PipelineError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
