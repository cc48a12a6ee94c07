//! Sensor Link Pipeline
//!
//! Connects to a sensor, configures the stream, captures data notifications
//! for a fixed duration and reports the decoded, validated result. Ships a
//! simulated sensor so the whole path runs without hardware.

mod config;
mod error;
mod logging;
mod session;
mod simulator;

pub use config::{
    GateConfig, LoggingConfig, PipelineConfig, SessionConfig, SimulatorConfig, CONFIG_PATH_ENV,
    ENV_PREFIX,
};
pub use error::PipelineError;
pub use logging::init_logging;
pub use session::{CaptureReport, CaptureSession, LiveNotification, SensorLink};
pub use simulator::SimulatedSensor;
