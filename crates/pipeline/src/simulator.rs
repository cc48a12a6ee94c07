//! Simulated force sensor
//!
//! Implements the notification, control and property seams in-process.
//! Writing the streaming state spawns a thread that generates records at
//! the configured sampling interval and delivers them to subscribers in
//! order. Property changes (`Connected`, `ServicesResolved`) are emitted on
//! a dedicated event loop so callers can wait on them through a gate.

use crate::config::SimulatorConfig;
use crate::error::PipelineError;
use crate::session::SensorLink;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use telemetry_protocol::layout::{SAMPLE_MAX, SAMPLE_MIN};
use telemetry_protocol::{
    record_len, ConnectionParameters, ControlPoint, DataEndpoint, NotificationCallback,
    NotificationSource, SamplingInterval, ScanRecord, SensorState, SignalAmplitudes,
    SignalInterval, SignalSource, StreamConfig, SubscriptionId, TelemetryPacket, TransportError,
    TransportErrorKind,
};
use tracing::{debug, error, info};
use wait_gate::{ChangedProperties, EventLoop, EventSource, TimerId};

type Subscribers = Arc<Mutex<BTreeMap<u64, NotificationCallback>>>;

/// Current control values
#[derive(Debug, Clone, Copy)]
struct Settings {
    state: SensorState,
    sampling_interval: SamplingInterval,
    scans_per_notification: u8,
    channels_per_scan: u8,
    signal_source: SignalSource,
    amplitudes: SignalAmplitudes,
    signal_interval: SignalInterval,
    connection: Option<ConnectionParameters>,
    stream_config: StreamConfig,
    channel_settings: u8,
}

struct Streamer {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// In-process sensor
pub struct SimulatedSensor {
    config: SimulatorConfig,
    properties: Arc<EventLoop<ChangedProperties>>,
    settings: Mutex<Settings>,
    subscribers: Subscribers,
    next_subscription: AtomicU64,
    streamer: Mutex<Option<Streamer>>,
    connected: AtomicBool,
    /// Property changes of a connect still in flight
    pending_connect: Mutex<Vec<TimerId>>,
}

impl SimulatedSensor {
    /// Create the sensor and start its property event loop
    pub fn spawn(config: SimulatorConfig) -> Result<Self, PipelineError> {
        let properties = Arc::new(EventLoop::spawn("sim-properties")?);
        let scans = config.scans_per_notification.max(1);
        let settings = Settings {
            state: SensorState::Idle,
            sampling_interval: SamplingInterval { micros: 1000 },
            scans_per_notification: scans,
            channels_per_scan: 4,
            signal_source: config.signal_source,
            amplitudes: config.amplitudes,
            signal_interval: SignalInterval::from_frequency(config.signal_frequency_hz)?,
            connection: None,
            stream_config: StreamConfig {
                interval: 0,
                data_len: record_len(scans as usize).min(u8::MAX as usize) as u8,
            },
            channel_settings: config.channel_settings,
        };

        Ok(Self {
            config,
            properties,
            settings: Mutex::new(settings),
            subscribers: Arc::new(Mutex::new(BTreeMap::new())),
            next_subscription: AtomicU64::new(1),
            streamer: Mutex::new(None),
            connected: AtomicBool::new(false),
            pending_connect: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Between a connect request and the matching disconnect
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.streamer.lock().is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn start_stream(&self) -> Result<(), TransportError> {
        let mut streamer = self.streamer.lock();
        if streamer.is_some() {
            return Ok(());
        }

        let settings = *self.settings.lock();
        let subscribers = Arc::clone(&self.subscribers);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let scans = settings.scans_per_notification.max(1) as usize;
        let period =
            Duration::from_micros(settings.sampling_interval.micros as u64 * scans as u64);

        let handle = thread::Builder::new()
            .name("sim-stream".to_string())
            .spawn(move || {
                let mut generator = SignalGenerator::new(&settings);
                let mut sequence_number = 0u8;
                let mut next = Instant::now();

                while flag.load(Ordering::Acquire) {
                    let packet = TelemetryPacket {
                        scans: (0..scans).map(|_| generator.next_scan()).collect(),
                        channel_settings: settings.channel_settings,
                        sequence_number,
                    };
                    let record = match packet.encode() {
                        Ok(record) => record,
                        Err(e) => {
                            error!("Simulated record could not be encoded: {}", e);
                            break;
                        }
                    };

                    for callback in subscribers.lock().values() {
                        callback(&record);
                    }
                    sequence_number = sequence_number.wrapping_add(1);

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                }
                debug!("Simulated stream stopped at sequence {}", sequence_number);
            })?;

        info!(
            "Simulated stream started: {} scans every {:?}",
            scans, period
        );
        *streamer = Some(Streamer { running, handle });
        Ok(())
    }

    fn stop_stream(&self) {
        let streamer = self.streamer.lock().take();
        if let Some(streamer) = streamer {
            streamer.running.store(false, Ordering::Release);
            if streamer.handle.join().is_err() {
                error!("Simulated stream thread panicked");
            }
        }
    }

    fn apply_write(&self, point: ControlPoint, data: &[u8]) -> Result<(), TransportError> {
        let mut settings = self.settings.lock();
        match point {
            ControlPoint::State => {
                settings.state = match expect_len(point, data, 1)?[0] {
                    0 => SensorState::Idle,
                    1 => SensorState::Streaming,
                    other => return Err(invalid(point, format!("unknown state {}", other))),
                };
            }
            ControlPoint::StreamConfig => {
                settings.stream_config = StreamConfig::decode(data)
                    .map_err(|e| invalid(point, e.to_string()))?;
            }
            ControlPoint::SimSamplingInterval => {
                let bytes = expect_len(point, data, 2)?;
                let micros = u16::from_le_bytes([bytes[0], bytes[1]]);
                if micros == 0 {
                    return Err(invalid(point, "interval must be positive"));
                }
                settings.sampling_interval = SamplingInterval { micros };
            }
            ControlPoint::SimScansPerNotification => {
                let scans = expect_len(point, data, 1)?[0];
                if scans == 0 {
                    return Err(invalid(point, "at least one scan per notification"));
                }
                settings.scans_per_notification = scans;
            }
            ControlPoint::SimChannelsPerScan => {
                settings.channels_per_scan = expect_len(point, data, 1)?[0];
            }
            ControlPoint::SimSignalSource => {
                let code = expect_len(point, data, 1)?[0];
                settings.signal_source = SignalSource::from_code(code)
                    .ok_or_else(|| invalid(point, format!("unknown signal source {}", code)))?;
            }
            ControlPoint::SimSignalAmplitude => {
                let v = words(expect_len(point, data, 8)?);
                settings.amplitudes = SignalAmplitudes {
                    mz: v[0],
                    fx: v[1],
                    fy: v[2],
                    fz: v[3],
                };
            }
            ControlPoint::SimSignalInterval => {
                let bytes = expect_len(point, data, 2)?;
                settings.signal_interval = SignalInterval {
                    millis: u16::from_le_bytes([bytes[0], bytes[1]]),
                };
            }
            ControlPoint::SimConnectionParameters => {
                let v = words(expect_len(point, data, 8)?);
                let params = ConnectionParameters::new(v[0], v[1], v[2], v[3])
                    .map_err(|e| invalid(point, e.to_string()))?;
                settings.connection = Some(params);
            }
            ControlPoint::ChannelSettings
            | ControlPoint::Status
            | ControlPoint::Data
            | ControlPoint::Calibration => {
                return Err(TransportError::new(
                    TransportErrorKind::NotPermitted,
                    format!("\"{}\" is read-only", point),
                ));
            }
        }
        Ok(())
    }
}

impl NotificationSource for SimulatedSensor {
    fn subscribe(&self, callback: NotificationCallback) -> Result<SubscriptionId, TransportError> {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, callback);
        self.properties
            .emit(ChangedProperties::new().with("Notifying", true));
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        let removed = self.subscribers.lock().remove(&id.0);
        if removed.is_none() {
            return Err(TransportError::failed(format!("unknown subscription {}", id.0)));
        }
        self.properties
            .emit(ChangedProperties::new().with("Notifying", false));
        Ok(())
    }
}

impl DataEndpoint for SimulatedSensor {
    fn read(&self, point: ControlPoint) -> Result<Vec<u8>, TransportError> {
        let settings = *self.settings.lock();
        let value = match point {
            ControlPoint::State => vec![settings.state as u8],
            ControlPoint::StreamConfig => settings.stream_config.encode(),
            ControlPoint::ChannelSettings => vec![settings.channel_settings],
            ControlPoint::Status => b"OK".to_vec(),
            ControlPoint::SimSamplingInterval => settings.sampling_interval.encode(),
            ControlPoint::SimScansPerNotification => vec![settings.scans_per_notification],
            ControlPoint::SimChannelsPerScan => vec![settings.channels_per_scan],
            ControlPoint::SimSignalSource => vec![settings.signal_source as u8],
            ControlPoint::SimSignalAmplitude => settings.amplitudes.encode(),
            ControlPoint::SimSignalInterval => settings.signal_interval.encode(),
            ControlPoint::SimConnectionParameters => settings
                .connection
                .map(|c| c.encode())
                .unwrap_or_default(),
            ControlPoint::Data | ControlPoint::Calibration => {
                return Err(TransportError::new(
                    TransportErrorKind::NotPermitted,
                    format!("\"{}\" cannot be read", point),
                ));
            }
        };
        Ok(value)
    }

    fn write(&self, point: ControlPoint, data: &[u8]) -> Result<(), TransportError> {
        self.apply_write(point, data)?;
        if point == ControlPoint::State {
            if data[0] == SensorState::Streaming as u8 {
                self.start_stream()?;
            } else {
                self.stop_stream();
            }
        }
        Ok(())
    }
}

impl SensorLink for SimulatedSensor {
    type Properties = EventLoop<ChangedProperties>;

    fn properties(&self) -> Arc<Self::Properties> {
        Arc::clone(&self.properties)
    }

    fn connect(&self) -> Result<(), TransportError> {
        let delay = Duration::from_millis(self.config.connect_delay_ms);
        debug!("Simulated connect in {:?}", delay);
        self.connected.store(true, Ordering::Release);
        let connected = self
            .properties
            .emit_after(delay, ChangedProperties::new().with("Connected", true));
        let resolved = self.properties.emit_after(
            delay * 2,
            ChangedProperties::new().with("ServicesResolved", true),
        );
        self.pending_connect.lock().extend([connected, resolved]);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_stream();
        self.settings.lock().state = SensorState::Idle;
        self.connected.store(false, Ordering::Release);
        for id in self.pending_connect.lock().drain(..) {
            self.properties.cancel_timeout(id);
        }
        self.properties.emit(
            ChangedProperties::new()
                .with("ServicesResolved", false)
                .with("Connected", false),
        );
        Ok(())
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

fn expect_len(point: ControlPoint, data: &[u8], len: usize) -> Result<&[u8], TransportError> {
    if data.len() != len {
        return Err(invalid(
            point,
            format!("expected {} bytes, got {}", len, data.len()),
        ));
    }
    Ok(data)
}

fn invalid(point: ControlPoint, message: impl std::fmt::Display) -> TransportError {
    TransportError::new(
        TransportErrorKind::NotPermitted,
        format!("Invalid value for \"{}\": {}", point, message),
    )
}

fn words(bytes: &[u8]) -> [u16; 4] {
    let mut words = [0u16; 4];
    for (word, pair) in words.iter_mut().zip(bytes.chunks_exact(2)) {
        *word = u16::from_le_bytes([pair[0], pair[1]]);
    }
    words
}

/// Waveform generator for the four channels
struct SignalGenerator {
    source: SignalSource,
    amplitudes: SignalAmplitudes,
    /// Sample spacing (s)
    step: f64,
    /// Signal period (s)
    period: f64,
    t: f64,
    noise: u32,
}

impl SignalGenerator {
    fn new(settings: &Settings) -> Self {
        Self {
            source: settings.signal_source,
            amplitudes: settings.amplitudes,
            step: settings.sampling_interval.micros as f64 / 1e6,
            period: (settings.signal_interval.millis.max(1)) as f64 / 1000.0,
            t: 0.0,
            noise: 0x2545_F491,
        }
    }

    fn next_scan(&mut self) -> ScanRecord {
        let phase = (self.t / self.period).fract();
        self.t += self.step;

        let shape = match self.source {
            SignalSource::Constant => 1.0,
            SignalSource::Sawtooth => 2.0 * phase - 1.0,
            SignalSource::Sine => (2.0 * std::f64::consts::PI * phase).sin(),
            SignalSource::Rectangle => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            SignalSource::Adc => self.next_noise(),
        };

        let scale = |amplitude: u16| -> i32 {
            ((amplitude as f64 * shape).round() as i32).clamp(SAMPLE_MIN, SAMPLE_MAX)
        };
        ScanRecord::new(
            scale(self.amplitudes.fx),
            scale(self.amplitudes.fy),
            scale(self.amplitudes.fz),
            scale(self.amplitudes.mz),
        )
    }

    /// xorshift32 mapped to -1.0..1.0
    fn next_noise(&mut self) -> f64 {
        self.noise ^= self.noise << 13;
        self.noise ^= self.noise >> 17;
        self.noise ^= self.noise << 5;
        self.noise as f64 / u32::MAX as f64 * 2.0 - 1.0
    }
}
