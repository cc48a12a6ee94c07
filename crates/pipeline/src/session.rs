//! Capture session
//!
//! Runs one capture end to end: connect and wait for the link, configure
//! the stream, buffer notifications for the configured duration, then
//! decode and validate the batch into a [`CaptureReport`].

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use capture::{CaptureConfig, CapturedBatch, NotificationListener, ThroughputTracker, TimingStats};
use chrono::{DateTime, Utc};
use integrity::IntegrityValidator;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry_protocol::{
    DataEndpoint, NotificationSource, SensorCommand, SensorControl, SignalInterval,
    ThroughputPlan, TransportError,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use wait_gate::predicate::bool_property;
use wait_gate::{ChangedProperties, EventSource, WaitGate};

/// A sensor reachable through the pipeline's transport seams
pub trait SensorLink: NotificationSource + DataEndpoint + 'static {
    /// Property-change events of the remote device
    type Properties: EventSource<Event = ChangedProperties> + 'static;

    fn properties(&self) -> Arc<Self::Properties>;

    /// Request a connection; completion is signalled through `Connected`
    /// and `ServicesResolved` property changes
    fn connect(&self) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;
}

/// A retained notification forwarded while the capture runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveNotification {
    pub sequence_number: u8,
    pub len: usize,
    pub arrived_at: Instant,
}

/// Summary of one capture
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub started_at: DateTime<Utc>,
    /// Throughput the stream was configured for (Mbit/s)
    pub planned_mbit_s: f64,
    /// Retained notifications
    pub notifications: usize,
    pub notification_size: Option<usize>,
    /// Decoded scan blocks
    pub scans: usize,
    pub total_bytes: u64,
    pub duration_ms: f64,
    /// Measured throughput over the retained batch (Mbit/s)
    pub throughput_mbit_s: f64,
    pub first_sequence: Option<u8>,
    pub last_sequence: Option<u8>,
    pub timing: Option<TimingStats>,
}

/// Runs capture sessions with one configuration
pub struct CaptureSession {
    config: PipelineConfig,
}

impl CaptureSession {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run<L: SensorLink>(&self, link: Arc<L>) -> Result<CaptureReport, PipelineError> {
        self.run_with_feed(link, None).await
    }

    /// Run a capture, forwarding retained notifications to `feed`
    ///
    /// The feed never blocks the delivery thread: notifications are dropped
    /// when the channel is full.
    pub async fn run_with_feed<L: SensorLink>(
        &self,
        link: Arc<L>,
        feed: Option<mpsc::Sender<LiveNotification>>,
    ) -> Result<CaptureReport, PipelineError> {
        let started_at = Utc::now();
        if let Err(e) = self.connect(Arc::clone(&link)).await {
            if let Err(d) = link.disconnect() {
                warn!("Failed to cancel connection: {}", d);
            }
            return Err(e);
        }

        // Every exit after a successful connect goes through the cleanup below
        let control = SensorControl::new(Arc::clone(&link));
        let captured = match self.configure(&control) {
            Ok(plan) => self
                .capture(Arc::clone(&link), &control, feed)
                .await
                .map(|batch| (plan, batch)),
            Err(e) => Err(e),
        };
        if let Err(e) = control.stop_streaming() {
            warn!("Failed to stop streaming: {}", e);
        }
        if let Err(e) = link.disconnect() {
            warn!("Failed to disconnect: {}", e);
        }
        let (plan, batch) = captured?;

        let validator = IntegrityValidator::new(self.config.validator);
        let parsed = batch.decode_with(&validator)?;
        let tracker = ThroughputTracker::from_batch(&batch);

        let report = CaptureReport {
            started_at,
            planned_mbit_s: plan.realized_mbit_s,
            notifications: batch.len(),
            notification_size: tracker.notification_size(),
            scans: parsed.scan_count(),
            total_bytes: tracker.total_count(),
            duration_ms: batch.duration().as_secs_f64() * 1000.0,
            throughput_mbit_s: tracker.throughput(),
            first_sequence: parsed.packets.first().map(|p| p.sequence_number),
            last_sequence: parsed.packets.last().map(|p| p.sequence_number),
            timing: batch.timing(),
        };
        info!(
            "Captured {} notifications ({} scans), {:.3} Mbit/s",
            report.notifications, report.scans, report.throughput_mbit_s
        );
        Ok(report)
    }

    /// Connect and block until the services are resolved
    ///
    /// `ServicesResolved` only turns true once the link is connected, so one
    /// wait covers both. It is armed before the connect request goes out.
    async fn connect<L: SensorLink>(&self, link: Arc<L>) -> Result<(), PipelineError> {
        let timeout = Duration::from_millis(self.config.gate.connect_timeout_ms);
        tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
            let gate = WaitGate::new("sensor", link.properties());
            gate.wait_after(bool_property("ServicesResolved", true), timeout, || {
                link.connect().map_err(PipelineError::from)
            })?;
            info!("Connected, services resolved");
            Ok(())
        })
        .await?
    }

    fn configure<E: DataEndpoint>(&self, control: &SensorControl<E>) -> Result<ThroughputPlan, PipelineError> {
        let sim = &self.config.simulator;
        let plan = ThroughputPlan::for_target(sim.throughput_mbit_s, sim.scans_per_notification)?;

        control.send(SensorCommand::SetSignalSource(sim.signal_source))?;
        control.send(SensorCommand::SetSignalAmplitudes(sim.amplitudes))?;
        control.send(SensorCommand::SetSignalInterval(SignalInterval::from_frequency(
            sim.signal_frequency_hz,
        )?))?;
        control.apply_throughput_plan(&plan)?;
        Ok(plan)
    }

    async fn capture<L: SensorLink>(
        &self,
        link: Arc<L>,
        control: &SensorControl<L>,
        feed: Option<mpsc::Sender<LiveNotification>>,
    ) -> Result<CapturedBatch, PipelineError> {
        let listener = Arc::new(listener_with_feed(link, self.config.capture, feed));
        listener.start()?;
        control.start_streaming()?;

        let session = &self.config.session;
        let capture_for = tokio::time::sleep(Duration::from_millis(session.capture_duration_ms));
        tokio::pin!(capture_for);
        let mut reports =
            tokio::time::interval(Duration::from_millis(session.report_interval_ms.max(1)));
        reports.tick().await;

        loop {
            tokio::select! {
                _ = &mut capture_for => break,
                _ = reports.tick() => {
                    info!(
                        "Live: {} notifications, {:.3} Mbit/s since last report",
                        listener.notification_count(),
                        listener.throughput_since_last_call()
                    );
                }
            }
        }

        let stopping = Arc::clone(&listener);
        let batch = tokio::task::spawn_blocking(move || stopping.stop()).await??;
        Ok(batch)
    }
}

fn listener_with_feed<L: SensorLink>(
    link: Arc<L>,
    config: CaptureConfig,
    feed: Option<mpsc::Sender<LiveNotification>>,
) -> NotificationListener<L> {
    let listener = NotificationListener::new(link, config);
    let Some(feed) = feed else {
        return listener;
    };
    listener.on_notification(move |payload: &[u8], arrived_at: Instant| {
        let notification = LiveNotification {
            sequence_number: payload.last().copied().unwrap_or_default(),
            len: payload.len(),
            arrived_at,
        };
        if feed.try_send(notification).is_err() {
            metrics::counter!("pipeline_live_feed_dropped_total").increment(1);
        }
    })
}
