//! Sensor Link - Main Entry Point

use anyhow::Context;
use pipeline::{init_logging, CaptureSession, LiveNotification, PipelineConfig, SimulatedSensor};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("=== Sensor Link v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Capturing {} ms from the simulated sensor at {:.3} Mbit/s",
        config.session.capture_duration_ms, config.simulator.throughput_mbit_s
    );

    let sensor = Arc::new(
        SimulatedSensor::spawn(config.simulator.clone()).context("Failed to start simulator")?,
    );

    let capacity = config.session.live_feed_capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<LiveNotification>(capacity);
    let feed = tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(notification) = rx.recv().await {
            forwarded += 1;
            debug!(
                "Live notification #{} ({} bytes)",
                notification.sequence_number, notification.len
            );
        }
        forwarded
    });

    let session = CaptureSession::new(config);
    let report = session
        .run_with_feed(sensor, Some(tx))
        .await
        .context("Capture failed")?;

    let forwarded = feed.await?;
    info!("Live feed forwarded {} notifications", forwarded);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
