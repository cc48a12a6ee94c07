//! End-to-end capture against the simulated sensor

use pipeline::{CaptureSession, PipelineConfig, SensorLink, SimulatedSensor};
use std::sync::Arc;
use std::time::Duration;
use wait_gate::predicate::bool_property;
use wait_gate::WaitGate;

fn config_from_toml() -> PipelineConfig {
    PipelineConfig::from_toml_str(
        r#"
        [session]
        capture_duration_ms = 250
        report_interval_ms = 50

        [simulator]
        throughput_mbit_s = 0.5
        scans_per_notification = 20
        signal_source = "Constant"
        connect_delay_ms = 50

        [simulator.amplitudes]
        fx = 100
        fy = 200
        fz = 300
        mz = 400
        "#,
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capture_report_serializes() {
    let config = config_from_toml();
    let sensor = Arc::new(SimulatedSensor::spawn(config.simulator.clone()).unwrap());

    let report = CaptureSession::new(config).run(sensor).await.unwrap();

    assert_eq!(report.notification_size, Some(162));
    assert_eq!(report.first_sequence, Some(5));
    assert!(report.notifications > 1);
    assert!(report.throughput_mbit_s > 0.0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["notification_size"], 162);
    assert!(json["started_at"].is_string());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connected_property_satisfies_gate() {
    let config = config_from_toml();
    let sensor = Arc::new(SimulatedSensor::spawn(config.simulator.clone()).unwrap());

    let waiting = Arc::clone(&sensor);
    let elapsed = tokio::task::spawn_blocking(move || {
        let gate = WaitGate::new("sensor", waiting.properties());
        let started = std::time::Instant::now();
        waiting.connect().unwrap();
        gate.wait(bool_property("Connected", true), Duration::from_millis(1000))
            .map(|_| started.elapsed())
    })
    .await
    .unwrap()
    .unwrap();

    assert!(elapsed >= Duration::from_millis(40));
    assert!(elapsed < Duration::from_millis(1000));
}
