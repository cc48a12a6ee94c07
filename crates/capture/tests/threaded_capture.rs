//! Capture with notifications delivered from a separate thread

use capture::{CaptureConfig, NotificationListener, ThroughputTracker};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telemetry_protocol::{
    NotificationCallback, NotificationSource, ScanRecord, SubscriptionId, TelemetryPacket,
    TransportError,
};

/// Streams records from a background thread while a subscriber exists
struct StreamingSource {
    callback: Arc<Mutex<Option<NotificationCallback>>>,
    running: Arc<AtomicBool>,
}

impl StreamingSource {
    fn spawn(interval: Duration) -> (Arc<Self>, thread::JoinHandle<()>) {
        let callback: Arc<Mutex<Option<NotificationCallback>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let source = Arc::new(Self {
            callback: Arc::clone(&callback),
            running: Arc::clone(&running),
        });

        let handle = thread::spawn(move || {
            let mut sequence = 0u8;
            while running.load(Ordering::SeqCst) {
                let record = TelemetryPacket {
                    scans: vec![ScanRecord::new(100, -100, 50, -50); 30],
                    channel_settings: 0x0F,
                    sequence_number: sequence,
                }
                .encode()
                .unwrap();
                if let Some(callback) = callback.lock().as_ref() {
                    callback(&record);
                    sequence = sequence.wrapping_add(1);
                }
                thread::sleep(interval);
            }
        });

        (source, handle)
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl NotificationSource for StreamingSource {
    fn subscribe(&self, callback: NotificationCallback) -> Result<SubscriptionId, TransportError> {
        *self.callback.lock() = Some(callback);
        Ok(SubscriptionId(1))
    }

    fn unsubscribe(&self, _id: SubscriptionId) -> Result<(), TransportError> {
        self.callback.lock().take();
        Ok(())
    }
}

#[test]
fn test_capture_from_delivery_thread() {
    let (source, handle) = StreamingSource::spawn(Duration::from_millis(1));
    let listener = NotificationListener::new(Arc::clone(&source), CaptureConfig::default());

    listener.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    let live = listener.notification_count();
    let batch = listener.stop().unwrap();

    source.shutdown();
    handle.join().unwrap();

    assert!(live > 11, "only {} notifications captured", live);
    assert!(!batch.is_empty());
    assert_eq!(batch.notifications()[0].offset, Duration::ZERO);

    let parsed = batch.decode().unwrap();
    assert_eq!(parsed.packets[0].sequence_number, 5);
    assert!(parsed.timestamps.windows(2).all(|pair| pair[0] <= pair[1]));

    let tracker = ThroughputTracker::from_batch(&batch);
    assert_eq!(tracker.notification_count(), batch.len());
    assert_eq!(tracker.total_count(), batch.len() as u64 * 242);
    if batch.len() > 1 {
        assert!(tracker.throughput() > 0.0);
    }
}
