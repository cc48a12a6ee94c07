//! Notification Listener
//!
//! Subscribes to the sensor's data notifications and buffers them until
//! `stop()` hands the batch over. The transport callback and `stop()` share
//! one lock, so no notification delivered after `stop()` begins is appended.

use crate::batch::{CapturedBatch, RawNotification};
use crate::error::CaptureError;
use crate::throughput::ThroughputTracker;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry_protocol::{NotificationSource, SubscriptionId};
use tracing::{debug, info, warn};

/// Observer invoked for every retained notification
pub type NotificationObserver = Box<dyn Fn(&[u8], Instant) + Send + Sync>;

/// Capture configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Notifications discarded after subscribing (irregular warm-up timing)
    pub ignore_start_count: usize,
    /// Notifications dropped from the tail on stop (unreliable timestamps)
    pub ignore_end_count: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ignore_start_count: 5,
            ignore_end_count: 11,
        }
    }
}

impl CaptureConfig {
    /// Keep every notification
    pub fn unfiltered() -> Self {
        Self {
            ignore_start_count: 0,
            ignore_end_count: 0,
        }
    }
}

/// Listener lifecycle; `Stopped` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerState {
    Idle,
    Listening,
    Stopped,
}

/// State shared with the transport callback
#[derive(Default)]
struct CaptureBuffer {
    listening: bool,
    to_ignore: usize,
    notifications: Vec<RawNotification>,
    origin: Option<Instant>,
    tracker: ThroughputTracker,
}

impl CaptureBuffer {
    fn append(&mut self, payload: &[u8], arrived_at: Instant) {
        let origin = *self.origin.get_or_insert(arrived_at);
        self.tracker
            .record(payload.len(), arrived_at.saturating_duration_since(origin));
        self.notifications
            .push(RawNotification::new(payload, arrived_at));
    }
}

struct Lifecycle {
    state: ListenerState,
    subscription: Option<SubscriptionId>,
}

/// Buffers data notifications between `start()` and `stop()`
pub struct NotificationListener<S: NotificationSource> {
    source: Arc<S>,
    config: CaptureConfig,
    lifecycle: Mutex<Lifecycle>,
    buffer: Arc<Mutex<CaptureBuffer>>,
    observer: Option<Arc<NotificationObserver>>,
}

impl<S: NotificationSource> NotificationListener<S> {
    pub fn new(source: Arc<S>, config: CaptureConfig) -> Self {
        Self {
            source,
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: ListenerState::Idle,
                subscription: None,
            }),
            buffer: Arc::new(Mutex::new(CaptureBuffer::default())),
            observer: None,
        }
    }

    /// Call `observer` for every retained notification, on the delivery thread
    pub fn on_notification<F>(mut self, observer: F) -> Self
    where
        F: Fn(&[u8], Instant) + Send + Sync + 'static,
    {
        let observer: NotificationObserver = Box::new(observer);
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> ListenerState {
        self.lifecycle.lock().state
    }

    /// Subscribe to the notification source
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != ListenerState::Idle {
            return Err(CaptureError::InvalidState {
                operation: "start",
                state: lifecycle.state,
            });
        }

        {
            let mut buffer = self.buffer.lock();
            buffer.listening = true;
            buffer.to_ignore = self.config.ignore_start_count;
        }

        let buffer = Arc::clone(&self.buffer);
        let observer = self.observer.clone();
        let callback = move |payload: &[u8]| {
            let arrived_at = Instant::now();
            {
                let mut buffer = buffer.lock();
                if !buffer.listening {
                    return;
                }
                metrics::counter!("capture_notifications_total").increment(1);
                if buffer.to_ignore > 0 {
                    buffer.to_ignore -= 1;
                    metrics::counter!("capture_notifications_discarded_total").increment(1);
                    return;
                }
                buffer.append(payload, arrived_at);
            }
            if let Some(observer) = &observer {
                observer(payload, arrived_at);
            }
        };

        match self.source.subscribe(Box::new(callback)) {
            Ok(id) => {
                info!("Start listening...");
                lifecycle.state = ListenerState::Listening;
                lifecycle.subscription = Some(id);
                Ok(())
            }
            Err(e) => {
                self.buffer.lock().listening = false;
                Err(e.into())
            }
        }
    }

    /// Unsubscribe and hand over the trimmed, re-based batch
    pub fn stop(&self) -> Result<CapturedBatch, CaptureError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != ListenerState::Listening {
            return Err(CaptureError::InvalidState {
                operation: "stop",
                state: lifecycle.state,
            });
        }

        info!("Stop listening...");
        if let Some(id) = lifecycle.subscription.take() {
            if let Err(e) = self.source.unsubscribe(id) {
                warn!("Failed to unsubscribe from notifications: {}", e);
            }
        }
        lifecycle.state = ListenerState::Stopped;

        let (notifications, received) = {
            let mut buffer = self.buffer.lock();
            buffer.listening = false;
            let received = buffer.tracker.total_count();
            (std::mem::take(&mut buffer.notifications), received)
        };
        info!("Stopped listening, received {} bytes", received);

        let batch = CapturedBatch::from_raw(notifications, self.config.ignore_end_count);
        debug!("Retained {} notifications", batch.len());
        Ok(batch)
    }

    /// Notifications retained so far
    pub fn notification_count(&self) -> usize {
        self.buffer.lock().tracker.notification_count()
    }

    /// Size of the first retained notification
    pub fn notification_size(&self) -> Option<usize> {
        self.buffer.lock().tracker.notification_size()
    }

    /// Time between the first and the last retained notification
    pub fn duration(&self) -> Duration {
        self.buffer.lock().tracker.duration()
    }

    pub fn total_count(&self) -> u64 {
        self.buffer.lock().tracker.total_count()
    }

    /// Live throughput in Mbit/s
    pub fn throughput(&self) -> f64 {
        self.buffer.lock().tracker.throughput()
    }

    /// Live throughput since the previous call in Mbit/s
    pub fn throughput_since_last_call(&self) -> f64 {
        self.buffer.lock().tracker.throughput_since_last_call()
    }
}

impl<S: NotificationSource> Drop for NotificationListener<S> {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut();
        if let Some(id) = lifecycle.subscription.take() {
            debug!("Listener dropped while listening, unsubscribing");
            let _ = self.source.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use telemetry_protocol::{NotificationCallback, ScanRecord, TelemetryPacket, TransportError};

    /// Delivers notifications synchronously on the calling thread
    #[derive(Default)]
    struct ManualSource {
        callbacks: Mutex<BTreeMap<u64, Arc<NotificationCallback>>>,
        next_id: AtomicUsize,
    }

    impl ManualSource {
        fn push(&self, payload: &[u8]) {
            let callbacks: Vec<_> = self.callbacks.lock().values().cloned().collect();
            for callback in callbacks {
                callback(payload);
            }
        }

        fn subscribers(&self) -> usize {
            self.callbacks.lock().len()
        }
    }

    impl NotificationSource for ManualSource {
        fn subscribe(&self, callback: NotificationCallback) -> Result<SubscriptionId, TransportError> {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) as u64;
            self.callbacks.lock().insert(id, Arc::new(callback));
            Ok(SubscriptionId(id))
        }

        fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
            self.callbacks.lock().remove(&id.0);
            Ok(())
        }
    }

    fn record(sequence_number: u8) -> Vec<u8> {
        TelemetryPacket {
            scans: vec![ScanRecord::new(1, 2, 3, 4); 30],
            channel_settings: 0,
            sequence_number,
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_twenty_notifications_retain_four() {
        let source = Arc::new(ManualSource::default());
        let listener = NotificationListener::new(Arc::clone(&source), CaptureConfig::default());

        listener.start().unwrap();
        for seq in 0..20u8 {
            source.push(&record(seq));
        }
        assert_eq!(listener.notification_count(), 15);
        assert_eq!(listener.notification_size(), Some(242));

        let batch = listener.stop().unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.notifications()[0].offset, Duration::ZERO);

        let parsed = batch.decode().unwrap();
        let sequences: Vec<u8> = parsed.packets.iter().map(|p| p.sequence_number).collect();
        assert_eq!(sequences, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_lifecycle_errors() {
        let source = Arc::new(ManualSource::default());
        let listener = NotificationListener::new(Arc::clone(&source), CaptureConfig::default());

        assert_eq!(
            listener.stop().unwrap_err(),
            CaptureError::InvalidState {
                operation: "stop",
                state: ListenerState::Idle
            }
        );

        listener.start().unwrap();
        assert!(matches!(
            listener.start(),
            Err(CaptureError::InvalidState { state: ListenerState::Listening, .. })
        ));

        listener.stop().unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(listener.start().is_err());
        assert!(listener.stop().is_err());
    }

    #[test]
    fn test_no_append_after_stop() {
        let source = Arc::new(ManualSource::default());
        let listener = NotificationListener::new(Arc::clone(&source), CaptureConfig::unfiltered());

        listener.start().unwrap();
        source.push(&record(0));
        let batch = listener.stop().unwrap();
        assert_eq!(source.subscribers(), 0);

        source.push(&record(1));
        assert_eq!(batch.len(), 1);
        assert_eq!(listener.notification_count(), 1);
    }

    #[test]
    fn test_empty_capture_is_not_an_error() {
        let source = Arc::new(ManualSource::default());
        let listener = NotificationListener::new(Arc::clone(&source), CaptureConfig::default());
        listener.start().unwrap();
        for seq in 0..5u8 {
            source.push(&record(seq));
        }
        let batch = listener.stop().unwrap();
        assert!(batch.is_empty());
        assert_eq!(listener.throughput(), 0.0);
    }

    #[test]
    fn test_observer_sees_retained_only() {
        let source = Arc::new(ManualSource::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let listener = NotificationListener::new(Arc::clone(&source), CaptureConfig::default())
            .on_notification(move |payload, _| {
                assert_eq!(payload.len(), 242);
                counter.fetch_add(1, Ordering::SeqCst);
            });

        listener.start().unwrap();
        for seq in 0..8u8 {
            source.push(&record(seq));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_drop_while_listening_unsubscribes() {
        let source = Arc::new(ManualSource::default());
        {
            let listener = NotificationListener::new(Arc::clone(&source), CaptureConfig::default());
            listener.start().unwrap();
            assert_eq!(source.subscribers(), 1);
        }
        assert_eq!(source.subscribers(), 0);
    }
}
