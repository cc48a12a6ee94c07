//! Throughput Statistics

use crate::batch::CapturedBatch;
use std::time::Duration;
use tracing::warn;

const BITS_PER_MBIT: f64 = 1024.0 * 1024.0;

/// Byte count and timing accumulator for a notification stream
///
/// All notifications are assumed to share the size of the first one.
/// Timestamps are offsets on a common time base.
#[derive(Debug, Clone, Default)]
pub struct ThroughputTracker {
    notification_size: Option<usize>,
    notification_count: usize,
    first: Option<Duration>,
    last: Option<Duration>,
    checkpoint_at: Duration,
    checkpoint_bytes: u64,
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics over a finished batch
    pub fn from_batch(batch: &CapturedBatch) -> Self {
        let mut tracker = Self::new();
        for notification in batch.notifications() {
            tracker.record(notification.payload.len(), notification.offset);
        }
        tracker
    }

    /// Account one notification of `size` bytes arriving at `at`
    pub fn record(&mut self, size: usize, at: Duration) {
        if self.first.is_none() {
            self.first = Some(at);
            self.checkpoint_at = at;
            self.notification_size = Some(size);
        }
        self.last = Some(at);
        self.notification_count += 1;
    }

    pub fn notification_count(&self) -> usize {
        self.notification_count
    }

    /// Size of the first notification, if any was recorded
    pub fn notification_size(&self) -> Option<usize> {
        self.notification_size
    }

    /// Time between the first and the last notification
    pub fn duration(&self) -> Duration {
        match (self.first, self.last) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => Duration::ZERO,
        }
    }

    /// Total received bytes
    pub fn total_count(&self) -> u64 {
        if self.notification_count == 0 {
            warn!("RX buffer is empty");
            return 0;
        }
        match self.notification_size {
            Some(size) => (self.notification_count * size) as u64,
            None => 0,
        }
    }

    /// Throughput over the whole stream in Mbit/s
    pub fn throughput(&self) -> f64 {
        let elapsed = self.duration();
        if elapsed.is_zero() {
            return 0.0;
        }
        self.total_count() as f64 * 8.0 / elapsed.as_secs_f64() / BITS_PER_MBIT
    }

    /// Throughput since the previous call in Mbit/s
    ///
    /// Advances the checkpoint to the latest notification. Returns 0 and
    /// leaves the checkpoint untouched when no time passed since it.
    pub fn throughput_since_last_call(&mut self) -> f64 {
        let Some(last) = self.last else {
            return 0.0;
        };
        let elapsed = last.saturating_sub(self.checkpoint_at);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total = self.total_count();
        let bytes = total.saturating_sub(self.checkpoint_bytes);
        self.checkpoint_at = last;
        self.checkpoint_bytes = total;

        bytes as f64 * 8.0 / elapsed.as_secs_f64() / BITS_PER_MBIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_empty_tracker() {
        let mut tracker = ThroughputTracker::new();
        assert_eq!(tracker.total_count(), 0);
        assert_eq!(tracker.throughput(), 0.0);
        assert_eq!(tracker.throughput_since_last_call(), 0.0);
        assert_eq!(tracker.notification_size(), None);
    }

    #[test]
    fn test_single_notification_has_zero_throughput() {
        let mut tracker = ThroughputTracker::new();
        tracker.record(242, ms(0));
        assert_eq!(tracker.total_count(), 242);
        assert_eq!(tracker.throughput(), 0.0);
    }

    #[test]
    fn test_throughput_uses_first_notification_size() {
        let mut tracker = ThroughputTracker::new();
        // 1 MiB worth of bits in one second
        tracker.record(65_536, ms(0));
        tracker.record(10, ms(1000));
        assert_eq!(tracker.total_count(), 131_072);
        assert!((tracker.throughput() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_since_last_call() {
        let mut tracker = ThroughputTracker::new();
        tracker.record(65_536, ms(0));
        tracker.record(65_536, ms(1000));
        assert!((tracker.throughput_since_last_call() - 1.0).abs() < 1e-9);

        // No new data and no elapsed time: checkpoint unchanged
        assert_eq!(tracker.throughput_since_last_call(), 0.0);

        tracker.record(65_536, ms(1500));
        tracker.record(65_536, ms(2000));
        // 2 * 64 KiB in one second since the checkpoint
        assert!((tracker.throughput_since_last_call() - 1.0).abs() < 1e-9);
        assert_eq!(tracker.notification_count(), 4);
        assert_eq!(tracker.duration(), ms(2000));
    }
}
