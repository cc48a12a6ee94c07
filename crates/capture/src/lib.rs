//! Notification Capture
//!
//! Buffers raw data notifications while a capture is running, trims the
//! warm-up and tail notifications, and hands the finished batch over for
//! decoding and integrity validation. Throughput statistics are available
//! live and over the finished batch.

mod batch;
mod error;
mod listener;
mod throughput;

pub use batch::{CapturedBatch, CapturedNotification, ParsedCapture, RawNotification, TimingStats};
pub use error::CaptureError;
pub use listener::{CaptureConfig, ListenerState, NotificationListener, NotificationObserver};
pub use throughput::ThroughputTracker;
