//! Wait Gate
//!
//! Blocking wait-with-timeout for asynchronous remote state transitions
//! ("connected", "discovering", "services resolved", a new object on the
//! bus). A caller thread registers a predicate on an event source, arms a
//! timer on the same source and sleeps until one of them resolves the wait.
//!
//! The gate must never be entered from the thread that dispatches the
//! events it waits for.

mod error;
mod event_loop;
mod gate;
pub mod predicate;
mod source;

pub use error::WaitError;
pub use event_loop::EventLoop;
pub use gate::{WaitGate, WaitOutcome};
pub use source::{
    ChangedProperties, EventSource, Listener, ListenerId, ObjectAdded, PropertyValue,
    TimerCallback, TimerId,
};

/// Default timeouts used by callers of the gate
pub mod timeouts {
    /// Property transitions such as `Discovering` (ms)
    pub const PROPERTY_CHANGE_MS: u64 = 1000;
    /// Connect / disconnect / services resolved (ms)
    pub const CONNECTION_MS: u64 = 10_000;
    /// Waiting for a device object to appear during discovery (ms)
    pub const OBJECT_ADDED_MS: u64 = 10_000;
}
