//! Event Source Abstraction
//!
//! The collaborator side of the gate: something that dispatches events to
//! registered listeners and can run a callback after a delay.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

/// Listener invoked on the dispatch thread for every event
pub type Listener<E> = Box<dyn Fn(&E) + Send + Sync>;

/// One-shot callback fired when a timer expires
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Handle for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Handle for an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// A source of asynchronous events with timeout-capable registration
///
/// Implementations must deliver events on a single ordered thread. Listeners
/// and timer callbacks may run concurrently with `unsubscribe` and
/// `cancel_timeout` called from other threads.
pub trait EventSource: Send + Sync {
    /// Event payload handed to listeners
    type Event: Send + Sync + 'static;

    /// Register a listener for all future events
    fn subscribe(&self, listener: Listener<Self::Event>) -> ListenerId;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);

    /// Run `callback` once after `after` has elapsed
    fn schedule_timeout(&self, after: Duration, callback: TimerCallback) -> TimerId;

    /// Cancel a pending timer. Already fired or unknown ids are ignored.
    fn cancel_timeout(&self, id: TimerId);

    /// Thread that dispatches events, if known
    fn dispatch_thread(&self) -> Option<ThreadId> {
        None
    }
}

impl<S: EventSource + ?Sized> EventSource for Arc<S> {
    type Event = S::Event;

    fn subscribe(&self, listener: Listener<Self::Event>) -> ListenerId {
        (**self).subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        (**self).unsubscribe(id)
    }

    fn schedule_timeout(&self, after: Duration, callback: TimerCallback) -> TimerId {
        (**self).schedule_timeout(after, callback)
    }

    fn cancel_timeout(&self, id: TimerId) {
        (**self).cancel_timeout(id)
    }

    fn dispatch_thread(&self) -> Option<ThreadId> {
        (**self).dispatch_thread()
    }
}

/// Value carried by a property change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Strings(Vec<String>),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    /// Get the value as a boolean, if it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a string, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        PropertyValue::Bytes(value)
    }
}

/// Set of properties that changed in one event, keyed by property name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangedProperties {
    values: BTreeMap<String, PropertyValue>,
}

impl ChangedProperties {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Look up a changed property by name
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Look up a changed boolean property by name
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(PropertyValue::as_bool)
    }

    /// Whether `name` changed in this batch
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of changed properties
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the batch carries no changes
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Changed properties in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, PropertyValue)> for ChangedProperties {
    fn from_iter<I: IntoIterator<Item = (K, PropertyValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A new object appeared on the bus, exposing the listed interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAdded {
    /// Object path
    pub path: String,
    /// Interface names implemented by the object
    pub interfaces: Vec<String>,
}

impl ObjectAdded {
    pub fn new(path: impl Into<String>, interfaces: &[&str]) -> Self {
        Self {
            path: path.into(),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Check whether the object implements an interface
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}
