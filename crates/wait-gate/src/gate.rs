//! Blocking Wait Gate
//!
//! Blocks the calling thread until an event satisfying a predicate arrives
//! from an [`EventSource`], or until a timer armed on the same source fires.

use crate::error::WaitError;
use crate::source::{ChangedProperties, EventSource, ListenerId, TimerId};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Terminal outcome of one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

/// Per-call registration shared between the waiting thread, the change
/// listener and the timer. The first outcome wins; later ones are dropped.
struct Registration {
    outcome: Mutex<Option<WaitOutcome>>,
    signal: Condvar,
}

impl Registration {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            signal: Condvar::new(),
        }
    }

    fn resolve(&self, outcome: WaitOutcome) -> bool {
        let mut slot = self.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.signal.notify_all();
        true
    }

    fn is_resolved(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn block(&self) -> WaitOutcome {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = *slot {
                return outcome;
            }
            self.signal.wait(&mut slot);
        }
    }
}

/// Listener and timer registered for one wait. Dropping it tears both down
/// exactly once and releases the gate, on every exit path.
struct Armed<'a, S: EventSource> {
    gate: &'a WaitGate<S>,
    listener: Option<ListenerId>,
    timer: Option<TimerId>,
}

impl<S: EventSource> Drop for Armed<'_, S> {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.gate.source.unsubscribe(id);
        }
        if let Some(id) = self.timer.take() {
            self.gate.source.cancel_timeout(id);
        }
        self.gate.active.store(false, Ordering::Release);
    }
}

/// Reusable wait-with-timeout bound to one watched target
///
/// At most one wait may be outstanding per gate. Each call to [`wait`]
/// creates a fresh registration, so a late timer from a previous call can
/// never complete a later one.
///
/// [`wait`]: WaitGate::wait
pub struct WaitGate<S: EventSource> {
    /// Label of the watched object, used in logs and errors
    target: String,
    source: Arc<S>,
    active: AtomicBool,
}

impl<S: EventSource> WaitGate<S> {
    /// Create a gate watching `source`
    pub fn new(target: impl Into<String>, source: Arc<S>) -> Self {
        Self {
            target: target.into(),
            source,
            active: AtomicBool::new(false),
        }
    }

    /// Label of the watched object
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether a wait is currently outstanding
    pub fn is_waiting(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Block until `predicate` accepts an event or `timeout` elapses
    ///
    /// # Panics
    ///
    /// Panics if another wait on this gate is already outstanding.
    pub fn wait<P>(&self, predicate: P, timeout: Duration) -> Result<(), WaitError>
    where
        P: Fn(&S::Event) -> bool + Send + Sync + 'static,
    {
        self.wait_after(predicate, timeout, || Ok::<(), WaitError>(()))
    }

    /// Arm the wait, run `trigger`, then block
    ///
    /// The listener is registered before `trigger` runs, so a change caused
    /// by the trigger can never slip past the wait. If `trigger` fails the
    /// wait is torn down and its error returned.
    ///
    /// # Panics
    ///
    /// Panics if another wait on this gate is already outstanding.
    pub fn wait_after<P, F, E>(&self, predicate: P, timeout: Duration, trigger: F) -> Result<(), E>
    where
        P: Fn(&S::Event) -> bool + Send + Sync + 'static,
        F: FnOnce() -> Result<(), E>,
        E: From<WaitError>,
    {
        if let Some(dispatch) = self.source.dispatch_thread() {
            if dispatch == std::thread::current().id() {
                warn!("Refusing wait on {} from its dispatch thread", self.target);
                return Err(WaitError::DispatchThread {
                    target: self.target.clone(),
                }
                .into());
            }
        }

        let already_waiting = self.active.swap(true, Ordering::AcqRel);
        assert!(
            !already_waiting,
            "concurrent wait on {}: only one wait may be outstanding per target",
            self.target
        );

        let started = Instant::now();
        let registration = Arc::new(Registration::new());
        let mut armed = Armed {
            gate: self,
            listener: None,
            timer: None,
        };

        let on_change = Arc::clone(&registration);
        armed.listener = Some(self.source.subscribe(Box::new(move |event: &S::Event| {
            if !on_change.is_resolved() && predicate(event) {
                on_change.resolve(WaitOutcome::Satisfied);
            }
        })));

        let on_timeout = Arc::clone(&registration);
        armed.timer = Some(self.source.schedule_timeout(
            timeout,
            Box::new(move || {
                on_timeout.resolve(WaitOutcome::TimedOut);
            }),
        ));

        if let Err(e) = trigger() {
            debug!("Trigger for wait on {} failed", self.target);
            return Err(e);
        }

        debug!("Waiting on {} for up to {:?}", self.target, timeout);
        let outcome = registration.block();
        drop(armed);

        match outcome {
            WaitOutcome::Satisfied => {
                debug!("Wait on {} satisfied after {:?}", self.target, started.elapsed());
                Ok(())
            }
            WaitOutcome::TimedOut => {
                warn!("Wait on {} timed out after {:?}", self.target, timeout);
                Err(WaitError::Timeout {
                    target: self.target.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into())
            }
        }
    }

    /// [`wait`](WaitGate::wait) with the timeout given in milliseconds
    pub fn wait_ms<P>(&self, predicate: P, timeout_ms: u64) -> Result<(), WaitError>
    where
        P: Fn(&S::Event) -> bool + Send + Sync + 'static,
    {
        self.wait(predicate, Duration::from_millis(timeout_ms))
    }
}

impl<S> WaitGate<S>
where
    S: EventSource<Event = ChangedProperties>,
{
    /// Wait until the boolean property `name` changes to `expected`
    pub fn wait_for_bool(
        &self,
        name: &str,
        expected: bool,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        self.wait(crate::predicate::bool_property(name, expected), timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Listener, TimerCallback};
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU64;

    /// Source driven by hand from the test thread
    #[derive(Default)]
    struct ManualSource {
        next_id: AtomicU64,
        listeners: Mutex<BTreeMap<ListenerId, Arc<dyn Fn(&ChangedProperties) + Send + Sync>>>,
        timers: Mutex<BTreeMap<TimerId, TimerCallback>>,
        cancelled: Mutex<Vec<TimerId>>,
    }

    impl ManualSource {
        fn emit(&self, changed: ChangedProperties) {
            let listeners: Vec<_> = self.listeners.lock().values().cloned().collect();
            for listener in listeners {
                listener(&changed);
            }
        }

        fn fire_all_timers(&self) {
            let timers = std::mem::take(&mut *self.timers.lock());
            for (_, callback) in timers {
                callback();
            }
        }

        fn listener_count(&self) -> usize {
            self.listeners.lock().len()
        }
    }

    impl EventSource for ManualSource {
        type Event = ChangedProperties;

        fn subscribe(&self, listener: Listener<ChangedProperties>) -> ListenerId {
            let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
            self.listeners.lock().insert(id, Arc::from(listener));
            id
        }

        fn unsubscribe(&self, id: ListenerId) {
            self.listeners.lock().remove(&id);
        }

        fn schedule_timeout(&self, _after: Duration, callback: TimerCallback) -> TimerId {
            let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
            self.timers.lock().insert(id, callback);
            id
        }

        fn cancel_timeout(&self, id: TimerId) {
            self.cancelled.lock().push(id);
            self.timers.lock().remove(&id);
        }
    }

    fn spawn_when_waiting<F>(gate: &Arc<WaitGate<ManualSource>>, action: F) -> std::thread::JoinHandle<()>
    where
        F: FnOnce(&ManualSource) + Send + 'static,
    {
        let gate = Arc::clone(gate);
        std::thread::spawn(move || {
            while gate.source.listener_count() == 0 || gate.source.timers.lock().is_empty() {
                std::thread::yield_now();
            }
            action(&gate.source);
        })
    }

    #[test]
    fn test_wait_satisfied_tears_down() {
        let gate = Arc::new(WaitGate::new("dev", Arc::new(ManualSource::default())));
        let helper = spawn_when_waiting(&gate, |source| {
            source.emit(ChangedProperties::new().with("RSSI", -40i64));
            source.emit(ChangedProperties::new().with("Connected", true));
        });

        let result = gate.wait_for_bool("Connected", true, Duration::from_secs(5));
        helper.join().unwrap();

        assert!(result.is_ok());
        assert_eq!(gate.source.listener_count(), 0);
        assert_eq!(gate.source.cancelled.lock().len(), 1);
        assert!(!gate.is_waiting());
    }

    #[test]
    fn test_wait_times_out() {
        let gate = Arc::new(WaitGate::new("adapter", Arc::new(ManualSource::default())));
        let helper = spawn_when_waiting(&gate, |source| {
            source.emit(ChangedProperties::new().with("Discovering", false));
            source.fire_all_timers();
        });

        let result = gate.wait_ms(|c: &ChangedProperties| c.get_bool("Discovering") == Some(true), 1000);
        helper.join().unwrap();

        assert_eq!(
            result,
            Err(WaitError::Timeout {
                target: "adapter".to_string(),
                timeout_ms: 1000
            })
        );
        assert_eq!(gate.source.listener_count(), 0);
    }

    #[test]
    fn test_late_timer_does_not_leak_into_next_wait() {
        let gate = Arc::new(WaitGate::new("dev", Arc::new(ManualSource::default())));

        // Satisfy the first wait, but keep its timer callback alive as if the
        // source raced the cancellation.
        let helper = spawn_when_waiting(&gate, |source| {
            let stale = std::mem::take(&mut *source.timers.lock());
            source.emit(ChangedProperties::new().with("Connected", true));
            for (_, callback) in stale {
                callback();
            }
        });
        assert!(gate.wait_for_bool("Connected", true, Duration::from_secs(5)).is_ok());
        helper.join().unwrap();

        let helper = spawn_when_waiting(&gate, |source| {
            source.emit(ChangedProperties::new().with("Connected", false));
        });
        assert!(gate.wait_for_bool("Connected", false, Duration::from_secs(5)).is_ok());
        helper.join().unwrap();
    }

    #[test]
    fn test_change_raised_by_trigger_is_not_missed() {
        let gate = WaitGate::new("dev", Arc::new(ManualSource::default()));

        // The source delivers synchronously, so the change lands inside the
        // trigger, before the caller starts blocking.
        let result = gate.wait_after(
            crate::predicate::bool_property("ServicesResolved", true),
            Duration::from_secs(5),
            || {
                gate.source
                    .emit(ChangedProperties::new().with("ServicesResolved", true));
                Ok::<(), WaitError>(())
            },
        );

        assert!(result.is_ok());
        assert_eq!(gate.source.listener_count(), 0);
        assert!(!gate.is_waiting());
    }

    #[derive(Debug, PartialEq)]
    enum ConnectError {
        Refused,
        Wait(WaitError),
    }

    impl From<WaitError> for ConnectError {
        fn from(e: WaitError) -> Self {
            ConnectError::Wait(e)
        }
    }

    #[test]
    fn test_failed_trigger_tears_down() {
        let gate = WaitGate::new("dev", Arc::new(ManualSource::default()));

        let result = gate.wait_after(
            crate::predicate::bool_property("Connected", true),
            Duration::from_secs(5),
            || Err(ConnectError::Refused),
        );

        assert_eq!(result, Err(ConnectError::Refused));
        assert_eq!(gate.source.listener_count(), 0);
        assert!(gate.source.timers.lock().is_empty());
        assert!(!gate.is_waiting());
    }

    #[test]
    fn test_timeout_ms_saturates() {
        let gate = Arc::new(WaitGate::new("dev", Arc::new(ManualSource::default())));
        let helper = spawn_when_waiting(&gate, |source| source.fire_all_timers());

        let result = gate.wait_for_bool("Connected", true, Duration::MAX);
        helper.join().unwrap();

        assert!(matches!(
            result,
            Err(WaitError::Timeout { timeout_ms: u64::MAX, .. })
        ));
    }

    #[test]
    fn test_concurrent_wait_panics() {
        let gate = Arc::new(WaitGate::new("dev", Arc::new(ManualSource::default())));
        gate.active.store(true, Ordering::Release);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = gate.wait_for_bool("Connected", true, Duration::from_millis(10));
        }));
        assert!(outcome.is_err());
    }
}
