//! Single-threaded event dispatcher
//!
//! A reference [`EventSource`]: one background thread delivers events to
//! listeners in submission order and fires timers at their deadlines. Used
//! by simulated devices and tests; a real transport brings its own source.

use crate::source::{EventSource, Listener, ListenerId, TimerCallback, TimerId};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type SharedListener<E> = Arc<dyn Fn(&E) + Send + Sync>;
type ListenerMap<E> = Arc<Mutex<BTreeMap<ListenerId, SharedListener<E>>>>;
type TimerMap = Arc<Mutex<BTreeMap<TimerId, (Instant, TimerCallback)>>>;

enum Command<E> {
    Emit(E),
    /// The timer set changed; recompute the next deadline
    Wake,
    Shutdown,
}

/// Event loop running on its own dispatch thread
///
/// Due timers are fired before every queued command, so a busy event
/// stream never holds a deadline back.
pub struct EventLoop<E: Send + Sync + 'static> {
    name: String,
    tx: Sender<Command<E>>,
    listeners: ListenerMap<E>,
    timers: TimerMap,
    running: Arc<AtomicBool>,
    next_id: AtomicU64,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Send + Sync + 'static> EventLoop<E> {
    /// Spawn the dispatch thread
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (tx, rx) = unbounded::<Command<E>>();
        let listeners: ListenerMap<E> = Arc::new(Mutex::new(BTreeMap::new()));
        let timers: TimerMap = Arc::new(Mutex::new(BTreeMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let loop_listeners = Arc::clone(&listeners);
        let loop_timers = Arc::clone(&timers);
        let loop_running = Arc::clone(&running);
        let loop_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!("Event loop {} running", loop_name);

                while loop_running.load(Ordering::Acquire) {
                    fire_due_timers(&loop_timers);

                    let next_deadline = loop_timers
                        .lock()
                        .values()
                        .map(|(deadline, _)| *deadline)
                        .min();
                    let command = match next_deadline {
                        Some(deadline) => rx.recv_deadline(deadline),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };

                    match command {
                        Ok(Command::Emit(event)) => {
                            let snapshot: Vec<SharedListener<E>> =
                                loop_listeners.lock().values().cloned().collect();
                            for listener in snapshot {
                                listener(&event);
                            }
                        }
                        Ok(Command::Wake) | Err(RecvTimeoutError::Timeout) => {}
                        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                debug!(
                    "Event loop {} stopped ({} timers dropped)",
                    loop_name,
                    loop_timers.lock().len()
                );
            })?;

        info!("Started event loop {}", name);

        Ok(Self {
            thread_id: handle.thread().id(),
            name,
            tx,
            listeners,
            timers,
            running,
            next_id: AtomicU64::new(1),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue an event for delivery to all listeners
    pub fn emit(&self, event: E) {
        if self.tx.send(Command::Emit(event)).is_err() {
            warn!("Event loop {} is shut down, event dropped", self.name);
        }
    }

    /// Queue an event for delivery after `delay`
    pub fn emit_after(&self, delay: Duration, event: E) -> TimerId {
        let tx = self.tx.clone();
        self.schedule_timeout(
            delay,
            Box::new(move || {
                let _ = tx.send(Command::Emit(event));
            }),
        )
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Number of armed timers
    pub fn pending_timers(&self) -> usize {
        self.timers.lock().len()
    }

    /// Stop the dispatch thread. Queued events and pending timers are
    /// dropped without being delivered.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.tx.send(Command::Shutdown);
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("Event loop {} panicked", self.name);
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Run every timer whose deadline has passed, earliest first. Callbacks run
/// outside the lock so they may arm new timers.
fn fire_due_timers(timers: &TimerMap) {
    let now = Instant::now();
    let mut due: Vec<(Instant, TimerCallback)> = {
        let mut timers = timers.lock();
        let ids: Vec<TimerId> = timers
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        ids.iter().filter_map(|id| timers.remove(id)).collect()
    };
    due.sort_by_key(|(deadline, _)| *deadline);
    for (_, callback) in due {
        callback();
    }
}

impl<E: Send + Sync + 'static> EventSource for EventLoop<E> {
    type Event = E;

    fn subscribe(&self, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id());
        self.listeners.lock().insert(id, Arc::from(listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    fn schedule_timeout(&self, after: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id());
        if !self.running.load(Ordering::Acquire) {
            warn!("Event loop {} is shut down, timer {:?} never fires", self.name, id);
            return id;
        }
        let now = Instant::now();
        // Saturate instead of overflowing on `Duration::MAX`
        let deadline = now
            .checked_add(after)
            .unwrap_or_else(|| now + Duration::from_secs(u64::from(u32::MAX)));
        self.timers.lock().insert(id, (deadline, callback));
        let _ = self.tx.send(Command::Wake);
        id
    }

    fn cancel_timeout(&self, id: TimerId) {
        if self.timers.lock().remove(&id).is_some() {
            let _ = self.tx.send(Command::Wake);
        }
    }

    fn dispatch_thread(&self) -> Option<ThreadId> {
        Some(self.thread_id)
    }
}

impl<E: Send + Sync + 'static> Drop for EventLoop<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
