mod pattern;
mod window;

pub use pattern::{PatternDetection, PatternKind};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use flow_config::WindowConfig;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::signal::{Signal, SignalValue, WindowEntry, WindowStats};
use window::Window;

/// A bounded per-subscriber queue used for asynchronous dispatch. Overflow
/// drops the oldest undelivered item, matching the sink's synchronous
/// default being the simpler, always-safe choice for producers.
pub struct BoundedQueue {
    inner: Mutex<VecDeque<Signal>>,
    capacity: usize,
    notify: Notify,
}

impl BoundedQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    /// Pushes `signal`, returns `true` if an undelivered item was dropped.
    fn push(&self, signal: Signal) -> bool {
        let mut q = self.inner.lock();
        let dropped = if q.len() >= self.capacity {
            q.pop_front();
            true
        } else {
            false
        };
        q.push_back(signal);
        drop(q);
        self.notify.notify_one();
        dropped
    }

    pub async fn recv(&self) -> Signal {
        loop {
            if let Some(signal) = self.inner.lock().pop_front() {
                return signal;
            }
            self.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Signal> {
        self.inner.lock().pop_front()
    }
}

#[derive(Clone)]
enum Dispatch {
    Sync(Arc<dyn Fn(&Signal) + Send + Sync>),
    Async(Arc<BoundedQueue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct SinkState {
    ring: VecDeque<Signal>,
    max_capacity: usize,
    max_age: ChronoDuration,
    next_seq: u64,
    next_sub_id: u64,
    subscribers: Vec<(u64, Dispatch)>,
    windows: HashMap<String, Window>,
    default_window_max_items: usize,
    default_window_max_age: ChronoDuration,
}

impl SinkState {
    fn append(&mut self, mut signal: Signal, now: DateTime<Utc>) -> Signal {
        self.next_seq += 1;
        signal.seq = self.next_seq;
        self.ring.push_back(signal.clone());
        self.evict_ring(now);
        signal
    }

    fn evict_ring(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.ring.front() {
            if now - front.emitted_at > self.max_age {
                self.ring.pop_front();
            } else {
                break;
            }
        }
        while self.ring.len() > self.max_capacity {
            self.ring.pop_front();
        }
    }

    fn window_mut(&mut self, name: &str) -> &mut Window {
        self.windows.entry(name.to_string()).or_insert_with(|| {
            Window::new(self.default_window_max_items, self.default_window_max_age)
        })
    }
}

/// In-process, lifetime-scoped signal bus: an append-only ring of emitted
/// signals, fan-out subscriptions, and named sliding windows.
///
/// Operations never fail: unknown windows behave as empty, eviction is
/// idempotent, and subscriber dispatch never blocks a producer beyond the
/// bounded-queue discipline described on [`SignalSink::subscribe_async`].
pub struct SignalSink {
    state: Mutex<SinkState>,
}

impl SignalSink {
    pub fn new(max_capacity: usize, max_age: std::time::Duration, window_defaults: &WindowConfig) -> Self {
        Self {
            state: Mutex::new(SinkState {
                ring: VecDeque::new(),
                max_capacity: max_capacity.max(1),
                max_age: ChronoDuration::from_std(max_age).unwrap_or_else(|_| ChronoDuration::weeks(5200)),
                next_seq: 0,
                next_sub_id: 0,
                subscribers: Vec::new(),
                windows: HashMap::new(),
                default_window_max_items: window_defaults.max_items,
                default_window_max_age: ChronoDuration::from_std(window_defaults.max_age.as_duration())
                    .unwrap_or(ChronoDuration::minutes(10)),
            }),
        }
    }

    /// Append `signal` and fan it out to every subscriber registered at this
    /// moment, in FIFO registration order. Subscriber callbacks run inline
    /// under the sink's writer lock and must not call back into the sink.
    pub fn emit(&self, signal: Signal, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let appended = state.append(signal, now);

        let subscribers = state.subscribers.clone();
        let mut drop_ids = Vec::new();
        for (id, dispatch) in &subscribers {
            match dispatch {
                Dispatch::Sync(handler) => handler(&appended),
                Dispatch::Async(queue) => {
                    if queue.push(appended.clone()) {
                        drop_ids.push(*id);
                    }
                }
            }
        }

        for id in drop_ids {
            let drop_signal = Signal::new(
                appended.run_id.clone(),
                "sink",
                "sink.subscriber.drop",
                SignalValue::Number(id as f64),
                now,
            );
            state.append(drop_signal, now);
        }
    }

    /// Most recent signal with the given `name`, or `None`.
    pub fn get(&self, name: &str) -> Option<Signal> {
        self.state.lock().ring.iter().rev().find(|s| s.name == name).cloned()
    }

    pub fn get_all(&self) -> Vec<Signal> {
        self.state.lock().ring.iter().cloned().collect()
    }

    /// Signals appended after `since` (sink-internal sequence number), in
    /// append order. A subscriber that misses emissions calls this (or
    /// `get_all`) to catch up — new subscriptions never replay history.
    pub fn get_since(&self, since_seq: u64) -> Vec<Signal> {
        self.state
            .lock()
            .ring
            .iter()
            .filter(|s| s.seq > since_seq)
            .cloned()
            .collect()
    }

    pub fn latest_seq(&self) -> u64 {
        self.state.lock().next_seq
    }

    pub fn subscribe_sync(&self, handler: Arc<dyn Fn(&Signal) + Send + Sync>) -> SubscriptionHandle {
        let mut state = self.state.lock();
        state.next_sub_id += 1;
        let id = state.next_sub_id;
        state.subscribers.push((id, Dispatch::Sync(handler)));
        SubscriptionHandle(id)
    }

    /// Registers a bounded-queue subscriber. Producers never block on it:
    /// overflow drops the oldest undelivered signal and raises
    /// `sink.subscriber.drop`.
    pub fn subscribe_async(&self, capacity: usize) -> (SubscriptionHandle, Arc<BoundedQueue>) {
        let queue = Arc::new(BoundedQueue::new(capacity));
        let mut state = self.state.lock();
        state.next_sub_id += 1;
        let id = state.next_sub_id;
        state.subscribers.push((id, Dispatch::Async(queue.clone())));
        (SubscriptionHandle(id), queue)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.state.lock().subscribers.retain(|(id, _)| *id != handle.0);
    }

    /// Installs non-default bounds for a window before its first use. A
    /// no-op if the window already exists.
    pub fn configure_window(&self, name: &str, max_items: usize, max_age: std::time::Duration) {
        let mut state = self.state.lock();
        state.windows.entry(name.to_string()).or_insert_with(|| {
            Window::new(max_items, ChronoDuration::from_std(max_age).unwrap_or(ChronoDuration::minutes(10)))
        });
    }

    pub fn window_add(&self, name: &str, key: Option<String>, entity: SignalValue, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.window_mut(name).push(now, key, entity);
    }

    pub fn window_query(&self, name: &str) -> Vec<WindowEntry> {
        self.state
            .lock()
            .windows
            .get(name)
            .map(Window::query)
            .unwrap_or_default()
    }

    pub fn window_sample(&self, name: &str, n: usize, seed: Option<u64>) -> Vec<WindowEntry> {
        self.state
            .lock()
            .windows
            .get(name)
            .map(|w| w.sample(n, seed))
            .unwrap_or_default()
    }

    pub fn window_stats(&self, name: &str) -> WindowStats {
        self.state
            .lock()
            .windows
            .get(name)
            .map(Window::stats)
            .unwrap_or(WindowStats {
                count: 0,
                oldest: None,
                newest: None,
                timespan_ms: 0,
            })
    }

    pub fn get_unprocessed(&self, name: &str) -> Vec<WindowEntry> {
        self.state
            .lock()
            .windows
            .get(name)
            .map(Window::unprocessed)
            .unwrap_or_default()
    }

    pub fn mark_processed(&self, name: &str, fingerprints: &[u64]) {
        if let Some(window) = self.state.lock().windows.get_mut(name) {
            window.mark_processed(fingerprints);
        }
    }

    pub fn detect_patterns(&self, name: &str, kind: PatternKind, now: DateTime<Utc>) -> Vec<PatternDetection> {
        let entries = self.window_query(name);
        pattern::detect(&entries, kind, now)
    }
}
