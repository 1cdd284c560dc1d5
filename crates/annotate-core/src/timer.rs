//! Timer-per-key primitives
//!
//! - [`KeyedDebouncer`]: trailing-edge debounce. Every `schedule` for a key
//!   cancels the pending timer for that key and starts a new one; only the
//!   most recent action runs, once the key has been quiet for the window.
//! - [`KeyedThrottle`]: leading + trailing throttle. The first submission for
//!   an idle key runs at once; submissions inside the window collapse into one
//!   trailing run at the end of the window.
//!
//! Both run on tokio timers, so tests can drive them with paused time.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Deferred unit of work
pub type Action = BoxFuture<'static, ()>;

struct Pending {
    generation: u64,
    action: Action,
    timer: JoinHandle<()>,
}

struct DebounceState<K> {
    next_generation: u64,
    pending: HashMap<K, Pending>,
}

/// Trailing-edge debouncer keyed by `K`
pub struct KeyedDebouncer<K> {
    window: Duration,
    state: Arc<Mutex<DebounceState<K>>>,
}

impl<K> KeyedDebouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create debouncer with a quiet window
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(DebounceState {
                next_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    /// Quiet window
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace the pending action for `key` and restart its timer
    pub fn schedule<F>(&self, key: K, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;

        let shared = Arc::clone(&self.state);
        let window = self.window;
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let due = {
                let mut state = shared.lock();
                let current = state
                    .pending
                    .get(&timer_key)
                    .is_some_and(|p| p.generation == generation);
                if current {
                    state.pending.remove(&timer_key)
                } else {
                    None
                }
            };
            if let Some(pending) = due {
                pending.action.await;
            }
        });

        let replaced = state.pending.insert(
            key,
            Pending {
                generation,
                action: Box::pin(action),
                timer,
            },
        );
        if let Some(old) = replaced {
            old.timer.abort();
        }
    }

    /// Drop the pending action for `key`; true if one was pending
    pub fn cancel(&self, key: &K) -> bool {
        match self.state.lock().pending.remove(key) {
            Some(pending) => {
                pending.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Run the pending action for `key` now; true if one was pending
    pub async fn flush(&self, key: &K) -> bool {
        let pending = self.state.lock().pending.remove(key);
        match pending {
            Some(pending) => {
                pending.timer.abort();
                pending.action.await;
                true
            }
            None => false,
        }
    }

    /// Run every pending action now, returning how many ran
    pub async fn flush_all(&self) -> usize {
        let drained: Vec<Pending> = self.state.lock().pending.drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for pending in drained {
            pending.timer.abort();
            pending.action.await;
        }
        count
    }

    /// Check if `key` has a pending action
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.state.lock().pending.contains_key(key)
    }

    /// Number of keys with a pending action
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl<K> std::fmt::Debug for KeyedDebouncer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedDebouncer")
            .field("window", &self.window)
            .field("pending", &self.state.lock().pending.len())
            .finish()
    }
}

/// How a throttled submission was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Ran immediately
    Immediate,
    /// Folded into the trailing run at the end of the window
    Deferred,
}

struct Slot {
    generation: u64,
    last_run: Instant,
    trailing: Option<Action>,
    armed: bool,
}

/// Leading + trailing throttle keyed by `K`
pub struct KeyedThrottle<K> {
    window: Duration,
    slots: Arc<Mutex<HashMap<K, Slot>>>,
    next_generation: AtomicU64,
}

impl<K> KeyedThrottle<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create throttle with a minimum spacing between runs
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Submit an action for `key`
    ///
    /// Runs it now if `key` has been idle for the whole window; otherwise it
    /// replaces any queued trailing action.
    pub fn submit<F>(&self, key: K, action: F) -> ThrottleDecision
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let now = Instant::now();
        let mut slots = self.slots.lock();

        match slots.get_mut(&key) {
            Some(slot) if slot.armed || now.duration_since(slot.last_run) < self.window => {
                slot.trailing = Some(Box::pin(action));
                if !slot.armed {
                    slot.armed = true;
                    let due = slot.last_run + self.window;
                    let generation = slot.generation;
                    let shared = Arc::clone(&self.slots);
                    tokio::spawn(async move {
                        tokio::time::sleep_until(due).await;
                        let action = {
                            let mut slots = shared.lock();
                            // A slot re-created after `forget` keeps its own timing
                            slots
                                .get_mut(&key)
                                .filter(|slot| slot.generation == generation)
                                .and_then(|slot| {
                                    slot.armed = false;
                                    slot.last_run = Instant::now();
                                    slot.trailing.take()
                                })
                        };
                        if let Some(action) = action {
                            action.await;
                        }
                    });
                }
                ThrottleDecision::Deferred
            }
            _ => {
                slots.insert(
                    key,
                    Slot {
                        generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
                        last_run: now,
                        trailing: None,
                        armed: false,
                    },
                );
                tokio::spawn(action);
                ThrottleDecision::Immediate
            }
        }
    }

    /// Forget a key's history and drop its queued action
    pub fn forget(&self, key: &K) {
        self.slots.lock().remove(key);
    }
}

impl<K> std::fmt::Debug for KeyedThrottle<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedThrottle")
            .field("window", &self.window)
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> BoxFuture<'static, ()>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |value: u32| -> BoxFuture<'static, ()> {
            let sink = Arc::clone(&sink);
            Box::pin(async move { sink.lock().push(value) })
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_runs_only_latest() {
        let debouncer = KeyedDebouncer::new(Duration::from_millis(400));
        let (log, make) = recorder();

        for value in 1..=5 {
            debouncer.schedule("a", make(value));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(log.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(*log.lock(), vec![5]);
        assert!(!debouncer.is_pending(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_restarts_window_on_each_call() {
        let debouncer = KeyedDebouncer::new(Duration::from_millis(400));
        let (log, make) = recorder();

        debouncer.schedule("a", make(1));
        tokio::time::sleep(Duration::from_millis(350)).await;
        debouncer.schedule("a", make(2));
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(log.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*log.lock(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_keys_are_independent() {
        let debouncer = KeyedDebouncer::new(Duration::from_millis(100));
        let (log, make) = recorder();

        debouncer.schedule("a", make(1));
        debouncer.schedule("b", make(2));
        assert_eq!(debouncer.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut seen = log.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_flush() {
        let debouncer = KeyedDebouncer::new(Duration::from_millis(400));
        let (log, make) = recorder();

        debouncer.schedule("a", make(1));
        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));

        debouncer.schedule("b", make(2));
        assert!(debouncer.flush(&"b").await);
        assert_eq!(*log.lock(), vec![2]);

        // Flushed timer must not fire again
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*log.lock(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_all_runs_everything() {
        let debouncer = KeyedDebouncer::new(Duration::from_secs(10));
        let (log, make) = recorder();

        debouncer.schedule(1, make(1));
        debouncer.schedule(2, make(2));
        assert_eq!(debouncer.flush_all().await, 2);
        assert_eq!(log.lock().len(), 2);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_leading_then_single_trailing() {
        let throttle = KeyedThrottle::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));

        let submit = |throttle: &KeyedThrottle<&'static str>| {
            let runs = Arc::clone(&runs);
            throttle.submit("o", async move {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert_eq!(submit(&throttle), ThrottleDecision::Immediate);
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(submit(&throttle), ThrottleDecision::Deferred);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Quiet for a full window: next one is immediate again
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(submit(&throttle), ThrottleDecision::Immediate);
    }
    #[tokio::test(start_paused = true)]
    async fn forgotten_key_timer_leaves_new_slot_alone() {
        let throttle = KeyedThrottle::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));

        let submit = |throttle: &KeyedThrottle<&'static str>| {
            let runs = Arc::clone(&runs);
            throttle.submit("o", async move {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert_eq!(submit(&throttle), ThrottleDecision::Immediate);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(submit(&throttle), ThrottleDecision::Deferred);
        tokio::time::sleep(Duration::from_millis(10)).await;
        throttle.forget(&"o");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(submit(&throttle), ThrottleDecision::Immediate);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(submit(&throttle), ThrottleDecision::Deferred);

        // Old timer fires at 100 ms; the new slot's window runs to 130 ms
        tokio::time::sleep(Duration::from_millis(45)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
