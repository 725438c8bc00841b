//! Rate-limited work queue with per-key coalescing
//!
//! A key added while it is already waiting is collapsed into the existing
//! entry; a key added while it is being processed is marked dirty and
//! re-queued when its processing finishes. Failed keys are re-added with
//! exponential per-key backoff. After [`RateLimitingQueue::shut_down`] the
//! queue refuses new work but still hands out what is already queued, so
//! workers drain naturally before exiting.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K> Default for State<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            failures: HashMap::new(),
            shutting_down: false,
        }
    }
}

/// Work queue with per-key coalescing and rate-limited retries
pub struct RateLimitingQueue<K> {
    state: Mutex<State<K>>,
    // Counts queued items; closed on shutdown to wake blocked workers.
    items: Semaphore,
    base_delay: Duration,
    max_delay: Duration,
}

impl<K> RateLimitingQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Create a queue with the default retry backoff (5ms doubling, capped
    /// at 1000s)
    pub fn new() -> Arc<Self> {
        Self::with_rate_limits(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    /// Create a queue with a custom retry backoff
    pub fn with_rate_limits(base_delay: Duration, max_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            items: Semaphore::new(0),
            base_delay,
            max_delay,
        })
    }

    /// Add `key` to the queue
    ///
    /// Duplicate adds collapse; an add during processing re-queues the key
    /// once processing finishes. Adds after shutdown are dropped.
    pub fn add(&self, key: K) {
        let mut state = self.state.lock().expect("work queue lock poisoned");
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        self.items.add_permits(1);
    }

    /// Re-add `key` after a failure, delayed by exponential per-key backoff
    pub fn add_rate_limited(self: Arc<Self>, key: K) {
        let delay = {
            let mut state = self.state.lock().expect("work queue lock poisoned");
            if state.shutting_down {
                return;
            }
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let exponent = *failures;
            *failures += 1;
            let delay = self
                .base_delay
                .saturating_mul(2u32.saturating_pow(exponent));
            delay.min(self.max_delay)
        };

        debug!(delay_ms = delay.as_millis() as u64, "requeueing with backoff");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            self.add(key);
        });
    }

    /// Clear the failure history for `key` after a successful sync
    pub fn forget(&self, key: &K) {
        let mut state = self.state.lock().expect("work queue lock poisoned");
        state.failures.remove(key);
    }

    /// Number of retries `key` has accumulated
    pub fn retries(&self, key: &K) -> u32 {
        let state = self.state.lock().expect("work queue lock poisoned");
        state.failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key
    ///
    /// Returns `None` once the queue is shut down and drained. The returned
    /// key is marked as processing; the caller must call [`Self::done`] when
    /// finished with it.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut state = self.state.lock().expect("work queue lock poisoned");
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            match self.items.acquire().await {
                Ok(permit) => permit.forget(),
                // Closed on shutdown; loop once more to drain stragglers.
                Err(_) => {}
            }
        }
    }

    /// Mark processing of `key` as finished
    ///
    /// If the key went dirty while it was processing, it is re-queued so the
    /// latest state gets reconciled.
    pub fn done(&self, key: &K) {
        let mut state = self.state.lock().expect("work queue lock poisoned");
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            self.items.add_permits(1);
        }
    }

    /// Stop accepting new work and wake blocked workers
    ///
    /// Keys already queued are still handed out, so workers drain the queue
    /// before observing the shutdown.
    pub fn shut_down(&self) {
        let mut state = self.state.lock().expect("work queue lock poisoned");
        state.shutting_down = true;
        self.items.close();
    }

    /// Number of keys currently waiting (excluding in-flight processing)
    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("work queue lock poisoned");
        state.queue.len()
    }

    /// Returns true when no keys are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
