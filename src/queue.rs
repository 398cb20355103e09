//! Deduplicating work queue with per-item exponential backoff
//!
//! Producers `push` from any task. A single consumer `pop`s an item,
//! processes it and then marks it either `done_forget` (success, reset the
//! backoff) or `done_retry` (failure, re-push after a delay that doubles with
//! every consecutive failure of the same item).

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

/// Default delay before the first retry of a failed item
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default ceiling for retry delays
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Exponential per-failure backoff, capped at `max`
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay after `failures` previous consecutive failures
    pub fn delay(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

struct State<T> {
    queue: VecDeque<T>,
    /// Items waiting to be processed
    dirty: HashSet<T>,
    /// Items handed out by `pop` and not yet marked done
    processing: HashSet<T>,
    failures: HashMap<T, u32>,
    shutting_down: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    backoff: Backoff,
}

/// Work queue shared between event producers and the reconcile worker
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

impl<T> WorkQueue<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(backoff: Backoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    failures: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        // The lock is never held across user code, so a poisoned lock still
        // guards consistent data.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an item. Never blocks. An item that is already waiting is not
    /// queued twice; one that is being processed is queued again once the
    /// consumer marks it done.
    pub fn push(&self, item: T) {
        let mut state = self.state();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Wait for the next item. Returns `None` once the queue is shut down.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
            }

            notified.await;
        }
    }

    /// Finish processing `item` and reset its failure count
    pub fn done_forget(&self, item: &T) {
        let mut state = self.state();
        state.failures.remove(item);
        self.finish(state, item);
    }

    /// Finish processing `item` and push it again after a backoff delay
    pub fn done_retry(&self, item: T) {
        let mut state = self.state();
        let failures = state.failures.entry(item.clone()).or_insert(0);
        let delay = self.inner.backoff.delay(*failures);
        *failures = failures.saturating_add(1);
        let shutting_down = state.shutting_down;
        self.finish(state, &item);

        if shutting_down {
            return;
        }
        debug!(delay_ms = delay.as_millis() as u64, "Scheduling retry");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.push(item);
        });
    }

    fn finish(&self, mut state: MutexGuard<'_, State<T>>, item: &T) {
        state.processing.remove(item);
        if state.dirty.contains(item) && !state.shutting_down {
            state.queue.push_back(item.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stop accepting items and wake every waiting consumer
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Number of items waiting to be popped
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consecutive failures recorded for `item`
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.state().failures.get(item).copied().unwrap_or(0)
    }
}
