//! Debounce timer registry.
//!
//! Holds at most one pending timer per [`AggregationKey`]. Per key the state
//! machine is `ABSENT → ARMED → (re-armed → ARMED) | (fired → ABSENT)`.
//!
//! Each timer is a spawned tokio task that sleeps for the delay, then
//! *claims* its slot under the registry lock before running its action. A
//! timer that finds a different slot in place (re-armed) or no slot at all
//! (cancelled) exits without running. Because the slot is removed before the
//! action starts, a concurrent [`TimerRegistry::arm`] installs a fresh timer
//! instead of cancelling the action that is already committed to run.
//!
//! Claimed timers count as *running* until their action completes, so
//! shutdown can cancel what is still armed and then
//! [`wait_idle`](TimerRegistry::wait_idle) for what already fired.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use events::AggregationKey;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{debug, error};

struct TimerSlot {
    id: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct Slots {
    next_id: u64,
    armed: HashMap<AggregationKey, TimerSlot>,
    running: usize,
}

/// In-process map from aggregation key to its single pending timer.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    slots: Arc<Mutex<Slots>>,
    idle: Arc<Notify>,
}

/// Marks one fired action as running; released when the action finishes or
/// panics.
struct Running {
    slots: Arc<Mutex<Slots>>,
    idle: Arc<Notify>,
}

impl Drop for Running {
    fn drop(&mut self) {
        let mut slots = lock_slots(&self.slots);
        slots.running = slots.running.saturating_sub(1);
        if slots.running == 0 {
            self.idle.notify_waiters();
        }
    }
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        lock_slots(&self.slots)
    }

    /// Arms the timer for `key`, replacing (and cancelling) any pending one.
    ///
    /// After `delay` the timer releases its slot and runs `action`. Must be
    /// called from within a tokio runtime.
    pub fn arm<F, Fut>(&self, key: AggregationKey, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.lock();
        slots.next_id += 1;
        let id = slots.next_id;

        if let Some(previous) = slots.armed.remove(&key) {
            previous.handle.abort();
            debug!(%key, previous = previous.id, timer = id, "debounce timer re-armed");
        } else {
            debug!(%key, timer = id, "debounce timer armed");
        }

        let registry = Arc::clone(&self.slots);
        let idle = Arc::clone(&self.idle);
        let timer_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if claim(&registry, &timer_key, id) {
                let _running = Running {
                    slots: registry,
                    idle,
                };
                action().await;
            }
        });

        // The task cannot claim before this insert: it blocks on the lock we hold.
        slots.armed.insert(
            key,
            TimerSlot {
                id,
                handle: task.abort_handle(),
            },
        );
    }

    /// Cancels the pending timer for `key`. Returns `false` if none was armed,
    /// including when the timer has already fired.
    pub fn cancel(&self, key: &AggregationKey) -> bool {
        match self.lock().armed.remove(key) {
            Some(slot) => {
                slot.handle.abort();
                debug!(%key, timer = slot.id, "debounce timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer and returns the keys that were armed.
    pub fn cancel_all(&self) -> Vec<AggregationKey> {
        let mut slots = self.lock();
        slots
            .armed
            .drain()
            .map(|(key, slot)| {
                slot.handle.abort();
                key
            })
            .collect()
    }

    /// Returns `true` if a timer is pending for `key`.
    pub fn is_armed(&self, key: &AggregationKey) -> bool {
        self.lock().armed.contains_key(key)
    }

    /// Keys with a pending timer, in no particular order.
    pub fn armed_keys(&self) -> Vec<AggregationKey> {
        self.lock().armed.keys().cloned().collect()
    }

    /// Number of fired timers whose action has not finished yet.
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Waits until no fired action is running.
    ///
    /// Actions that fire while waiting are waited for too. Must not be called
    /// from inside a timer action, which would wait for itself.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().running == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.lock().armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("armed", &self.len())
            .field("running", &self.running())
            .finish()
    }
}

fn lock_slots(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    // Slot bookkeeping stays consistent even if a holder panicked.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the slot owned by timer `id`. Returns `true` if the timer still
/// owned its slot and should run its action, in which case it is counted as
/// running under the same lock.
fn claim(slots: &Mutex<Slots>, key: &AggregationKey, id: u64) -> bool {
    let mut slots = lock_slots(slots);
    match slots.armed.get(key).map(|slot| slot.id) {
        Some(current) if current == id => {
            slots.armed.remove(key);
            slots.running += 1;
            debug!(%key, timer = id, "debounce timer fired");
            true
        }
        Some(current) if current > id => {
            debug!(%key, timer = id, current, "superseded timer woke after re-arm");
            false
        }
        Some(current) => {
            // Ids are issued under the lock in increasing order, so an older
            // timer can never replace a newer one.
            error!(
                %key,
                timer = id,
                current,
                invariant = "at most one live timer per key",
                "timer registry holds an older timer than the one firing"
            );
            if let Some(stale) = slots.armed.remove(key) {
                stale.handle.abort();
            }
            slots.running += 1;
            true
        }
        None => {
            debug!(%key, timer = id, "cancelled timer woke before abort");
            false
        }
    }
}
