//! In-process staging store with per-key expiry.
//!
//! Sequences and recipient sets live in two maps behind one mutex, so every
//! primitive (and [`StagingStore::drain`], which clears both collections) is
//! atomic with respect to the others. Expiry is lazy: an entry past its
//! deadline is invisible to reads and replaced by writes. The janitor task
//! reclaims the memory of keys nobody touches again.
//!
//! Deadlines use [`tokio::time::Instant`] so a paused test clock controls them.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use events::{AggregationKey, Recipient, StagedBatch, StagedEvent, StagingError, StagingStore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Default> Expiring<T> {
    fn empty(now: Instant) -> Self {
        Self {
            value: T::default(),
            expires_at: now,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct Collections {
    sequences: HashMap<AggregationKey, Expiring<Vec<StagedEvent>>>,
    sets: HashMap<AggregationKey, Expiring<BTreeSet<Recipient>>>,
}

impl Collections {
    fn take_sequence(&mut self, key: &AggregationKey, now: Instant) -> Vec<StagedEvent> {
        self.sequences
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
            .unwrap_or_default()
    }

    fn take_set(&mut self, key: &AggregationKey, now: Instant) -> BTreeSet<Recipient> {
        self.sets
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
            .unwrap_or_default()
    }
}

/// Staging store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryStagingStore {
    collections: Mutex<Collections>,
}

impl InMemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live records staged for `key`.
    pub fn sequence_len(&self, key: &AggregationKey) -> usize {
        let now = Instant::now();
        self.lock()
            .sequences
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map_or(0, |entry| entry.value.len())
    }

    /// Number of live recipients staged for `key`.
    pub fn set_len(&self, key: &AggregationKey) -> usize {
        let now = Instant::now();
        self.lock()
            .sets
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map_or(0, |entry| entry.value.len())
    }

    /// Returns `true` if neither records nor recipients are live for any key.
    pub fn is_empty(&self) -> bool {
        let now = Instant::now();
        let collections = self.lock();
        !collections.sequences.values().any(|entry| entry.is_live(now))
            && !collections.sets.values().any(|entry| entry.is_live(now))
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut collections = self.lock();
        let before = collections.sequences.len() + collections.sets.len();
        collections.sequences.retain(|_, entry| entry.is_live(now));
        collections.sets.retain(|_, entry| entry.is_live(now));
        before - (collections.sequences.len() + collections.sets.len())
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `period` until the
    /// store is dropped.
    pub fn spawn_janitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged, "expired staging entries purged");
                }
            }
        })
    }
}

#[async_trait]
impl StagingStore for InMemoryStagingStore {
    async fn append_to_sequence(
        &self,
        key: &AggregationKey,
        record: &StagedEvent,
        ttl: Duration,
    ) -> Result<(), StagingError> {
        let now = Instant::now();
        let mut collections = self.lock();
        let entry = collections
            .sequences
            .entry(key.clone())
            .or_insert_with(|| Expiring::empty(now));
        if !entry.is_live(now) {
            entry.value.clear();
        }
        entry.value.push(record.clone());
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn union_into_set(
        &self,
        key: &AggregationKey,
        members: &[Recipient],
        ttl: Duration,
    ) -> Result<(), StagingError> {
        let now = Instant::now();
        let mut collections = self.lock();
        let entry = collections
            .sets
            .entry(key.clone())
            .or_insert_with(|| Expiring::empty(now));
        if !entry.is_live(now) {
            entry.value.clear();
        }
        entry.value.extend(members.iter().cloned());
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn read_and_clear_sequence(
        &self,
        key: &AggregationKey,
    ) -> Result<Vec<StagedEvent>, StagingError> {
        Ok(self.lock().take_sequence(key, Instant::now()))
    }

    async fn read_and_clear_set(
        &self,
        key: &AggregationKey,
    ) -> Result<BTreeSet<Recipient>, StagingError> {
        Ok(self.lock().take_set(key, Instant::now()))
    }

    async fn drain(&self, key: &AggregationKey) -> Result<StagedBatch, StagingError> {
        let now = Instant::now();
        let mut collections = self.lock();
        Ok(StagedBatch {
            events: collections.take_sequence(key, now),
            recipients: collections.take_set(key, now),
        })
    }
}
