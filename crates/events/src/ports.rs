//! Port traits implemented by the infrastructure crates.
//!
//! The aggregation engine depends only on these traits. Each one is
//! deliberately narrow: the engine needs ordered append, set union, and
//! read-and-clear from the staging store, a single fire-once call from the
//! sender, and a best-effort write from the audit sink.
//!
//! Async traits use [`async_trait`] so they stay dyn-compatible and can be held
//! as `Arc<dyn Trait>`.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    AggregationKey, AuditError, AuditRecord, ChangeEvent, DeliveryError, EventKind,
    EventSourceError, Recipient, StagedBatch, StagedEvent, StagingError,
};

// ---------------------------------------------------------------------------
// Staging store
// ---------------------------------------------------------------------------

/// Keyed store holding, per aggregation key, an ordered sequence of staged
/// records and a deduplicated recipient set, each with its own TTL.
///
/// Implementations must provide read-after-write consistency per key: a
/// `read_and_clear_sequence` observes every append that completed before it.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Appends `record` to the key's sequence and refreshes the sequence TTL.
    async fn append_to_sequence(
        &self,
        key: &AggregationKey,
        record: &StagedEvent,
        ttl: Duration,
    ) -> Result<(), StagingError>;

    /// Adds `members` to the key's recipient set and refreshes the set TTL.
    async fn union_into_set(
        &self,
        key: &AggregationKey,
        members: &[Recipient],
        ttl: Duration,
    ) -> Result<(), StagingError>;

    /// Returns the key's whole sequence in insertion order and deletes it.
    async fn read_and_clear_sequence(
        &self,
        key: &AggregationKey,
    ) -> Result<Vec<StagedEvent>, StagingError>;

    /// Returns the key's recipient set and deletes it.
    async fn read_and_clear_set(
        &self,
        key: &AggregationKey,
    ) -> Result<BTreeSet<Recipient>, StagingError>;

    /// Reads and clears both collections for `key`.
    ///
    /// The default runs the two primitives back to back. Stores that can clear
    /// both in one atomic step should override this.
    async fn drain(&self, key: &AggregationKey) -> Result<StagedBatch, StagingError> {
        let events = self.read_and_clear_sequence(key).await?;
        let recipients = self.read_and_clear_set(key).await?;
        Ok(StagedBatch { events, recipients })
    }
}

// ---------------------------------------------------------------------------
// Notification sender
// ---------------------------------------------------------------------------

/// Delivers a rendered digest to its recipients. Called at most once per flush.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends `body` to `recipients`.
    async fn send(&self, body: &str, recipients: &[Recipient]) -> Result<(), DeliveryError>;
}

// ---------------------------------------------------------------------------
// Audit sink
// ---------------------------------------------------------------------------

/// Durable, best-effort record of every raw inbound event.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one audit record.
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

// ---------------------------------------------------------------------------
// Digest renderer
// ---------------------------------------------------------------------------

/// Turns a burst of staged records into one message body.
///
/// Implementations must be pure: the same input always yields the same body,
/// with no I/O and no hidden state.
pub trait DigestRenderer: Send + Sync {
    /// Renders `events` (all of `kind`, in insertion order) into a message body.
    fn render(&self, kind: EventKind, events: &[StagedEvent]) -> String;
}

// ---------------------------------------------------------------------------
// Event source
// ---------------------------------------------------------------------------

/// A stream of normalized inbound events.
#[async_trait]
pub trait EventSource: Send {
    /// Returns the next event, or `Ok(None)` once the stream has ended.
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>, EventSourceError>;
}
