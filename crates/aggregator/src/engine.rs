//! The aggregation engine: stage on ingest, deliver one digest per quiet period.
//!
//! ## Ingest
//!
//! 1. Hand the raw event to the audit queue (never awaited).
//! 2. Append a [`StagedEvent`](events::StagedEvent) to the key's sequence, refreshing its TTL. A
//!    failure here drops the event from aggregation and arms nothing.
//! 3. Union the event's recipients into the key's set, refreshing its TTL.
//! 4. Re-arm the key's debounce timer.
//!
//! ## Flush
//!
//! Runs when a key's timer fires. Drains the key's staged records and
//! recipients in one step, renders them, and calls the sender once. An empty
//! drain is a no-op, which is what makes a double-scheduled flush harmless.
//! An `ingest` that lands after the drain starts a fresh sequence and a fresh
//! timer, so consecutive flush cycles never share data.

use std::sync::Arc;

use events::{
    AggregationKey, ChangeEvent, DigestRenderer, NotificationSender, Recipient, StagedBatch,
    StagingStore, Timestamp,
};
use tracing::{debug, error, info, instrument, warn};

use crate::{AggregatorConfig, AuditHandle, FlushError, TimerRegistry};

/// Collaborators injected into the engine.
pub struct Collaborators {
    pub store: Arc<dyn StagingStore>,
    pub sender: Arc<dyn NotificationSender>,
    pub renderer: Arc<dyn DigestRenderer>,
    /// Audit queue; `None` disables auditing.
    pub audit: Option<AuditHandle>,
}

/// What `ingest` did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event is staged and the key's timer is armed.
    Staged { key: AggregationKey },
    /// The staging store failed; the event will not appear in any digest.
    Dropped { key: AggregationKey },
}

impl IngestOutcome {
    pub fn key(&self) -> &AggregationKey {
        match self {
            IngestOutcome::Staged { key } | IngestOutcome::Dropped { key } => key,
        }
    }

    pub fn is_staged(&self) -> bool {
        matches!(self, IngestOutcome::Staged { .. })
    }
}

/// What a successful `flush` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was staged (already flushed, or expired).
    Empty,
    /// Records were staged but nobody was listed to receive them. They are
    /// discarded.
    NoRecipients { events: usize },
    /// One digest covering `events` records went to `recipients`.
    Delivered {
        events: usize,
        recipients: Vec<Recipient>,
    },
}

struct EngineInner {
    config: AggregatorConfig,
    store: Arc<dyn StagingStore>,
    sender: Arc<dyn NotificationSender>,
    renderer: Arc<dyn DigestRenderer>,
    audit: Option<AuditHandle>,
    timers: TimerRegistry,
}

/// Debounced event-aggregation and flush engine.
///
/// Cheap to clone; clones share staging, timers, and collaborators.
#[derive(Clone)]
pub struct AggregationEngine {
    inner: Arc<EngineInner>,
}

impl AggregationEngine {
    pub fn new(config: AggregatorConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            sender,
            renderer,
            audit,
        } = collaborators;
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                sender,
                renderer,
                audit,
                timers: TimerRegistry::new(),
            }),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    /// Stages `event` and (re)starts its key's debounce window.
    ///
    /// Never fails: staging errors are logged and reported as
    /// [`IngestOutcome::Dropped`]. Must be called from within a tokio runtime.
    #[instrument(
        name = "ingest",
        skip_all,
        fields(kind = %event.kind(), actor = %event.actor, subject = %event.subject)
    )]
    pub async fn ingest(&self, event: ChangeEvent) -> IngestOutcome {
        let inner = &self.inner;
        if let Some(audit) = &inner.audit {
            audit.record(event.clone());
        }

        let key = event.aggregation_key();
        let ttl = inner.config.staging_ttl();
        let record = event.to_staged(Timestamp::now());

        if let Err(error) = inner.store.append_to_sequence(&key, &record, ttl).await {
            warn!(%key, %error, "staging failed; event dropped from aggregation");
            return IngestOutcome::Dropped { key };
        }

        if !event.recipients.is_empty() {
            if let Err(error) = inner.store.union_into_set(&key, &event.recipients, ttl).await {
                // The record is staged; keep going so it still gets flushed.
                warn!(
                    %key,
                    %error,
                    recipients = event.recipients.len(),
                    "recipient staging failed; digest may miss recipients"
                );
            }
        }

        self.arm(key.clone());
        debug!(%key, "event staged");
        IngestOutcome::Staged { key }
    }

    fn arm(&self, key: AggregationKey) {
        let engine = self.clone();
        let flush_key = key.clone();
        self.inner
            .timers
            .arm(key, self.inner.config.debounce_delay(), move || async move {
                // Failures are logged inside flush.
                let _ = engine.flush(&flush_key).await;
            });
    }

    /// Reads, clears, renders, and delivers everything staged for `key`.
    ///
    /// Normally driven by the key's timer. Calling it directly is safe: a
    /// second call with nothing newly staged returns [`FlushOutcome::Empty`].
    /// A pending timer is left alone, since it may belong to an ingest that
    /// arrived after this drain.
    #[instrument(name = "flush", skip_all, fields(key = %key))]
    pub async fn flush(&self, key: &AggregationKey) -> Result<FlushOutcome, FlushError> {
        let inner = &self.inner;

        let StagedBatch { events, recipients } = match inner.store.drain(key).await {
            Ok(batch) => batch,
            Err(error) => {
                error!(%error, "could not read staged events; flush aborted");
                return Err(FlushError::Read(error));
            }
        };

        if events.is_empty() {
            debug!("nothing staged; flush is a no-op");
            return Ok(FlushOutcome::Empty);
        }

        if recipients.is_empty() {
            info!(events = events.len(), "no recipients staged; digest discarded");
            return Ok(FlushOutcome::NoRecipients {
                events: events.len(),
            });
        }

        let body = inner.renderer.render(key.kind(), &events);
        let recipients: Vec<Recipient> = recipients.into_iter().collect();

        match inner.sender.send(&body, &recipients).await {
            Ok(()) => {
                info!(
                    events = events.len(),
                    recipients = recipients.len(),
                    "digest delivered"
                );
                Ok(FlushOutcome::Delivered {
                    events: events.len(),
                    recipients,
                })
            }
            Err(error) => {
                error!(
                    %error,
                    events = events.len(),
                    recipients = recipients.len(),
                    "digest delivery failed; staged events are not replayed"
                );
                Err(FlushError::Delivery(error))
            }
        }
    }

    /// Cancels every pending timer and flushes those keys now.
    ///
    /// Used on shutdown so a burst in progress is not left to expire. Also
    /// waits for timer flushes that fired earlier and are still delivering.
    /// Returns the number of keys flushed; per-key failures are logged.
    pub async fn flush_pending(&self) -> usize {
        let keys = self.inner.timers.cancel_all();
        if !keys.is_empty() {
            info!(keys = keys.len(), "flushing pending digests");
        }
        for key in &keys {
            let _ = self.flush(key).await;
        }
        // Timers that fired before the cancel are still delivering.
        self.inner.timers.wait_idle().await;
        keys.len()
    }

    /// Keys whose debounce window is currently open.
    pub fn pending_keys(&self) -> Vec<AggregationKey> {
        self.inner.timers.armed_keys()
    }

    /// Returns `true` if `key` has a pending flush.
    pub fn is_pending(&self, key: &AggregationKey) -> bool {
        self.inner.timers.is_armed(key)
    }
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("config", &self.inner.config)
            .field("timers", &self.inner.timers)
            .finish_non_exhaustive()
    }
}
