//! Shared doubles and builders for engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aggregator::{AggregationEngine, AggregatorConfig, AuditHandle, Collaborators};
use async_trait::async_trait;
use events::{
    Actor, AggregationKey, AuditError, AuditRecord, AuditSink, ChangeEvent, DeliveryError,
    EventKind, MarkdownDigestRenderer, NotificationSender, Recipient, StagedEvent, StagingError,
    StagingStore, SubjectId, Timestamp, Transition,
};
use staging::InMemoryStagingStore;

/// Default debounce delay used by every engine built here.
pub const DELAY: Duration = AggregatorConfig::DEFAULT_DEBOUNCE_DELAY;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn event(subject: &str, actor: &str, transition: Transition, recipients: &[&str]) -> ChangeEvent {
    ChangeEvent {
        subject: SubjectId::new(subject).unwrap(),
        actor: Actor::new(actor).unwrap(),
        summary: format!("Summary of {subject}"),
        transition,
        recipients: recipients.iter().map(|r| Recipient::new(*r).unwrap()).collect(),
        occurred_at: Timestamp::now(),
    }
}

pub fn status(subject: &str, actor: &str, from: &str, to: &str, recipients: &[&str]) -> ChangeEvent {
    event(
        subject,
        actor,
        Transition::StatusChanged {
            from: from.into(),
            to: to.into(),
        },
        recipients,
    )
}

pub fn key(kind: EventKind, actor: &str) -> AggregationKey {
    AggregationKey::new(kind, Actor::new(actor).unwrap())
}

pub fn engine_with(
    store: Arc<dyn StagingStore>,
    sender: Arc<dyn NotificationSender>,
    audit: Option<AuditHandle>,
) -> AggregationEngine {
    AggregationEngine::new(
        AggregatorConfig::default(),
        Collaborators {
            store,
            sender,
            renderer: Arc::new(MarkdownDigestRenderer::new(None)),
            audit,
        },
    )
}

/// Engine over a real in-memory store and a recording sender.
pub struct Harness {
    pub engine: AggregationEngine,
    pub store: Arc<InMemoryStagingStore>,
    pub sender: Arc<RecordingSender>,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStagingStore::new());
    let sender = Arc::new(RecordingSender::default());
    let engine = engine_with(store.clone(), sender.clone(), None);
    Harness {
        engine,
        store,
        sender,
    }
}

// ---------------------------------------------------------------------------
// Senders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub body: String,
    pub recipients: Vec<String>,
}

#[derive(Default)]
pub struct RecordingSender {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingSender {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, body: &str, recipients: &[Recipient]) -> Result<(), DeliveryError> {
        self.deliveries.lock().unwrap().push(Delivery {
            body: body.to_string(),
            recipients: recipients.iter().map(|r| r.as_str().to_string()).collect(),
        });
        Ok(())
    }
}

/// Records deliveries, but holds every send until the gate is opened.
pub struct GatedSender {
    pub recorded: RecordingSender,
    gate: tokio::sync::Semaphore,
    entered: tokio::sync::Notify,
}

impl Default for GatedSender {
    fn default() -> Self {
        Self {
            recorded: RecordingSender::default(),
            gate: tokio::sync::Semaphore::new(0),
            entered: tokio::sync::Notify::new(),
        }
    }
}

impl GatedSender {
    /// Lets held and future sends through.
    pub fn open(&self) {
        self.gate.add_permits(1);
    }

    /// Resolves once a send is waiting at the gate (or already passed it).
    pub async fn entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl NotificationSender for GatedSender {
    async fn send(&self, body: &str, recipients: &[Recipient]) -> Result<(), DeliveryError> {
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| DeliveryError::Transport {
                message: e.to_string(),
            })?;
        self.recorded.send(body, recipients).await
    }
}

/// Rejects every send and counts the attempts.
#[derive(Default)]
pub struct FailingSender {
    attempts: AtomicUsize,
}

impl FailingSender {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSender for FailingSender {
    async fn send(&self, _body: &str, _recipients: &[Recipient]) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DeliveryError::Rejected {
            code: 310000,
            message: "keywords not in content".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Staging store with switchable failures
// ---------------------------------------------------------------------------

/// Delegates to an in-memory store unless a failure switch is on.
#[derive(Default)]
pub struct FlakyStagingStore {
    pub inner: InMemoryStagingStore,
    pub fail_append: AtomicBool,
    pub fail_union: AtomicBool,
    pub fail_read: AtomicBool,
}

impl FlakyStagingStore {
    fn check(flag: &AtomicBool, operation: &'static str) -> Result<(), StagingError> {
        if flag.load(Ordering::SeqCst) {
            Err(StagingError::unavailable(operation, "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StagingStore for FlakyStagingStore {
    async fn append_to_sequence(
        &self,
        key: &AggregationKey,
        record: &StagedEvent,
        ttl: Duration,
    ) -> Result<(), StagingError> {
        Self::check(&self.fail_append, "append_to_sequence")?;
        self.inner.append_to_sequence(key, record, ttl).await
    }

    async fn union_into_set(
        &self,
        key: &AggregationKey,
        members: &[Recipient],
        ttl: Duration,
    ) -> Result<(), StagingError> {
        Self::check(&self.fail_union, "union_into_set")?;
        self.inner.union_into_set(key, members, ttl).await
    }

    async fn read_and_clear_sequence(
        &self,
        key: &AggregationKey,
    ) -> Result<Vec<StagedEvent>, StagingError> {
        Self::check(&self.fail_read, "read_and_clear_sequence")?;
        self.inner.read_and_clear_sequence(key).await
    }

    async fn read_and_clear_set(
        &self,
        key: &AggregationKey,
    ) -> Result<BTreeSet<Recipient>, StagingError> {
        Self::check(&self.fail_read, "read_and_clear_set")?;
        self.inner.read_and_clear_set(key).await
    }
}

// ---------------------------------------------------------------------------
// Audit sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
