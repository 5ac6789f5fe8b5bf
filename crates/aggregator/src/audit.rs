//! Fire-and-forget audit dispatch.
//!
//! Ingest hands each raw event to an [`AuditHandle`], which enqueues it on a
//! bounded channel without awaiting. A single background worker drains the
//! channel into the configured [`AuditSink`]. Nothing the sink does can reach
//! the aggregation path: a full queue drops the record, and sink errors are
//! logged and ignored.

use std::sync::Arc;

use events::{AuditRecord, AuditSink, ChangeEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of records that may wait for the sink.
pub const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;

/// Cloneable sending side of the audit queue.
#[derive(Debug, Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditHandle {
    /// Enqueues `event` for auditing. Returns `false` if the record was dropped
    /// because the queue is full or the worker has stopped.
    pub fn record(&self, event: ChangeEvent) -> bool {
        let record = AuditRecord::new(event);
        let id = record.id;
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(record_id = %id, "audit queue full; record dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(record_id = %id, "audit worker stopped; record dropped");
                false
            }
        }
    }
}

/// Owns the background audit worker.
pub struct AuditDispatcher;

impl AuditDispatcher {
    /// Starts the worker and returns the handle used to feed it.
    ///
    /// The worker exits once every [`AuditHandle`] clone has been dropped and
    /// the queue is empty; await the returned [`JoinHandle`] to let pending
    /// records reach the sink during shutdown.
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (AuditHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(sink, rx));
        (AuditHandle { tx }, worker)
    }
}

async fn run_worker(sink: Arc<dyn AuditSink>, mut rx: mpsc::Receiver<AuditRecord>) {
    while let Some(record) = rx.recv().await {
        match sink.record(&record).await {
            Ok(()) => debug!(record_id = %record.id, "audit record written"),
            Err(error) => warn!(record_id = %record.id, %error, "audit write failed"),
        }
    }
    debug!("audit queue closed");
}
