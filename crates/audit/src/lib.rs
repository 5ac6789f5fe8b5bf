//! Audit sink adapters.
//!
//! Implements the [`events::AuditSink`] trait. The engine never awaits these
//! writes directly; they run on the audit worker behind a bounded queue.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File handling and encoding live here.

use std::path::Path;

use async_trait::async_trait;
use events::{AuditError, AuditRecord, AuditSink};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Appends one JSON object per line to a local file.
///
/// The file is opened in append mode and created if missing. Writes are
/// serialised so concurrent records never interleave within a line.
#[derive(Debug)]
pub struct JsonlAuditSink {
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Opens (or creates) the audit file at `path`, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        debug!(path = %path.display(), "audit file opened");
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record).map_err(|e| AuditError::Encode {
            message: e.to_string(),
        })?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;
        Ok(())
    }
}

fn write_error(e: std::io::Error) -> AuditError {
    AuditError::Write {
        message: e.to_string(),
    }
}
