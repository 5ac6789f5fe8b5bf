//! Error types for the ports defined in [`crate::ports`].
//!
//! Each port has its own error type so adapters cannot report, say, a
//! delivery failure from the staging store. None of these errors is fatal to
//! the process: the aggregation engine logs them and isolates them per key.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// A staging-store primitive failed.
///
/// Always recoverable. During ingest the event is dropped from aggregation;
/// during flush the flush aborts and the key is left to its TTL.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum StagingError {
    /// The store could not be reached or timed out.
    #[error("staging store unavailable during {operation}: {message}")]
    Unavailable {
        /// Name of the primitive that failed (e.g. `"append_to_sequence"`).
        operation: String,
        /// Underlying failure description.
        message: String,
    },
}

impl StagingError {
    /// Shorthand for [`StagingError::Unavailable`].
    pub fn unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// The notification sender could not deliver a digest.
///
/// Never retried by the engine; staged data is not replayed.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum DeliveryError {
    /// The request never produced a response (connection, TLS, timeout).
    #[error("notification transport failed: {message}")]
    Transport {
        /// Underlying failure description.
        message: String,
    },

    /// The receiving service answered but refused the message.
    #[error("notification rejected (code {code}): {message}")]
    Rejected {
        /// HTTP status or service-specific error code.
        code: i64,
        /// Message returned by the service.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// The audit sink could not persist a record. Logged and otherwise ignored.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum AuditError {
    /// Writing to the underlying medium failed.
    #[error("audit write failed: {message}")]
    Write {
        /// Underlying failure description.
        message: String,
    },

    /// The record could not be serialised.
    #[error("audit record could not be encoded: {message}")]
    Encode {
        /// Serialiser failure description.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Event sources
// ---------------------------------------------------------------------------

/// An inbound event source failed to produce the next event.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum EventSourceError {
    /// The underlying stream could not be read. The source is unusable.
    #[error("event source read failed: {message}")]
    Read {
        /// Underlying failure description.
        message: String,
    },

    /// One input could not be decoded; the source may continue.
    #[error("malformed event on line {line}: {message}")]
    Malformed {
        /// 1-based line number of the offending input.
        line: u64,
        /// Decoder failure description.
        message: String,
    },
}

impl EventSourceError {
    /// Returns `true` if the source can keep producing events after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EventSourceError::Malformed { .. })
    }
}
