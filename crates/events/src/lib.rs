//! Core domain for the change-digest service.
//!
//! This crate contains every domain concept, newtype identifier, event type,
//! and port error used throughout the workspace. Infrastructure crates
//! implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`Actor`, `SubjectId`, `Recipient`, `AuditRecordId`) |
//! | [`types`] | Event kinds, transitions, staged records, aggregation keys |
//! | [`errors`] | Per-port error types |
//! | [`ports`] | Traits implemented by the infrastructure crates |
//! | [`render`] | The default markdown [`DigestRenderer`] |

pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod render;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{AuditError, DeliveryError, EventSourceError, StagingError};
pub use identifiers::{Actor, AuditRecordId, Recipient, SubjectId};
pub use ports::{AuditSink, DigestRenderer, EventSource, NotificationSender, StagingStore};
pub use render::{digest_title, MarkdownDigestRenderer};
pub use types::{
    AggregationKey, AuditRecord, ChangeEvent, EventKind, StagedBatch, StagedEvent, Timestamp,
    Transition,
};
