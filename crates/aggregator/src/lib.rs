//! Debounced event-aggregation and flush engine.
//!
//! This crate turns a stream of individual change events into one digest per
//! burst. Events are staged per [`events::AggregationKey`] (event kind + actor);
//! every new event pushes that key's flush back by the debounce delay, and the
//! flush reads and clears the key's staged state and delivers it once.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The engine sequences calls between the staging
//! store, renderer, notification sender, and audit sink, all of which are
//! port traits from the [`events`] crate. It contains no I/O of its own
//! beyond spawning tokio tasks for timers and the audit worker.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`engine`] | [`AggregationEngine`]: `ingest`, `flush`, `flush_pending` |
//! | [`timers`] | [`TimerRegistry`]: at most one pending timer per key |
//! | [`audit`] | [`AuditDispatcher`]: bounded fire-and-forget audit queue |
//! | [`config`] | [`AggregatorConfig`]: debounce delay and staging TTL |
//! | [`errors`] | [`FlushError`], [`ConfigError`] |

pub mod audit;
pub mod config;
pub mod engine;
pub mod errors;
pub mod timers;

pub use audit::{AuditDispatcher, AuditHandle, DEFAULT_AUDIT_QUEUE_CAPACITY};
pub use config::AggregatorConfig;
pub use engine::{AggregationEngine, Collaborators, FlushOutcome, IngestOutcome};
pub use errors::{ConfigError, FlushError};
pub use timers::TimerRegistry;
