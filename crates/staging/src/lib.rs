//! Staging store adapters.
//!
//! Implements the [`events::StagingStore`] trait. The aggregation engine sees
//! only the trait; how records are kept, keyed, and expired lives here.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//!
//! ## Backends
//!
//! | Backend | Notes |
//! |---------|-------|
//! | [`InMemoryStagingStore`] | Single-process; per-key TTL on `tokio::time::Instant`, atomic drain |

pub mod memory;

pub use memory::InMemoryStagingStore;
