//! Errors raised by the aggregation engine itself.
//!
//! Port failures ([`StagingError`], [`DeliveryError`]) are wrapped rather than
//! flattened so callers can tell a failed read from a failed delivery.

use std::time::Duration;

use events::{DeliveryError, StagingError};
use thiserror::Error;

/// A flush did not complete.
///
/// Either way the key's timer slot is already released and no staged data is
/// restored.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlushError {
    /// Staged data could not be read. Anything still staged expires via TTL.
    #[error("could not read staged events: {0}")]
    Read(#[source] StagingError),

    /// The digest was rendered but the sender refused or failed to deliver it.
    #[error("digest delivery failed: {0}")]
    Delivery(#[source] DeliveryError),
}

/// The aggregator configuration violates an invariant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A zero debounce delay would flush on every event.
    #[error("debounce delay must be greater than zero")]
    ZeroDebounceDelay,

    /// Staged data must outlive the debounce window, or it could expire before
    /// the flush that should consume it.
    #[error("staging TTL ({ttl:?}) must exceed the debounce delay ({delay:?})")]
    TtlNotLongerThanDelay {
        /// Configured staging TTL.
        ttl: Duration,
        /// Configured debounce delay.
        delay: Duration,
    },
}
