//! Timing configuration consumed by the engine.

use std::time::Duration;

use crate::ConfigError;

/// Debounce delay and staging TTL for the aggregation engine.
///
/// Construct through [`AggregatorConfig::new`], which guarantees the TTL is
/// strictly longer than the delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    debounce_delay: Duration,
    staging_ttl: Duration,
}

impl AggregatorConfig {
    /// Quiet period after the last event before a key is flushed.
    pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(120);

    /// Lifetime of staged data, a safety net for flushes that never run.
    pub const DEFAULT_STAGING_TTL: Duration = Duration::from_secs(180);

    /// Validates and creates a configuration.
    pub fn new(debounce_delay: Duration, staging_ttl: Duration) -> Result<Self, ConfigError> {
        if debounce_delay.is_zero() {
            return Err(ConfigError::ZeroDebounceDelay);
        }
        if staging_ttl <= debounce_delay {
            return Err(ConfigError::TtlNotLongerThanDelay {
                ttl: staging_ttl,
                delay: debounce_delay,
            });
        }
        Ok(Self {
            debounce_delay,
            staging_ttl,
        })
    }

    pub fn debounce_delay(&self) -> Duration {
        self.debounce_delay
    }

    pub fn staging_ttl(&self) -> Duration {
        self.staging_ttl
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Self::DEFAULT_DEBOUNCE_DELAY,
            staging_ttl: Self::DEFAULT_STAGING_TTL,
        }
    }
}
