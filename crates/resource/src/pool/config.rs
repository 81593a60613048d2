//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for resource pooling
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of handles created eagerly by `init`
    pub min_size: usize,
    /// Maximum number of handles the pool may hold (idle + leased)
    pub max_size: usize,
    /// Default bound for `acquire`; `None` waits until a handle is released
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub acquire_timeout: Option<Duration>,
    /// Per-handle bound on waiting for a lease to come back during quiesce
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub drain_timeout: Duration,
    /// Delay between reconnect attempts for backends that retry
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub retry_interval: Duration,
    /// Start priority reported to the lifecycle coordinator
    pub priority: i32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            acquire_timeout: None,
            drain_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_millis(900),
            priority: 1,
        }
    }
}

impl PoolConfig {
    /// Config with the given bounds and defaults for everything else.
    #[must_use]
    pub fn sized(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            ..Self::default()
        }
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration(
                "max_size is expected to be greater than zero",
            ));
        }
        if self.min_size == 0 {
            return Err(Error::configuration(
                "min_size is expected to be greater than zero",
            ));
        }
        if self.min_size > self.max_size {
            return Err(Error::configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::configuration(
                "acquire_timeout must be greater than zero when set",
            ));
        }
        if self.retry_interval.is_zero() {
            return Err(Error::configuration(
                "retry_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}
