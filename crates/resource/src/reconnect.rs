//! Reconnect state machine for backends that ride out broker restarts.
//!
//! A factory owns a [`Reconnector`] and drives its `create` through
//! [`Reconnector::connect`], which retries with capped exponential backoff
//! until the connect closure succeeds, the attempt budget runs out, or
//! [`Reconnector::stop`] is called. The current [`LinkState`] is published on
//! a `watch` channel.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::pool::PoolConfig;

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Backoff schedule between connection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay after the first failed attempt.
    pub retry_interval: Duration,
    /// Upper bound on any single delay.
    pub max_interval: Duration,
    /// Growth factor per failed attempt; `1.0` retries at a fixed interval.
    pub multiplier: f64,
    /// Give up after this many attempts; `None` retries until stopped.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(900),
            max_interval: Duration::from_secs(30),
            multiplier: 1.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed-interval policy using the pool's `retry_interval`.
    #[must_use]
    pub fn from_pool_config(config: &PoolConfig) -> Self {
        Self {
            retry_interval: config.retry_interval,
            ..Self::default()
        }
    }

    /// Builder-style attempt limit.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Builder-style exponential growth.
    #[must_use]
    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.multiplier = multiplier;
        self.max_interval = max_interval;
        self
    }

    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay_secs = self.retry_interval.as_secs_f64() * factor;
        let capped = delay_secs.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

// ---------------------------------------------------------------------------
// LinkState
// ---------------------------------------------------------------------------

/// Connection state of a backend link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Attempt number `attempt` (1-based) is in progress or scheduled.
    Connecting {
        /// The current attempt.
        attempt: u32,
    },
    /// The last attempt succeeded.
    Connected,
    /// `stop` was called; no further attempts are made.
    Stopped,
}

// ---------------------------------------------------------------------------
// Reconnector
// ---------------------------------------------------------------------------

/// Drives connection attempts for one backend link.
#[derive(Debug)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    state: watch::Sender<LinkState>,
    cancel: CancellationToken,
}

impl Reconnector {
    /// Create a reconnector in the `Disconnected` state.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            policy,
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// The backoff policy.
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// The current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Watch link state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop reconnecting. Pending and future `connect` calls fail with
    /// [`Error::Cancelled`].
    pub fn stop(&self) {
        self.cancel.cancel();
        self.state.send_replace(LinkState::Stopped);
    }

    /// Report that an established link dropped.
    pub fn mark_disconnected(&self) {
        if !self.is_stopped() {
            self.state.send_replace(LinkState::Disconnected);
        }
    }

    /// Run `attempt` until it succeeds.
    ///
    /// Sleeps [`ReconnectPolicy::delay_for`] between failures. Returns
    /// [`Error::ReconnectExhausted`] carrying the last error once
    /// `max_attempts` is reached, or [`Error::Cancelled`] if stopped.
    pub async fn connect<T, Fut>(
        &self,
        resource_id: &str,
        mut attempt: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0u32;
        loop {
            if self.is_stopped() {
                return Err(Error::Cancelled {
                    resource_id: resource_id.to_string(),
                });
            }
            attempts = attempts.saturating_add(1);
            self.state
                .send_replace(LinkState::Connecting { attempt: attempts });

            let outcome = tokio::select! {
                () = self.cancel.cancelled() => None,
                outcome = attempt() => Some(outcome),
            };

            let err = match outcome {
                None => continue,
                Some(Ok(link)) => {
                    self.state.send_replace(LinkState::Connected);
                    if attempts > 1 {
                        tracing::info!(resource_id, attempts, "Reconnected");
                    }
                    return Ok(link);
                }
                Some(Err(err)) => err,
            };

            if self.policy.exhausted(attempts) {
                self.state.send_replace(LinkState::Disconnected);
                tracing::error!(
                    resource_id,
                    attempts,
                    error = %err,
                    "Giving up reconnecting"
                );
                return Err(Error::ReconnectExhausted {
                    resource_id: resource_id.to_string(),
                    attempts,
                    source: Some(Box::new(err)),
                });
            }

            let delay = self.policy.delay_for(attempts);
            tracing::warn!(
                resource_id,
                attempt = attempts,
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Connection attempt failed"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
