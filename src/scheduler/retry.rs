//! Retry Policy Module
//!
//! Exponential backoff for transient store failures within a single tick.

use crate::{
    config::RetryConfig,
    error::{RotationError, StoreError},
};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Errors that say whether trying again could help
pub trait Transient: Display {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Transient for RotationError {
    fn is_transient(&self) -> bool {
        RotationError::is_transient(self)
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-indexed)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// Only transient errors are retried. A cancelled `shutdown` ends the
    /// backoff early and returns the last error.
    pub async fn run<T, E, F, Fut>(
        &self,
        shutdown: &CancellationToken,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Transient,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.max_attempts {
                return Err(err);
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                error = %err,
                "Transient store failure, retrying in {:?}",
                delay
            );

            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!("Shutdown requested, abandoning retry");
                    return Err(err);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
