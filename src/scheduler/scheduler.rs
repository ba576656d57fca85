//! Rotation Scheduler Module
//!
//! Runs the fixed-cadence autoincrement trigger. Each tick re-reads the
//! active batch from storage, so an out-of-band change is picked up on the
//! next tick instead of drifting from an in-memory counter.
//!
//! # Tick Flow
//! 1. Read the batch of the currently active records
//! 2. Advance it around the cycle (or fall back / skip when nothing is active)
//! 3. Rotate; both the lookup and the rotation retry transient store
//!    failures with backoff
//! 4. Log the outcome and wait for the next tick

use super::retry::RetryPolicy;
use super::trigger::{SkipReason, resolve_target};
use crate::{
    RotationReport,
    config::RotationConfig,
    error::RotationError,
    rotation::RotationEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a single tick did
#[derive(Debug)]
pub enum TickOutcome {
    Rotated(RotationReport),
    Skipped(SkipReason),
    Failed(RotationError),
}

/// Fixed-cadence rotation scheduler
pub struct RotationScheduler {
    engine: Arc<RotationEngine>,
    period: Duration,
    fallback_batch: Option<i64>,
    retry: RetryPolicy,
}

impl RotationScheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    /// * `engine` - Shared rotation engine (also used by one-shot triggers)
    /// * `config` - Tick interval and fallback batch
    /// * `retry` - Backoff applied to transient failures within a tick
    pub fn new(engine: Arc<RotationEngine>, config: &RotationConfig, retry: RetryPolicy) -> Self {
        Self {
            engine,
            period: config.interval(),
            fallback_batch: config.fallback_batch,
            retry,
        }
    }

    /// Run ticks until `shutdown` is cancelled
    ///
    /// The first rotation happens one full period after start. Cancellation
    /// while waiting returns immediately; a tick already in progress finishes
    /// (or aborts its transaction) before the loop observes it.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Rotation scheduler starting: interval={:?}, fallback_batch={:?}",
            self.period, self.fallback_batch
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // `interval` fires immediately; consume that so ticks start one period out.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(&shutdown).await {
                TickOutcome::Rotated(report) => {
                    debug!("Tick rotated to batch {}", report.batch);
                }
                TickOutcome::Skipped(reason) => {
                    warn!("Skipping rotation: {}", reason);
                }
                TickOutcome::Failed(e) => {
                    error!(error = %e, "Rotation failed, will retry on next tick");
                }
            }
        }

        info!("Rotation scheduler stopped");
    }

    /// Perform one tick: pick the next batch and rotate to it
    pub async fn tick(&self, shutdown: &CancellationToken) -> TickOutcome {
        let engine = &self.engine;
        let current = match self.retry.run(shutdown, move || engine.current_batch()).await {
            Ok(current) => current,
            Err(e) => return TickOutcome::Skipped(SkipReason::LookupFailed(e.to_string())),
        };

        match current {
            Some(batch) => info!("Current batch number: {}", batch),
            None => info!("No active tokens found"),
        }

        let target = match resolve_target(current, self.fallback_batch) {
            Ok(target) => target,
            Err(reason) => return TickOutcome::Skipped(reason),
        };

        match self.retry.run(shutdown, move || engine.rotate(target)).await {
            Ok(report) => TickOutcome::Rotated(report),
            Err(e) => TickOutcome::Failed(e),
        }
    }
}
