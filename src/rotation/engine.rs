//! Rotation Engine Module
//!
//! Runs the four-step rotation against a `TokenStore` inside one transaction
//! scope. Only one rotation per engine is in flight at a time; the scheduler
//! and any one-shot trigger share the same engine.

use crate::{
    RotationReport,
    error::{RotationError, RotationStep, StoreError, StoreResult},
    store::{RotationTransaction, TokenStore},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Rotation engine
///
/// Owns the store handle and the in-flight guard.
pub struct RotationEngine {
    store: Arc<dyn TokenStore>,
    /// Held for the whole duration of a rotation
    in_flight: Mutex<()>,
}

/// Write counts gathered while the scope is open
struct Applied {
    normalized: u64,
    activated: u64,
    deactivated: u64,
    active_holders: Vec<String>,
}

impl RotationEngine {
    /// Creates a new rotation engine
    ///
    /// # Arguments
    /// * `store` - Shared document store holding the token records
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(()),
        }
    }

    /// Batch of the currently active records, re-read from the store
    pub async fn current_batch(&self) -> StoreResult<Option<i64>> {
        self.store.find_active_batch().await
    }

    /// Make `batch` the only active batch
    ///
    /// # Transaction Steps
    /// 1. Set `batch = 0` on records missing a batch
    /// 2. Set `active = true` where `batch == target`
    /// 3. Set `active = false` where `batch != target`
    /// 4. Read back the holders of every active record
    ///
    /// Any failure aborts the scope, so either all writes commit or none do.
    ///
    /// # Returns
    /// * `Ok(RotationReport)` once the transaction committed (the holder list may be empty)
    /// * `Err(RotationError::InvalidBatch)` for `batch < 1`, without touching the store
    /// * `Err(RotationError::Step)` naming the step that failed
    pub async fn rotate(&self, batch: i64) -> Result<RotationReport, RotationError> {
        if batch < 1 {
            warn!("Invalid batch number: {}", batch);
            return Err(RotationError::InvalidBatch(batch));
        }

        let _in_flight = self.in_flight.lock().await;
        info!(batch, "Setting active tokens for batch number {}", batch);

        let result = self.run_transaction(batch).await;
        match &result {
            Ok(report) => {
                if report.active_holders.is_empty() {
                    info!(batch, "No active tokens found after rotation");
                } else {
                    info!(batch, holders = ?report.active_holders, "Active token holders");
                }
                info!(
                    batch,
                    normalized = report.normalized,
                    activated = report.activated,
                    deactivated = report.deactivated,
                    "Rotation transaction committed"
                );
            }
            Err(e) => error!(batch, error = %e, "Rotation transaction failed"),
        }
        result
    }

    async fn run_transaction(&self, batch: i64) -> Result<RotationReport, RotationError> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(failed(batch, RotationStep::Begin))?;

        let applied = match Self::apply(tx.as_mut(), batch).await {
            Ok(applied) => applied,
            Err(e) => {
                if let Err(abort_err) = tx.abort().await {
                    warn!(batch, error = %abort_err, "Failed to abort rotation transaction");
                }
                return Err(e);
            }
        };

        tx.commit().await.map_err(failed(batch, RotationStep::Commit))?;

        Ok(RotationReport {
            batch,
            active_holders: applied.active_holders,
            normalized: applied.normalized,
            activated: applied.activated,
            deactivated: applied.deactivated,
            rotated_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Ordered writes plus the read-back, all inside `tx`
    async fn apply(
        tx: &mut dyn RotationTransaction,
        batch: i64,
    ) -> Result<Applied, RotationError> {
        // Normalize first so legacy records land outside the target batch.
        let normalized = tx
            .normalize_missing_batches()
            .await
            .map_err(failed(batch, RotationStep::Normalize))?;
        if normalized > 0 {
            debug!(normalized, "Assigned batch 0 to records missing a batch");
        }

        let activated = tx
            .activate_batch(batch)
            .await
            .map_err(failed(batch, RotationStep::Activate))?;

        let deactivated = tx
            .deactivate_other_batches(batch)
            .await
            .map_err(failed(batch, RotationStep::Deactivate))?;

        let active_holders = tx
            .active_holders()
            .await
            .map_err(failed(batch, RotationStep::Observe))?;

        Ok(Applied {
            normalized,
            activated,
            deactivated,
            active_holders,
        })
    }
}

/// Wrap a store error with the rotation step it came from
fn failed(batch: i64, step: RotationStep) -> impl FnOnce(StoreError) -> RotationError {
    move |source| RotationError::Step {
        batch,
        step,
        source,
    }
}
