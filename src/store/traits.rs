//! Store trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;

/// Shared document store holding the token records
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Open an all-or-nothing transaction scope
    async fn begin(&self) -> StoreResult<Box<dyn RotationTransaction>>;

    /// Batch of any record currently marked active
    ///
    /// Returns `Ok(None)` when no record is active, and `Ok(Some(0))` when
    /// the active record has no batch assigned.
    async fn find_active_batch(&self) -> StoreResult<Option<i64>>;
}

/// Transaction scope over the token collection
///
/// Writes are not visible outside the scope until `commit` succeeds.
/// Dropping a scope without committing discards every write made through it.
#[async_trait]
pub trait RotationTransaction: Send {
    /// Set `batch = 0` on every record lacking a batch; returns the count
    async fn normalize_missing_batches(&mut self) -> StoreResult<u64>;

    /// Set `active = true` where `batch == batch`; returns the modified count
    async fn activate_batch(&mut self, batch: i64) -> StoreResult<u64>;

    /// Set `active = false` where `batch != batch`; returns the modified count
    async fn deactivate_other_batches(&mut self, batch: i64) -> StoreResult<u64>;

    /// Holder identifiers of every record with `active == true`, as seen
    /// from inside the scope
    async fn active_holders(&mut self) -> StoreResult<Vec<String>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn abort(self: Box<Self>) -> StoreResult<()>;
}
