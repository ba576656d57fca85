//! In-memory token store for development and testing
//!
//! Writers are serialized by an owned async mutex held for the whole life of
//! a transaction scope. Writes go to a staged copy of the records, which
//! replaces the committed set only on `commit`.

use super::traits::{RotationTransaction, TokenStore};
use crate::error::{RotationStep, StoreError, StoreResult};
use crate::types::{TokenRecord, UNASSIGNED_BATCH};
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Where an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// `find_active_batch`
    Lookup,
    /// A step of the rotation transaction
    Step(RotationStep),
}

/// Failure injected into the next `times` operations reaching `point`
#[derive(Debug, Clone)]
pub struct Fault {
    pub point: FaultPoint,
    pub transient: bool,
    pub times: u32,
}

impl Fault {
    /// Permanent failure at one rotation step, once
    pub fn at(step: RotationStep) -> Self {
        Self {
            point: FaultPoint::Step(step),
            transient: false,
            times: 1,
        }
    }

    /// Connectivity failure at one rotation step, `times` times in a row
    pub fn unavailable(step: RotationStep, times: u32) -> Self {
        Self {
            point: FaultPoint::Step(step),
            transient: true,
            times,
        }
    }
}

#[derive(Debug, Default)]
struct FaultPlan {
    faults: Vec<Fault>,
}

impl FaultPlan {
    fn trip(&mut self, point: FaultPoint) -> StoreResult<()> {
        let Some(index) = self.faults.iter().position(|f| f.point == point) else {
            return Ok(());
        };

        let fault = &mut self.faults[index];
        fault.times = fault.times.saturating_sub(1);
        let transient = fault.transient;
        if fault.times == 0 {
            self.faults.remove(index);
        }

        let message = format!("injected fault at {:?}", point);
        if transient {
            Err(StoreError::Unavailable(message))
        } else {
            Err(StoreError::Rejected(message))
        }
    }
}

/// In-memory token store
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    records: Arc<Mutex<Vec<TokenRecord>>>,
    faults: Arc<StdMutex<FaultPlan>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TokenRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            ..Default::default()
        }
    }

    /// Committed records
    pub async fn snapshot(&self) -> Vec<TokenRecord> {
        self.records.lock().await.clone()
    }

    /// Replace the committed records, as an out-of-band writer would
    pub async fn replace(&self, records: Vec<TokenRecord>) {
        *self.records.lock().await = records;
    }

    pub fn inject(&self, fault: Fault) {
        if let Ok(mut plan) = self.faults.lock() {
            plan.faults.push(fault);
        }
    }

    fn trip(&self, point: FaultPoint) -> StoreResult<()> {
        trip(&self.faults, point)
    }
}

fn trip(faults: &StdMutex<FaultPlan>, point: FaultPoint) -> StoreResult<()> {
    match faults.lock() {
        Ok(mut plan) => plan.trip(point),
        Err(_) => Err(StoreError::Rejected("fault plan poisoned".to_string())),
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn begin(&self) -> StoreResult<Box<dyn RotationTransaction>> {
        self.trip(FaultPoint::Step(RotationStep::Begin))?;

        let guard = self.records.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }

    async fn find_active_batch(&self) -> StoreResult<Option<i64>> {
        self.trip(FaultPoint::Lookup)?;

        let records = self.records.lock().await;
        Ok(records
            .iter()
            .find(|r| r.is_active())
            .map(|r| r.batch.unwrap_or(UNASSIGNED_BATCH)))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Vec<TokenRecord>>,
    staged: Vec<TokenRecord>,
    faults: Arc<StdMutex<FaultPlan>>,
}

impl MemoryTransaction {
    fn trip(&self, step: RotationStep) -> StoreResult<()> {
        trip(&self.faults, FaultPoint::Step(step))
    }

    fn set_active<F>(&mut self, active: bool, filter: F) -> u64
    where
        F: Fn(&TokenRecord) -> bool,
    {
        let mut modified = 0;
        for record in self.staged.iter_mut().filter(|r| filter(r)) {
            if record.active != Some(active) {
                record.active = Some(active);
                modified += 1;
            }
        }
        modified
    }
}

#[async_trait]
impl RotationTransaction for MemoryTransaction {
    async fn normalize_missing_batches(&mut self) -> StoreResult<u64> {
        self.trip(RotationStep::Normalize)?;

        let mut modified = 0;
        for record in self.staged.iter_mut().filter(|r| r.batch.is_none()) {
            record.batch = Some(UNASSIGNED_BATCH);
            modified += 1;
        }
        Ok(modified)
    }

    async fn activate_batch(&mut self, batch: i64) -> StoreResult<u64> {
        self.trip(RotationStep::Activate)?;
        Ok(self.set_active(true, |r| r.batch == Some(batch)))
    }

    async fn deactivate_other_batches(&mut self, batch: i64) -> StoreResult<u64> {
        self.trip(RotationStep::Deactivate)?;
        // Same as `$ne`: a record with no batch at all also matches.
        Ok(self.set_active(false, |r| r.batch != Some(batch)))
    }

    async fn active_holders(&mut self) -> StoreResult<Vec<String>> {
        self.trip(RotationStep::Observe)?;
        Ok(self
            .staged
            .iter()
            .filter(|r| r.is_active())
            .filter_map(|r| r.username.clone())
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.trip(RotationStep::Commit)?;

        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
