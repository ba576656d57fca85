//! Batch Trigger Module
//!
//! Computes the next target batch from the one currently active in storage.

use crate::types::BATCH_CYCLE;
use std::fmt;

/// Batch following `current` in the rotation cycle
///
/// Maps 1 → 2, 2 → 3, 3 → 1. Returns `None` for `current < 1`: batch 0 means
/// "never assigned" and must not be rotated through the formula as if it
/// were a real batch.
pub fn next_batch(current: i64) -> Option<i64> {
    (current >= 1).then(|| current % BATCH_CYCLE + 1)
}

/// Why a tick did not attempt a rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No record is active and no fallback batch is configured
    NoActiveBatch,
    /// The active record carries batch 0 or a negative batch
    UnassignedBatch(i64),
    /// Reading the current batch failed
    LookupFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoActiveBatch => write!(f, "no active batch found"),
            SkipReason::UnassignedBatch(batch) => {
                write!(f, "active records have no usable batch ({})", batch)
            }
            SkipReason::LookupFailed(e) => write!(f, "failed to get current batch number: {}", e),
        }
    }
}

/// Pick the target for this tick from the stored batch
///
/// Without a usable current batch the configured `fallback` is used, or the
/// tick is skipped when there is none.
pub(super) fn resolve_target(
    current: Option<i64>,
    fallback: Option<i64>,
) -> Result<i64, SkipReason> {
    let reason = match current {
        Some(batch) => match next_batch(batch) {
            Some(next) => return Ok(next),
            None => SkipReason::UnassignedBatch(batch),
        },
        None => SkipReason::NoActiveBatch,
    };

    fallback.ok_or(reason)
}
