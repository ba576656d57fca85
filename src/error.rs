//! Error Types Module
//!
//! Errors raised by the document store and by the rotation transaction.
//! Store errors are always wrapped with the rotation step that produced them
//! before they reach a caller or a log line.

use std::fmt;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a `TokenStore` backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error returned by the MongoDB driver
    #[error("mongodb: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// Store could not be reached (worth retrying)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store refused the operation (not worth retrying)
    #[error("store rejected operation: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether retrying the same operation later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Mongo(e) => {
                use mongodb::error::{ErrorKind, TRANSIENT_TRANSACTION_ERROR};

                e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                    || matches!(
                        *e.kind,
                        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. }
                    )
            }
            StoreError::Unavailable(_) => true,
            StoreError::Rejected(_) => false,
        }
    }
}

/// One step of the rotation transaction, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStep {
    Begin,
    Normalize,
    Activate,
    Deactivate,
    Observe,
    Commit,
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            RotationStep::Begin => "starting transaction",
            RotationStep::Normalize => "setting batch=0 for records missing a batch",
            RotationStep::Activate => "setting active=true for the target batch",
            RotationStep::Deactivate => "setting active=false outside the target batch",
            RotationStep::Observe => "reading active token holders",
            RotationStep::Commit => "committing transaction",
        };
        f.write_str(step)
    }
}

/// Failure of a single rotation attempt
#[derive(Debug, Error)]
pub enum RotationError {
    /// Batch numbers start at 1; rejected before touching the store
    #[error("invalid batch number: {0}")]
    InvalidBatch(i64),

    /// A store operation failed and the whole transaction was aborted
    #[error("rotation to batch {batch} failed while {step}: {source}")]
    Step {
        batch: i64,
        step: RotationStep,
        #[source]
        source: StoreError,
    },
}

impl RotationError {
    /// Step that failed, if the store was reached at all
    pub fn step(&self) -> Option<RotationStep> {
        match self {
            RotationError::InvalidBatch(_) => None,
            RotationError::Step { step, .. } => Some(*step),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            RotationError::InvalidBatch(_) => false,
            RotationError::Step { source, .. } => source.is_transient(),
        }
    }
}
