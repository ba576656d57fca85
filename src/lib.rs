//! This crate rotates which batch of stored credential records is active.
//! Exactly one batch is current at a time; a rotation switches it inside a
//! single store transaction, driven either by a fixed-cadence scheduler or by
//! an explicit one-shot batch number.

pub mod types; // Token records, rotation reports and batch constants.
pub mod error; // Store and rotation error types.
pub mod config; // Defines and loads service configuration.
pub mod store; // Document store interface and its MongoDB / in-memory backends.
pub mod rotation; // The all-or-nothing batch rotation transaction.
pub mod scheduler; // Fixed-cadence trigger loop and retry policy.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use error::{RotationError, RotationStep, StoreError};
pub use rotation::RotationEngine;
pub use scheduler::RotationScheduler;
