//! Rotation Scheduling Module
//!
//! This module decides which batch to rotate to and when:
//! - Trigger: advances the stored batch around the 1 → 2 → 3 → 1 cycle
//! - RetryPolicy: bounded exponential backoff around transient store failures
//! - RotationScheduler: the fixed-cadence loop, stopped by a cancellation token
//!
//! A failed tick is logged and retried on the next tick; it never ends the loop.

mod retry;
mod scheduler;
mod trigger;

#[cfg(test)]
mod tests;

pub use retry::{RetryPolicy, Transient};
pub use scheduler::{RotationScheduler, TickOutcome};
pub use trigger::{SkipReason, next_batch};
