//! Batch Rotation Module
//!
//! This module implements the rotation transaction: normalize legacy records,
//! activate the target batch, deactivate every other batch, and report who is
//! active, all committed as one unit.

mod engine;


pub use engine::RotationEngine;
