//! Token Store Module
//!
//! This module provides the narrow query/update interface the rotation
//! transaction runs against:
//! - MongoTokenStore: the production MongoDB collection
//! - InMemoryTokenStore: an in-process store with fault injection for tests

mod memory;
mod mongo;
mod traits;

pub use memory::{Fault, FaultPoint, InMemoryTokenStore};
pub use mongo::MongoTokenStore;
pub use traits::{RotationTransaction, TokenStore};
