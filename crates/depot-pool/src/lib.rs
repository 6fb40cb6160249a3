//! # depot-pool: storage pool write path
//!
//! Volume selection by free space, the two-phase (physical-then-metadata)
//! write with best-effort rollback, tenant/quota gating, and the
//! stabilizing health probe a newly-added volume must pass before the pool
//! will route writes to it.

mod error;
mod pool;

pub use error::PoolError;
pub use pool::{AdmissionConfig, CapacitySnapshot, StoragePool};
