//! # depot-tenant: tenant lifecycle and the per-tenant mutex
//!
//! Owns the tenant registry (lifecycle, ~5 minute status cache, listing)
//! and [`TenantLocks`], the registry of per-tenant mutexes that is the
//! central ordering primitive described in the concurrency model: every
//! metadata-store mutation, quota-store mutation, and store
//! open/close/compaction for a given tenant runs under its lock.

mod error;
mod locks;
mod registry;
mod ttl_cache;

pub use error::TenantError;
pub use locks::TenantLocks;
pub use registry::TenantRegistry;
