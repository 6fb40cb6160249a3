//! # depot-store: durable per-tenant metadata and quota stores
//!
//! Wraps an embedded keyed engine (`sled`) with the write-through active
//! cache and claim/reset operations the scheduler needs, plus the
//! rebuild-in-place hooks the recovery service drives during corruption
//! recovery.

mod engine;
mod error;
mod metadata;
mod quota;
mod stores;

pub use engine::StoreEngine;
pub use error::{classify_sled_error, StoreError};
pub use metadata::MetadataStore;
pub use quota::QuotaStore;
pub use stores::TenantStores;
