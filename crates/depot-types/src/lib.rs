//! Core type definitions shared across the depot workspace: tenant, volume,
//! and item identifiers, the durable record shapes, and the state-machine
//! enums that the scheduler, storage pool, and recovery service all mutate
//! under their respective per-tenant mutex.

mod cancel;
mod ids;
mod item;
mod quota;
mod tenant;
mod volume;

pub use cancel::CancellationToken;
pub use ids::{ItemId, TenantId, VolumeId};
pub use item::{ItemLocation, ItemRecord, ItemStatus};
pub use quota::{QuotaRecord, TENANT_WIDE_KEY};
pub use tenant::{TenantRecord, TenantStatus};
pub use volume::{VolumeConfig, VolumeInfo};
