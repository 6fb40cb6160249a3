use depot_io::VolumeError;
use depot_store::StoreError;
use depot_tenant::TenantError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("tenant is disabled")]
    TenantDisabled,

    #[error("tenant not found")]
    TenantNotFound,

    #[error("tenant quota exceeded (current={current}, max={max})")]
    TenantQuotaExceeded { current: u64, max: u64 },

    #[error("directory quota exceeded (current={current}, max={max})")]
    DirectoryQuotaExceeded { current: u64, max: u64 },

    #[error("no healthy storage volume available")]
    StorageVolumeUnavailable,

    #[error("all healthy volumes are full")]
    InsufficientStorage,

    #[error("item not found")]
    NotFound,

    #[error("item belongs to another tenant")]
    Unauthorized,

    #[error("volume {0} is already registered")]
    VolumeAlreadyRegistered(String),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tenant(#[from] TenantError),
}
