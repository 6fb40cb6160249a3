use thiserror::Error;

use depot_io::VolumeError;
use depot_pool::PoolError;
use depot_recovery::RecoveryError;
use depot_reconciler::ReconcilerError;
use depot_scheduler::SchedulerError;
use depot_store::StoreError;
use depot_tenant::TenantError;

/// The error taxonomy callers of the public API surface see. Every
/// subsystem-local error type collapses into one of these kinds; only
/// genuinely exceptional I/O failures retain their underlying message.
#[derive(Debug, Error)]
pub enum DepotError {
    #[error("tenant is disabled")]
    TenantDisabled,

    #[error("tenant not found")]
    TenantNotFound,

    #[error("tenant already exists")]
    TenantAlreadyExists,

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

    #[error("item {0} is already processing")]
    AlreadyProcessing(String),

    #[error("no items available")]
    NoItemsAvailable,

    #[error("volume {0} is already registered")]
    VolumeAlreadyRegistered(String),

    #[error("i/o failure: {0}")]
    Io(String),
}

impl From<PoolError> for DepotError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::TenantDisabled => DepotError::TenantDisabled,
            PoolError::TenantNotFound => DepotError::TenantNotFound,
            PoolError::TenantQuotaExceeded { current, max } => {
                DepotError::TenantQuotaExceeded { current, max }
            }
            PoolError::DirectoryQuotaExceeded { current, max } => {
                DepotError::DirectoryQuotaExceeded { current, max }
            }
            PoolError::StorageVolumeUnavailable => DepotError::StorageVolumeUnavailable,
            PoolError::InsufficientStorage => DepotError::InsufficientStorage,
            PoolError::NotFound => DepotError::NotFound,
            PoolError::Unauthorized => DepotError::Unauthorized,
            PoolError::VolumeAlreadyRegistered(id) => DepotError::VolumeAlreadyRegistered(id),
            other => DepotError::Io(other.to_string()),
        }
    }
}

impl From<SchedulerError> for DepotError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::TenantDisabled => DepotError::TenantDisabled,
            SchedulerError::NotFound => DepotError::NotFound,
            SchedulerError::AlreadyProcessing(id) => DepotError::AlreadyProcessing(id),
            SchedulerError::NoItemsAvailable => DepotError::NoItemsAvailable,
            other => DepotError::Io(other.to_string()),
        }
    }
}

impl From<TenantError> for DepotError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFound => DepotError::TenantNotFound,
            TenantError::AlreadyExists => DepotError::TenantAlreadyExists,
            other => DepotError::Io(other.to_string()),
        }
    }
}

impl From<RecoveryError> for DepotError {
    fn from(err: RecoveryError) -> Self {
        DepotError::Io(err.to_string())
    }
}

impl From<ReconcilerError> for DepotError {
    fn from(err: ReconcilerError) -> Self {
        DepotError::Io(err.to_string())
    }
}

impl From<StoreError> for DepotError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => DepotError::NotFound,
            other => DepotError::Io(other.to_string()),
        }
    }
}

impl From<VolumeError> for DepotError {
    fn from(err: VolumeError) -> Self {
        match err {
            VolumeError::Unhealthy => DepotError::StorageVolumeUnavailable,
            VolumeError::InsufficientStorage => DepotError::InsufficientStorage,
            other => DepotError::Io(other.to_string()),
        }
    }
}
