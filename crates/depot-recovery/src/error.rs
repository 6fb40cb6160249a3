use depot_pool::PoolError;
use depot_store::StoreError;
use depot_tenant::TenantError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("i/o error during rebuild: {0}")]
    Io(String),

    #[error("rebuild failed for tenant {tenant_id}: {reason}")]
    RebuildFailed { tenant_id: String, reason: String },
}

impl From<std::io::Error> for RecoveryError {
    fn from(err: std::io::Error) -> Self {
        RecoveryError::Io(err.to_string())
    }
}
