use depot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("tenant not found")]
    NotFound,

    #[error("tenant already exists")]
    AlreadyExists,

    #[error(transparent)]
    Store(#[from] StoreError),
}
