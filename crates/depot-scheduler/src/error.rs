use depot_store::StoreError;
use depot_tenant::TenantError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("tenant is disabled")]
    TenantDisabled,

    #[error("item not found")]
    NotFound,

    #[error("item {0} is already processing")]
    AlreadyProcessing(String),

    #[error("no items available")]
    NoItemsAvailable,

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
