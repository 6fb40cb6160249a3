use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Enabled,
    Disabled,
    Suspended,
}

impl TenantStatus {
    /// Disabled and suspended tenants both reject every operation; they are
    /// distinguished only for operator reporting.
    pub fn rejects_operations(self) -> bool {
        !matches!(self, TenantStatus::Enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant_id: TenantId,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub storage_path: String,
}

impl TenantRecord {
    pub fn new(tenant_id: TenantId, storage_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            status: TenantStatus::Enabled,
            created_at: now,
            updated_at: now,
            storage_path: storage_path.into(),
        }
    }
}
