use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, TenantId, VolumeId};

/// Where an item stands in the claim/retry state machine.
///
/// `completed` is intentionally absent: a completed item is deleted, not
/// transitioned, so it never needs a representable status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Failed,
    PermanentlyFailed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::PermanentlyFailed)
    }
}

/// One submitted file: the unit of ownership and scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: ItemId,
    pub tenant_id: TenantId,
    pub volume_id: VolumeId,
    pub physical_path: String,
    pub directory_path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub status: ItemStatus,
    pub retry_count: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub available_at: Option<DateTime<Utc>>,
    pub original_name: Option<String>,
}

impl ItemRecord {
    /// True if this record may be claimed at `now`: pending and either
    /// unscheduled or past its backoff gate.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == ItemStatus::Pending && self.available_at.is_none_or(|at| at <= now)
    }
}

/// Projection of an [`ItemRecord`] returned to callers of `claim_next`/`claim_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLocation {
    pub item_id: ItemId,
    pub volume_id: VolumeId,
    pub physical_path: String,
    pub directory_path: String,
    pub size_bytes: u64,
    pub status: ItemStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl From<&ItemRecord> for ItemLocation {
    fn from(record: &ItemRecord) -> Self {
        Self {
            item_id: record.item_id.clone(),
            volume_id: record.volume_id.clone(),
            physical_path: record.physical_path.clone(),
            directory_path: record.directory_path.clone(),
            size_bytes: record.size_bytes,
            status: record.status,
            retry_count: record.retry_count,
            last_error: record.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: ItemStatus, available_at: Option<DateTime<Utc>>) -> ItemRecord {
        ItemRecord {
            item_id: ItemId::generate(),
            tenant_id: TenantId::new("t1"),
            volume_id: VolumeId::new("v1"),
            physical_path: "/mnt/v1/t1/x".into(),
            directory_path: "t1/root".into(),
            size_bytes: 5,
            created_at: Utc::now(),
            status,
            retry_count: 0,
            last_failed_at: None,
            last_error: None,
            processing_started_at: None,
            available_at,
            original_name: None,
        }
    }

    #[test]
    fn pending_without_gate_is_claimable() {
        let record = sample(ItemStatus::Pending, None);
        assert!(record.is_claimable(Utc::now()));
    }

    #[test]
    fn pending_with_future_gate_is_not_claimable() {
        let record = sample(ItemStatus::Pending, Some(Utc::now() + chrono::Duration::hours(1)));
        assert!(!record.is_claimable(Utc::now()));
    }

    #[test]
    fn processing_is_never_claimable() {
        let record = sample(ItemStatus::Processing, None);
        assert!(!record.is_claimable(Utc::now()));
    }
}
