use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use depot_store::TenantStores;
use depot_tenant::{TenantLocks, TenantRegistry};
use depot_types::{ItemId, ItemLocation, ItemStatus, TenantId};

use crate::backoff::{backoff_for, RetryConfig};
use crate::error::SchedulerError;

/// Claim-next/claim-batch, mark-completed/failed, and timeout requeue,
/// all serialized per tenant through [`TenantLocks`]. A disabled or
/// suspended tenant rejects every claim operation, per the tenant
/// registry's "every scheduler, pool, and importer operation" contract.
pub struct Scheduler {
    stores: Arc<TenantStores>,
    tenant_registry: Arc<TenantRegistry>,
    tenant_locks: Arc<TenantLocks>,
    retry: RetryConfig,
}

impl Scheduler {
    pub fn new(
        stores: Arc<TenantStores>,
        tenant_registry: Arc<TenantRegistry>,
        tenant_locks: Arc<TenantLocks>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            stores,
            tenant_registry,
            tenant_locks,
            retry,
        }
    }

    fn require_enabled(&self, tenant_id: &TenantId) -> Result<(), SchedulerError> {
        if !self.tenant_registry.is_enabled(tenant_id)? {
            return Err(SchedulerError::TenantDisabled);
        }
        Ok(())
    }

    /// Claims the oldest eligible pending item. Self-heals against records
    /// whose byte file has vanished by removing them and retrying the next
    /// candidate, rather than returning a dangling location to the caller.
    pub fn claim_next(&self, tenant_id: &TenantId) -> Result<Option<ItemLocation>, SchedulerError> {
        self.require_enabled(tenant_id)?;
        self.tenant_locks.with_tenant_lock(tenant_id, || {
            let metadata = self.stores.metadata_store(tenant_id)?;
            loop {
                let Some(record) = metadata.claim_next(Utc::now())? else {
                    return Ok(None);
                };
                if Path::new(&record.physical_path).exists() {
                    return Ok(Some(ItemLocation::from(&record)));
                }
                tracing::warn!(
                    item_id = %record.item_id,
                    physical_path = %record.physical_path,
                    "claimed record has no byte file on disk; removing and retrying"
                );
                metadata.remove(&record.item_id)?;
            }
        })
    }

    /// Claims up to `n` items, silently skipping self-healed records. An
    /// empty result is surfaced as [`SchedulerError::NoItemsAvailable`]
    /// rather than an empty vec, so callers can distinguish "nothing to
    /// do" from "got fewer than asked."
    pub fn claim_batch(
        &self,
        tenant_id: &TenantId,
        n: usize,
    ) -> Result<Vec<ItemLocation>, SchedulerError> {
        self.require_enabled(tenant_id)?;
        self.tenant_locks.with_tenant_lock(tenant_id, || {
            let metadata = self.stores.metadata_store(tenant_id)?;
            let mut claimed = Vec::with_capacity(n);
            while claimed.len() < n {
                let Some(record) = metadata.claim_next(Utc::now())? else {
                    break;
                };
                if Path::new(&record.physical_path).exists() {
                    claimed.push(ItemLocation::from(&record));
                } else {
                    tracing::warn!(
                        item_id = %record.item_id,
                        physical_path = %record.physical_path,
                        "claimed record has no byte file on disk; removing and retrying"
                    );
                    metadata.remove(&record.item_id)?;
                }
            }
            if claimed.is_empty() {
                Err(SchedulerError::NoItemsAvailable)
            } else {
                Ok(claimed)
            }
        })
    }

    /// Deletes the byte file (best-effort), removes the record, and
    /// decrements the directory quota. Idempotent: a missing record is a
    /// no-op, not an error.
    pub fn mark_completed(&self, tenant_id: &TenantId, item_id: &ItemId) -> Result<(), SchedulerError> {
        self.tenant_locks.with_tenant_lock(tenant_id, || {
            let metadata = self.stores.metadata_store(tenant_id)?;
            let Some(record) = metadata.get(item_id)? else {
                return Ok(());
            };
            if let Err(err) = std::fs::remove_file(&record.physical_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!(
                        item_id = %item_id,
                        physical_path = %record.physical_path,
                        error = %err,
                        "best-effort byte delete failed on completion; orphan sweep will reclaim it"
                    );
                }
            }
            metadata.remove(item_id)?;
            let quota = self.stores.quota_store(tenant_id)?;
            quota.decrement(&record.directory_path)?;
            Ok(())
        })
    }

    /// Bumps `retry_count`; transitions to `permanently-failed` at
    /// `max_retries`, otherwise re-pends with a backoff-gated
    /// `available_at`.
    pub fn mark_failed(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
        error: impl Into<String>,
    ) -> Result<(), SchedulerError> {
        self.tenant_locks.with_tenant_lock(tenant_id, || {
            let metadata = self.stores.metadata_store(tenant_id)?;
            let mut record = metadata.get(item_id)?.ok_or(SchedulerError::NotFound)?;

            let now = Utc::now();
            record.retry_count += 1;
            record.last_failed_at = Some(now);
            record.last_error = Some(error.into());
            record.processing_started_at = None;

            if record.retry_count >= self.retry.max_retries {
                record.status = ItemStatus::PermanentlyFailed;
                record.available_at = None;
                tracing::warn!(item_id = %item_id, retries = record.retry_count, "item permanently failed");
            } else {
                record.status = ItemStatus::Pending;
                record.available_at = Some(now + backoff_for(record.retry_count, &self.retry));
            }
            metadata.upsert(record)?;
            Ok(())
        })
    }

    /// Delegates to the metadata store's timeout reset; called by the
    /// reconciler's timeout-requeue step.
    pub fn reset_timed_out(
        &self,
        tenant_id: &TenantId,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<usize, SchedulerError> {
        self.tenant_locks.with_tenant_lock(tenant_id, || {
            let metadata = self.stores.metadata_store(tenant_id)?;
            Ok(metadata.reset_timed_out(cutoff)?)
        })
    }

    pub fn status(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
    ) -> Result<depot_types::ItemStatus, SchedulerError> {
        let metadata = self.stores.metadata_store(tenant_id)?;
        let record = metadata.get(item_id)?.ok_or(SchedulerError::NotFound)?;
        Ok(record.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_types::{ItemRecord, VolumeId};

    fn harness() -> (tempfile::TempDir, Scheduler) {
        let dir = tempfile::tempdir().unwrap();
        let stores = Arc::new(TenantStores::new(
            dir.path().join("meta"),
            dir.path().join("quota"),
        ));
        let registry = Arc::new(TenantRegistry::open(dir.path().join("registry"), true).unwrap());
        let locks = Arc::new(TenantLocks::new());
        let retry = RetryConfig {
            max_retries: 3,
            initial_delay: std::time::Duration::from_millis(1),
            exponential: true,
            max_delay: std::time::Duration::from_secs(1),
        };
        (dir, Scheduler::new(stores, registry, locks, retry))
    }

    fn write_record(dir: &std::path::Path, scheduler: &Scheduler, tenant: &TenantId) -> ItemId {
        let metadata = scheduler.stores.metadata_store(tenant).unwrap();
        let item_id = ItemId::generate();
        let physical_path = dir.join(format!("{item_id}.bin"));
        std::fs::write(&physical_path, b"hello").unwrap();
        metadata
            .upsert(ItemRecord {
                item_id: item_id.clone(),
                tenant_id: tenant.clone(),
                volume_id: VolumeId::new("v1"),
                physical_path: physical_path.to_string_lossy().into_owned(),
                directory_path: format!("{tenant}/root"),
                size_bytes: 5,
                created_at: Utc::now(),
                status: ItemStatus::Pending,
                retry_count: 0,
                last_failed_at: None,
                last_error: None,
                processing_started_at: None,
                available_at: None,
                original_name: None,
            })
            .unwrap();
        item_id
    }

    #[test]
    fn claim_then_complete_removes_record() {
        let (dir, scheduler) = harness();
        let tenant = TenantId::new("t1");
        let item_id = write_record(dir.path(), &scheduler, &tenant);

        let location = scheduler.claim_next(&tenant).unwrap().unwrap();
        assert_eq!(location.item_id, item_id);

        scheduler.mark_completed(&tenant, &item_id).unwrap();
        assert!(matches!(
            scheduler.status(&tenant, &item_id),
            Err(SchedulerError::NotFound)
        ));
    }

    #[test]
    fn claim_self_heals_missing_bytes() {
        let (dir, scheduler) = harness();
        let tenant = TenantId::new("t1");
        let item_id = write_record(dir.path(), &scheduler, &tenant);
        let metadata = scheduler.stores.metadata_store(&tenant).unwrap();
        let record = metadata.get(&item_id).unwrap().unwrap();
        std::fs::remove_file(&record.physical_path).unwrap();

        assert_eq!(scheduler.claim_next(&tenant).unwrap(), None);
        assert!(metadata.get(&item_id).unwrap().is_none());
    }

    #[test]
    fn mark_failed_reaches_permanently_failed_at_max_retries() {
        let (dir, scheduler) = harness();
        let tenant = TenantId::new("t1");
        let item_id = write_record(dir.path(), &scheduler, &tenant);

        for _ in 0..3 {
            scheduler.claim_next(&tenant).unwrap();
            scheduler.mark_failed(&tenant, &item_id, "boom").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let status = scheduler.status(&tenant, &item_id).unwrap();
        assert_eq!(status, ItemStatus::PermanentlyFailed);
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let (dir, scheduler) = harness();
        let tenant = TenantId::new("t1");
        let item_id = write_record(dir.path(), &scheduler, &tenant);
        scheduler.mark_completed(&tenant, &item_id).unwrap();
        scheduler.mark_completed(&tenant, &item_id).unwrap();
    }
}
