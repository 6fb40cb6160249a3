use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use depot_io::Volume;
use depot_store::TenantStores;
use depot_tenant::{TenantLocks, TenantRegistry};
use depot_types::{
    ItemId, ItemLocation, ItemRecord, ItemStatus, TenantId, VolumeConfig, VolumeId, VolumeInfo,
    TENANT_WIDE_KEY,
};

use crate::error::PoolError;

/// Stabilizing health-probe window applied when a volume is admitted to the
/// pool: absorbs the mount-settling window on networked storage by
/// requiring at least two consecutive healthy observations among `probes`
/// attempts, `delay` apart.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionConfig {
    pub probes: usize,
    pub delay: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            probes: 5,
            delay: Duration::from_millis(50),
        }
    }
}

/// Summed capacity across every currently-healthy volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub total_capacity: u64,
    pub available_space: u64,
}

/// Volume selection, two-phase write, and read-by-id over a fixed set of
/// mounted volumes. Volumes are added once at startup; removal is
/// unsupported: volumes are fixed at startup, and attempting to remove
/// one is a programming error, not a runtime path.
pub struct StoragePool {
    volumes: RwLock<HashMap<VolumeId, Arc<Volume>>>,
    stores: Arc<TenantStores>,
    tenant_registry: Arc<TenantRegistry>,
    tenant_locks: Arc<TenantLocks>,
}

impl StoragePool {
    pub fn new(
        stores: Arc<TenantStores>,
        tenant_registry: Arc<TenantRegistry>,
        tenant_locks: Arc<TenantLocks>,
    ) -> Self {
        Self {
            volumes: RwLock::new(HashMap::new()),
            stores,
            tenant_registry,
            tenant_locks,
        }
    }

    /// Admits a volume after it passes the stabilizing health-probe window.
    /// Re-adding an already-mounted volume id is an error.
    pub fn add_volume(
        &self,
        config: VolumeConfig,
        total_capacity: u64,
        admission: AdmissionConfig,
    ) -> Result<(), PoolError> {
        let volume_id = config.volume_id.clone();
        {
            let volumes = self
                .volumes
                .read()
                .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?;
            if volumes.contains_key(&volume_id) {
                return Err(PoolError::VolumeAlreadyRegistered(volume_id.to_string()));
            }
        }

        let volume = Volume::new(config, total_capacity);
        let mut consecutive_healthy = 0usize;
        for attempt in 0..admission.probes {
            if volume.probe_health() {
                consecutive_healthy += 1;
                if consecutive_healthy >= 2 {
                    break;
                }
            } else {
                consecutive_healthy = 0;
            }
            if attempt + 1 < admission.probes {
                thread::sleep(admission.delay);
            }
        }
        if consecutive_healthy < 2 {
            tracing::warn!(volume_id = %volume_id, "volume failed stabilizing health probe; admitting unhealthy");
        }

        self.volumes
            .write()
            .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?
            .insert(volume_id.clone(), Arc::new(volume));
        tracing::info!(volume_id = %volume_id, "volume admitted to pool");
        Ok(())
    }

    fn volume(&self, volume_id: &VolumeId) -> Result<Arc<Volume>, PoolError> {
        self.volumes
            .read()
            .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?
            .get(volume_id)
            .cloned()
            .ok_or(PoolError::StorageVolumeUnavailable)
    }

    /// Highest-`available_space` healthy volume, if any.
    fn pick_volume(&self) -> Result<Arc<Volume>, PoolError> {
        let volumes = self
            .volumes
            .read()
            .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?;
        volumes
            .values()
            .filter(|v| v.healthy())
            .max_by_key(|v| v.available_space())
            .cloned()
            .ok_or(PoolError::StorageVolumeUnavailable)
    }

    fn require_enabled(&self, tenant_id: &TenantId) -> Result<(), PoolError> {
        if !self
            .tenant_registry
            .is_enabled(tenant_id)
            .map_err(|_| PoolError::TenantNotFound)?
        {
            return Err(PoolError::TenantDisabled);
        }
        Ok(())
    }

    /// The directory-path quota key a physical file falls under: the
    /// volume-qualified parent directory of its sharded physical path.
    /// Quotas are therefore enforced on the same boundary the sharding
    /// depth bounds (capping per-directory entry counts), which is
    /// also exactly what the recovery rebuild can recompute from nothing
    /// but a scan of the physical tree — no logical grouping that
    /// only existed in the now-corrupted metadata store is required.
    pub fn directory_key_for(volume_id: &VolumeId, relative_parent: &Path) -> String {
        format!("{volume_id}:{}", relative_parent.to_string_lossy())
    }

    /// The tenant-wide quota key, shared with the recovery service's
    /// quota-rebuild step so both land on the exact same key format.
    pub fn tenant_key(tenant_id: &TenantId) -> String {
        format!("{tenant_id}/{TENANT_WIDE_KEY}")
    }

    /// Two-phase write: quota gate, volume pick, physical write, metadata
    /// upsert. Rolls back the physical file and both quota increments on
    /// metadata failure; the bytes are orphaned (and later
    /// reclaimed by the reconciler) only if the rollback delete itself
    /// fails.
    ///
    /// The whole sequence runs under the tenant's mutex: `try_increment`
    /// reads, checks, and persists the quota record as three separate
    /// engine round trips, so two concurrent writers racing past the gate
    /// unlocked could both observe `current = max - 1` and both pass.
    pub fn write(
        &self,
        tenant_id: &TenantId,
        data: &[u8],
        original_name: Option<&str>,
    ) -> Result<ItemId, PoolError> {
        self.require_enabled(tenant_id)?;

        self.tenant_locks
            .with_tenant_lock(tenant_id, || self.write_locked(tenant_id, data, original_name))
    }

    fn write_locked(
        &self,
        tenant_id: &TenantId,
        data: &[u8],
        original_name: Option<&str>,
    ) -> Result<ItemId, PoolError> {
        let quota = self.stores.quota_store(tenant_id)?;
        let tenant_key = Self::tenant_key(tenant_id);

        if !quota.try_increment(&tenant_key)? {
            let record = quota.get(&tenant_key)?;
            return Err(PoolError::TenantQuotaExceeded {
                current: record.current_count,
                max: record.max_count,
            });
        }

        let result = self.write_bytes_and_record(tenant_id, data, original_name, &quota);
        if result.is_err() {
            quota.decrement(&tenant_key)?;
        }
        result
    }

    fn write_bytes_and_record(
        &self,
        tenant_id: &TenantId,
        data: &[u8],
        original_name: Option<&str>,
        quota: &depot_store::QuotaStore,
    ) -> Result<ItemId, PoolError> {
        let volume = self.pick_volume()?;
        if volume.available_space() <= 0 {
            return Err(PoolError::InsufficientStorage);
        }

        let item_id = ItemId::generate();
        let relative = volume.physical_path_for(tenant_id, &item_id, original_name)?;
        let dir_key = Self::directory_key_for(
            volume.id(),
            relative.parent().unwrap_or_else(|| Path::new("")),
        );

        if !quota.try_increment(&dir_key)? {
            let record = quota.get(&dir_key)?;
            return Err(PoolError::DirectoryQuotaExceeded {
                current: record.current_count,
                max: record.max_count,
            });
        }

        let write_result = self.finish_write(tenant_id, &item_id, &relative, data, original_name, &volume, &dir_key);
        if write_result.is_err() {
            quota.decrement(&dir_key)?;
        }
        write_result
    }

    fn finish_write(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
        relative: &Path,
        data: &[u8],
        original_name: Option<&str>,
        volume: &Arc<Volume>,
        dir_key: &str,
    ) -> Result<ItemId, PoolError> {
        let absolute = volume.write(relative, data)?;

        let record = ItemRecord {
            item_id: item_id.clone(),
            tenant_id: tenant_id.clone(),
            volume_id: volume.id().clone(),
            physical_path: absolute.to_string_lossy().into_owned(),
            directory_path: dir_key.to_string(),
            size_bytes: data.len() as u64,
            created_at: Utc::now(),
            status: ItemStatus::Pending,
            retry_count: 0,
            last_failed_at: None,
            last_error: None,
            processing_started_at: None,
            available_at: None,
            original_name: original_name.map(str::to_string),
        };

        let metadata = self.stores.metadata_store(tenant_id)?;
        let upsert_result = metadata.upsert(record);
        if let Err(err) = upsert_result {
            if let Err(delete_err) = volume.delete(relative) {
                tracing::error!(
                    item_id = %item_id,
                    error = %delete_err,
                    "failed to roll back physical file after metadata upsert failure; bytes orphaned"
                );
            }
            return Err(err.into());
        }
        tracing::info!(item_id = %item_id, tenant_id = %tenant_id, "item written");
        Ok(item_id.clone())
    }

    fn record_for(&self, tenant_id: &TenantId, item_id: &ItemId) -> Result<ItemRecord, PoolError> {
        self.require_enabled(tenant_id)?;
        let metadata = self.stores.metadata_store(tenant_id)?;
        let record = metadata.get(item_id)?.ok_or(PoolError::NotFound)?;
        if &record.tenant_id != tenant_id {
            return Err(PoolError::Unauthorized);
        }
        Ok(record)
    }

    pub fn read(&self, tenant_id: &TenantId, item_id: &ItemId) -> Result<Bytes, PoolError> {
        let record = self.record_for(tenant_id, item_id)?;
        let volume = self.volume(&record.volume_id)?;
        if !volume.healthy() {
            return Err(PoolError::StorageVolumeUnavailable);
        }
        Ok(volume.read(Path::new(&record.physical_path))?)
    }

    pub fn get_info(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
    ) -> Result<Option<ItemRecord>, PoolError> {
        self.require_enabled(tenant_id)?;
        let metadata = self.stores.metadata_store(tenant_id)?;
        match metadata.get(item_id)? {
            Some(record) if &record.tenant_id == tenant_id => Ok(Some(record)),
            Some(_) => Err(PoolError::Unauthorized),
            None => Ok(None),
        }
    }

    pub fn get_location(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
    ) -> Result<Option<ItemLocation>, PoolError> {
        Ok(self.get_info(tenant_id, item_id)?.map(|r| ItemLocation::from(&r)))
    }

    /// Backs `capacity_total` / `capacity_available`: summed across every
    /// currently-healthy volume.
    pub fn capacity_snapshot(&self) -> Result<CapacitySnapshot, PoolError> {
        let volumes = self
            .volumes
            .read()
            .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?;
        let mut total_capacity = 0u64;
        let mut available_space = 0u64;
        for volume in volumes.values().filter(|v| v.healthy()) {
            let info = volume.info();
            total_capacity += info.total_capacity;
            available_space += info.available_space.max(0) as u64;
        }
        Ok(CapacitySnapshot {
            total_capacity,
            available_space,
        })
    }

    /// Re-evaluates health for every mounted volume; used by the
    /// reconciler's periodic sweep to flip a degraded volume's `healthy`
    /// flag without waiting for the next write attempt to discover it.
    pub fn reprobe_health(&self) -> Result<(), PoolError> {
        let volumes = self
            .volumes
            .read()
            .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?;
        for volume in volumes.values() {
            let healthy = volume.probe_health();
            if !healthy {
                tracing::warn!(volume_id = %volume.id(), "volume failed health re-probe");
            }
        }
        Ok(())
    }

    pub fn volume_infos(&self) -> Result<Vec<VolumeInfo>, PoolError> {
        let volumes = self
            .volumes
            .read()
            .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?;
        Ok(volumes.values().map(|v| v.info()).collect())
    }

    /// Every currently-mounted volume handle; used by the reconciler's
    /// sweep steps and the recovery service's rebuild-from-scan walk, both
    /// of which need direct filesystem access beyond the pool's own
    /// read/write/delete surface.
    pub fn mounted_volumes(&self) -> Result<Vec<Arc<Volume>>, PoolError> {
        Ok(self
            .volumes
            .read()
            .map_err(|_| depot_store::StoreError::Io("volume map poisoned".into()))?
            .values()
            .cloned()
            .collect())
    }
}
