use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use depot_pool::StoragePool;
use depot_store::{StoreEngine, StoreError, TenantStores};
use depot_tenant::TenantLocks;
use depot_types::{ItemId, ItemRecord, ItemStatus, TenantId};

use crate::error::RecoveryError;

const PROBE_QUOTA_KEY: &str = "__probe__";

/// Startup recovery behavior (`health_check_enabled`, `auto_recover`,
/// `fail_fast`), plus the ambiguous-failure retry window for the
/// detection step.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    pub health_check_enabled: bool,
    pub auto_recover: bool,
    pub fail_fast: bool,
    pub ambiguous_retries: usize,
    pub ambiguous_retry_gap: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            health_check_enabled: true,
            auto_recover: true,
            fail_fast: false,
            ambiguous_retries: 3,
            ambiguous_retry_gap: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Rebuilt,
    CorruptionReported,
}

/// Corruption detection, backup/delete/rebuild-from-scan, and the startup
/// health loop.
pub struct RecoveryService {
    stores: Arc<TenantStores>,
    pool: Arc<StoragePool>,
    tenant_locks: Arc<TenantLocks>,
    config: RecoveryConfig,
}

impl RecoveryService {
    pub fn new(
        stores: Arc<TenantStores>,
        pool: Arc<StoragePool>,
        tenant_locks: Arc<TenantLocks>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            stores,
            pool,
            tenant_locks,
            config,
        }
    }

    /// Probes every named tenant's stores in turn. `fail_fast` aborts on the
    /// first tenant whose rebuild fails (or, with `auto_recover` off, whose
    /// corruption is merely reported); otherwise every tenant is attempted
    /// and failures are logged.
    pub fn run_startup_health_check(&self, tenant_ids: &[TenantId]) -> Result<(), RecoveryError> {
        if !self.config.health_check_enabled {
            return Ok(());
        }
        for tenant_id in tenant_ids {
            match self.probe_tenant(tenant_id) {
                Ok(ProbeOutcome::Healthy) => {}
                Ok(ProbeOutcome::Rebuilt) => {
                    tracing::info!(tenant_id = %tenant_id, "tenant store rebuilt at startup");
                }
                Ok(ProbeOutcome::CorruptionReported) => {
                    tracing::error!(tenant_id = %tenant_id, "corruption reported, auto_recover disabled");
                    if self.config.fail_fast {
                        return Err(RecoveryError::RebuildFailed {
                            tenant_id: tenant_id.to_string(),
                            reason: "corruption reported with auto_recover disabled".into(),
                        });
                    }
                }
                Err(err) => {
                    tracing::error!(tenant_id = %tenant_id, error = %err, "startup health check failed");
                    if self.config.fail_fast {
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Probes one tenant's metadata and quota stores, rebuilding in place if
    /// a recoverable-corruption signature surfaces and `auto_recover` is on.
    pub fn probe_tenant(&self, tenant_id: &TenantId) -> Result<ProbeOutcome, RecoveryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.touch(tenant_id) {
                Ok(()) => return Ok(ProbeOutcome::Healthy),
                Err(StoreError::Corruption(reason)) => {
                    tracing::warn!(tenant_id = %tenant_id, %reason, "recoverable corruption detected");
                    if !self.config.auto_recover {
                        return Ok(ProbeOutcome::CorruptionReported);
                    }
                    self.rebuild_tenant(tenant_id)?;
                    return Ok(ProbeOutcome::Rebuilt);
                }
                Err(StoreError::LockContention(reason)) if attempt <= self.config.ambiguous_retries => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        %reason,
                        attempt,
                        "ambiguous store failure, retrying to rule out lock contention"
                    );
                    thread::sleep(self.config.ambiguous_retry_gap);
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn touch(&self, tenant_id: &TenantId) -> Result<(), StoreError> {
        let metadata = self.stores.metadata_store(tenant_id)?;
        metadata.ensure_hydrated()?;
        let quota = self.stores.quota_store(tenant_id)?;
        quota.get(PROBE_QUOTA_KEY)?;
        Ok(())
    }

    /// Runs the full six-step rebuild protocol for one tenant: close
    /// handle / evict cache, forensic backup, delete, scan-and-synthesize,
    /// release mutex. Metadata and quota stores are rebuilt together since
    /// both are invalidated by the same physical-tree scan.
    pub fn rebuild_tenant(&self, tenant_id: &TenantId) -> Result<usize, RecoveryError> {
        let timestamp = recovery_timestamp();
        let stores = self.stores.clone();
        let pool = self.pool.clone();
        let tenant_id = tenant_id.clone();

        self.tenant_locks
            .with_tenant_lock(&tenant_id, move || -> Result<usize, RecoveryError> {
                stores.evict(&tenant_id)?;

                backup_and_wipe(&stores.metadata_path(&tenant_id), &timestamp)?;
                backup_and_wipe(&stores.quota_path(&tenant_id), &timestamp)?;

                let scan = scan_physical_tree(&pool, &tenant_id)?;

                let metadata = stores.metadata_store(&tenant_id)?;
                let record_count = scan.records.len();
                metadata.finish_rebuild(scan.records)?;

                let quota = stores.quota_store(&tenant_id)?;
                for (dir_key, count) in &scan.directory_counts {
                    quota.rebuild_directory(dir_key, *count)?;
                }
                quota.rebuild_directory(&StoragePool::tenant_key(&tenant_id), record_count as u64)?;

                tracing::info!(
                    tenant_id = %tenant_id,
                    records = record_count,
                    "rebuild from physical scan complete"
                );
                Ok(record_count)
            })
    }
}

fn recovery_timestamp() -> String {
    Utc::now().format(".corrupted.%Y%m%d%H%M%S").to_string()
}

/// Backs up `path` to a forensic `<path>.corrupted.<timestamp>` sibling and
/// removes the original. Tolerates the corruption having surfaced either at
/// `StoreEngine::open` (no live handle to close gracefully) or only once the
/// store is touched (a handle exists and is closed cleanly first).
fn backup_and_wipe(path: &Path, suffix: &str) -> Result<(), RecoveryError> {
    if !path.exists() {
        return Ok(());
    }
    match StoreEngine::open(path) {
        Ok(engine) => {
            engine.backup_and_delete(suffix)?;
        }
        Err(_) => {
            let mut backup_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            backup_name.push_str(suffix);
            let backup_path = path.with_file_name(backup_name);
            copy_dir_recursive(path, &backup_path)?;
            if path.is_dir() {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
        }
    }
    Ok(())
}

fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let dest = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_dir_recursive(&entry.path(), &dest)?;
            } else {
                fs::copy(entry.path(), &dest)?;
            }
        }
    } else {
        fs::copy(from, to)?;
    }
    Ok(())
}

struct ScanResult {
    records: Vec<ItemRecord>,
    directory_counts: HashMap<String, u64>,
}

/// Walks the tenant's physical tree across every mounted volume,
/// synthesizing a fresh pending record per byte file found and counting
/// files per directory-quota key.
fn scan_physical_tree(pool: &StoragePool, tenant_id: &TenantId) -> Result<ScanResult, RecoveryError> {
    let mut records = Vec::new();
    let mut directory_counts: HashMap<String, u64> = HashMap::new();

    for volume in pool.mounted_volumes()? {
        let tenant_root = volume.mount_root().join(tenant_id.as_str());
        if !tenant_root.exists() {
            continue;
        }
        let mut files = Vec::new();
        walk_files(&tenant_root, &mut files)?;

        for file in files {
            let relative = file
                .strip_prefix(volume.mount_root())
                .unwrap_or(&file)
                .to_path_buf();
            let parent = relative.parent().unwrap_or_else(|| Path::new(""));
            let dir_key = StoragePool::directory_key_for(volume.id(), parent);
            *directory_counts.entry(dir_key.clone()).or_insert(0) += 1;

            let metadata = fs::metadata(&file)?;
            let created_at = metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            records.push(ItemRecord {
                item_id: ItemId::generate(),
                tenant_id: tenant_id.clone(),
                volume_id: volume.id().clone(),
                physical_path: file.to_string_lossy().into_owned(),
                directory_path: dir_key,
                size_bytes: metadata.len(),
                created_at,
                status: ItemStatus::Pending,
                retry_count: 0,
                last_failed_at: None,
                last_error: None,
                processing_started_at: None,
                available_at: None,
                original_name: None,
            });
        }
    }

    Ok(ScanResult {
        records,
        directory_counts,
    })
}

fn walk_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_files(&path, out)?;
        } else if !path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_tenant::TenantRegistry;
    use depot_types::{VolumeConfig, VolumeId};
    use std::fs;

    fn harness() -> (tempfile::TempDir, Arc<TenantStores>, Arc<StoragePool>, Arc<TenantLocks>) {
        let dir = tempfile::tempdir().unwrap();
        let stores = Arc::new(TenantStores::new(dir.path().join("meta"), dir.path().join("quota")));
        let registry = Arc::new(TenantRegistry::open(dir.path().join("meta"), true).unwrap());
        let locks = Arc::new(TenantLocks::new());
        let pool = Arc::new(StoragePool::new(stores.clone(), registry, locks.clone()));
        pool.add_volume(
            VolumeConfig {
                volume_id: VolumeId::new("v1"),
                mount_path: dir.path().join("v1").to_string_lossy().into_owned(),
                sharding_depth: 1,
            },
            1_000_000,
            depot_pool::AdmissionConfig {
                probes: 2,
                delay: Duration::from_millis(1),
            },
        )
        .unwrap();
        (dir, stores, pool, locks)
    }

    #[test]
    fn probe_reports_healthy_for_untouched_tenant() {
        let (_dir, stores, pool, locks) = harness();
        let service = RecoveryService::new(stores, pool, locks, RecoveryConfig::default());
        let tenant = TenantId::new("t1");
        assert_eq!(
            service.probe_tenant(&tenant).unwrap(),
            ProbeOutcome::Healthy
        );
    }

    #[test]
    fn rebuild_recovers_records_from_physical_scan() {
        let (_dir, stores, pool, locks) = harness();
        let tenant = TenantId::new("t1");

        for payload in [&b"a"[..], &b"bb"[..], &b"ccc"[..]] {
            pool.write(&tenant, payload, None).unwrap();
        }

        let metadata_path = stores.metadata_path(&tenant);
        let service = RecoveryService::new(stores.clone(), pool.clone(), locks, RecoveryConfig::default());
        let record_count = service.rebuild_tenant(&tenant).unwrap();
        assert_eq!(record_count, 3);

        let records = stores.metadata_store(&tenant).unwrap().list_all().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.status == ItemStatus::Pending));
        assert!(records.iter().all(|r| r.retry_count == 0));

        let backup_exists = fs::read_dir(metadata_path.parent().unwrap())
            .unwrap()
            .any(|e| {
                e.unwrap()
                    .file_name()
                    .to_string_lossy()
                    .contains(".corrupted.")
            });
        assert!(backup_exists);

        let quota = stores.quota_store(&tenant).unwrap();
        let tenant_key = StoragePool::tenant_key(&tenant);
        assert_eq!(quota.get(&tenant_key).unwrap().current_count, 3);
    }

    #[test]
    fn rebuild_twice_produces_same_record_count() {
        let (_dir, stores, pool, locks) = harness();
        let tenant = TenantId::new("t1");
        pool.write(&tenant, b"x", None).unwrap();
        pool.write(&tenant, b"y", None).unwrap();

        let service = RecoveryService::new(stores.clone(), pool.clone(), locks, RecoveryConfig::default());
        let first = service.rebuild_tenant(&tenant).unwrap();
        let second = service.rebuild_tenant(&tenant).unwrap();
        assert_eq!(first, second);
    }
}
