//! # depot: multi-tenant file queue store
//!
//! The facade crate: wires the per-tenant active cache and durable stores
//! ([`depot_store`]), the claim/retry scheduler ([`depot_scheduler`]), the
//! storage pool write path ([`depot_pool`]), tenant lifecycle
//! ([`depot_tenant`]), corruption recovery ([`depot_recovery`]), and the
//! background reconciler ([`depot_reconciler`]) into the single
//! [`Depot`] handle. Producers
//! submit opaque byte streams and receive a system-assigned id; consumers
//! pull not-yet-processed items, read their contents, and either finalize
//! or fail each one with bounded retry.

mod error;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use depot_config::DepotConfig;
pub use depot_io::VolumeError;
use depot_pool::{AdmissionConfig, CapacitySnapshot, StoragePool};
use depot_reconciler::{Reconciler, ReconcilerConfig, TickReport};
use depot_recovery::{ProbeOutcome, RecoveryConfig, RecoveryService};
use depot_scheduler::{RetryConfig, Scheduler};
use depot_store::TenantStores;
use depot_tenant::{TenantLocks, TenantRegistry};
pub use depot_types::{
    CancellationToken, ItemId, ItemLocation, ItemRecord, ItemStatus, TenantId, TenantRecord,
    TenantStatus, VolumeConfig, VolumeId,
};

pub use error::DepotError;

pub type Result<T> = std::result::Result<T, DepotError>;

fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

impl From<&depot_config::RetrySettings> for RetryConfig {
    fn from(settings: &depot_config::RetrySettings) -> Self {
        RetryConfig {
            max_retries: settings.max,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            exponential: settings.exponential,
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl From<&DepotConfig> for ReconcilerConfig {
    fn from(config: &DepotConfig) -> Self {
        ReconcilerConfig {
            processing_timeout: duration_from_secs(config.processing_timeout_secs),
            failed_retention: duration_from_secs(config.failed_retention_secs),
            completed_retention: duration_from_secs(config.completed_retention_secs),
            cleanup_interval: duration_from_secs(config.cleanup_interval_secs),
            cleanup_initial_delay: duration_from_secs(config.cleanup_initial_delay_secs),
            compaction_enabled: config.compaction_enabled,
            compaction_interval: duration_from_secs(config.compaction_interval_secs),
        }
    }
}

impl From<&DepotConfig> for RecoveryConfig {
    fn from(config: &DepotConfig) -> Self {
        RecoveryConfig {
            health_check_enabled: config.health_check_enabled,
            auto_recover: config.auto_recover,
            fail_fast: config.fail_fast,
            ambiguous_retries: 3,
            ambiguous_retry_gap: Duration::from_secs(1),
        }
    }
}

/// The assembled system: every core subsystem sharing one set of
/// per-tenant stores, the tenant lock registry, and the tenant registry's
/// status cache.
pub struct Depot {
    tenant_registry: Arc<TenantRegistry>,
    tenant_locks: Arc<TenantLocks>,
    stores: Arc<TenantStores>,
    pool: Arc<StoragePool>,
    scheduler: Arc<Scheduler>,
    recovery: Arc<RecoveryService>,
    reconciler: Arc<Reconciler>,
    default_tenant_quota: u64,
}

impl Depot {
    /// Opens (or creates) every durable store under the configured roots,
    /// admits every configured volume, seeds any pre-configured tenants,
    /// and runs the startup health check if enabled. This is the one
    /// fallible entry point; everything after is infallible to construct.
    pub fn open(mut config: DepotConfig) -> Result<Self> {
        config.resolve_paths(std::env::current_dir().unwrap_or_default());

        let stores = Arc::new(TenantStores::new(
            config.metadata_root.clone(),
            config.quota_root.clone(),
        ));
        let tenant_registry = Arc::new(TenantRegistry::open(
            &config.metadata_root,
            config.auto_create_tenants,
        )?);
        let tenant_locks = Arc::new(TenantLocks::new());

        let pool = Arc::new(StoragePool::new(
            stores.clone(),
            tenant_registry.clone(),
            tenant_locks.clone(),
        ));
        for volume in &config.volumes {
            pool.add_volume(
                VolumeConfig {
                    volume_id: VolumeId::new(volume.id.clone()),
                    mount_path: volume.mount_path.to_string_lossy().into_owned(),
                    sharding_depth: volume.sharding_depth,
                },
                volume.total_capacity,
                AdmissionConfig::default(),
            )
            .map_err(DepotError::from)?;
        }

        let scheduler = Arc::new(Scheduler::new(
            stores.clone(),
            tenant_registry.clone(),
            tenant_locks.clone(),
            RetryConfig::from(&config.retry),
        ));

        let recovery = Arc::new(RecoveryService::new(
            stores.clone(),
            pool.clone(),
            tenant_locks.clone(),
            RecoveryConfig::from(&config),
        ));

        let reconciler = Arc::new(Reconciler::new(
            stores.clone(),
            pool.clone(),
            scheduler.clone(),
            tenant_locks.clone(),
            ReconcilerConfig::from(&config),
        ));

        let depot = Self {
            tenant_registry,
            tenant_locks,
            stores,
            pool,
            scheduler,
            recovery,
            reconciler,
            default_tenant_quota: config.default_tenant_quota,
        };

        for seed in &config.tenants {
            depot.seed_tenant(seed)?;
        }

        if config.health_check_enabled {
            let tenant_ids: Vec<TenantId> = depot
                .tenant_registry
                .list_all()?
                .into_iter()
                .map(|r| r.tenant_id)
                .collect();
            depot.recovery.run_startup_health_check(&tenant_ids)?;
        }

        Ok(depot)
    }

    fn seed_tenant(&self, seed: &depot_config::TenantSeed) -> Result<()> {
        let tenant_id = TenantId::new(seed.tenant_id.clone());
        if self.tenant_registry.get(&tenant_id)?.is_none() {
            self.tenant_registry
                .create(tenant_id.clone(), seed.storage_path.clone())?;
        }
        let quota_limit = seed.quota.unwrap_or(self.default_tenant_quota);
        if quota_limit > 0 {
            let quota = self.stores.quota_store(&tenant_id)?;
            quota.set_limit(&StoragePool::tenant_key(&tenant_id), quota_limit)?;
        }
        Ok(())
    }

    // -- Producer / consumer surface -----------------------------------

    pub fn write_file(
        &self,
        tenant_id: &TenantId,
        data: &[u8],
        original_name: Option<&str>,
    ) -> Result<ItemId> {
        Ok(self.pool.write(tenant_id, data, original_name)?)
    }

    pub fn read_file(&self, tenant_id: &TenantId, item_id: &ItemId) -> Result<Bytes> {
        Ok(self.pool.read(tenant_id, item_id)?)
    }

    pub fn get_info(&self, tenant_id: &TenantId, item_id: &ItemId) -> Result<Option<ItemRecord>> {
        Ok(self.pool.get_info(tenant_id, item_id)?)
    }

    pub fn get_location(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
    ) -> Result<Option<ItemLocation>> {
        Ok(self.pool.get_location(tenant_id, item_id)?)
    }

    pub fn claim_next(&self, tenant_id: &TenantId) -> Result<Option<ItemLocation>> {
        Ok(self.scheduler.claim_next(tenant_id)?)
    }

    pub fn claim_batch(&self, tenant_id: &TenantId, n: usize) -> Result<Vec<ItemLocation>> {
        Ok(self.scheduler.claim_batch(tenant_id, n)?)
    }

    pub fn mark_completed(&self, tenant_id: &TenantId, item_id: &ItemId) -> Result<()> {
        Ok(self.scheduler.mark_completed(tenant_id, item_id)?)
    }

    pub fn mark_failed(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
        error: impl Into<String>,
    ) -> Result<()> {
        Ok(self.scheduler.mark_failed(tenant_id, item_id, error)?)
    }

    pub fn status(&self, tenant_id: &TenantId, item_id: &ItemId) -> Result<ItemStatus> {
        Ok(self.scheduler.status(tenant_id, item_id)?)
    }

    pub fn capacity_total(&self) -> Result<u64> {
        Ok(self.pool.capacity_snapshot().map(|s| s.total_capacity)?)
    }

    pub fn capacity_available(&self) -> Result<u64> {
        Ok(self.pool.capacity_snapshot().map(|s| s.available_space)?)
    }

    pub fn capacity_snapshot(&self) -> Result<CapacitySnapshot> {
        Ok(self.pool.capacity_snapshot()?)
    }

    // -- Tenant lifecycle ---------------------------------------------------

    pub fn create_tenant(
        &self,
        tenant_id: &TenantId,
        storage_path: impl Into<String>,
    ) -> Result<TenantRecord> {
        Ok(self
            .tenant_registry
            .create(tenant_id.clone(), storage_path)?)
    }

    pub fn enable_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        Ok(self.tenant_registry.enable(tenant_id)?)
    }

    pub fn disable_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        Ok(self.tenant_registry.disable(tenant_id)?)
    }

    pub fn suspend_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        Ok(self.tenant_registry.suspend(tenant_id)?)
    }

    pub fn resume_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        Ok(self.tenant_registry.resume(tenant_id)?)
    }

    pub fn list_tenants(&self) -> Result<Vec<TenantRecord>> {
        Ok(self.tenant_registry.list_all()?)
    }

    // -- Recovery & reconciliation -------------------------------------------

    /// Runs the six-step rebuild protocol for one tenant on demand (an
    /// operator action; the startup health loop calls this automatically
    /// when `auto_recover` is set).
    pub fn rebuild_tenant(&self, tenant_id: &TenantId) -> Result<usize> {
        Ok(self.recovery.rebuild_tenant(tenant_id)?)
    }

    pub fn probe_tenant(&self, tenant_id: &TenantId) -> Result<ProbeOutcome> {
        Ok(self.recovery.probe_tenant(tenant_id)?)
    }

    /// Runs one reconciler tick synchronously (junk sweep, timeout
    /// requeue, terminal purge, orphan sweep, empty-dir sweep, throttled
    /// compaction). Host wiring decides whether to call this from a timer
    /// thread, a cron job, or a test.
    pub fn run_reconciler_tick(&self) -> Result<TickReport> {
        Ok(self.reconciler.run_once()?)
    }

    /// Blocks, running reconciler ticks on its configured interval until
    /// `token` is cancelled. Intended to be driven from a dedicated thread
    /// by the host.
    pub fn run_reconciler_loop(&self, token: &CancellationToken) {
        self.reconciler.run_loop(token);
    }

    /// Direct access to the storage pool, for host wiring that needs the
    /// volume listing or a manual health re-probe outside a reconciler
    /// tick.
    pub fn pool(&self) -> &StoragePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_config::VolumeEntry;

    fn test_config(dir: &std::path::Path) -> DepotConfig {
        let mut config = DepotConfig::default();
        config.metadata_root = dir.join("meta");
        config.quota_root = dir.join("quota");
        config.volumes.push(VolumeEntry {
            id: "v1".to_string(),
            mount_path: dir.join("v1"),
            sharding_depth: 1,
            total_capacity: 1_000_000,
        });
        config.auto_create_tenants = true;
        config
    }

    #[test]
    fn open_admits_configured_volumes_and_seeds_tenants() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.tenants.push(depot_config::TenantSeed {
            tenant_id: "t1".to_string(),
            storage_path: "/mnt/v1/t1".to_string(),
            quota: None,
        });
        let depot = Depot::open(config).unwrap();
        let tenants = depot.list_tenants().unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].tenant_id, TenantId::new("t1"));
    }

    #[test]
    fn write_claim_complete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::open(test_config(dir.path())).unwrap();
        let tenant = TenantId::new("t1");

        let item_id = depot.write_file(&tenant, b"hello", Some("x.txt")).unwrap();
        let location = depot.claim_next(&tenant).unwrap().unwrap();
        assert_eq!(location.item_id, item_id);
        assert_eq!(location.size_bytes, 5);

        depot.mark_completed(&tenant, &item_id).unwrap();
        assert!(depot.get_info(&tenant, &item_id).unwrap().is_none());
    }

    #[test]
    fn disabled_tenant_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::open(test_config(dir.path())).unwrap();
        let tenant = TenantId::new("t1");
        depot.tenant_registry.get(&tenant).unwrap();
        depot.disable_tenant(&tenant).unwrap();
        assert!(matches!(
            depot.write_file(&tenant, b"x", None),
            Err(DepotError::TenantDisabled)
        ));
    }

    #[test]
    fn capacity_reflects_admitted_volume() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::open(test_config(dir.path())).unwrap();
        assert_eq!(depot.capacity_total().unwrap(), 1_000_000);
        assert!(depot.capacity_available().unwrap() <= 1_000_000);
    }
}
