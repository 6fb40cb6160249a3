use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use depot_store::StoreEngine;
use depot_types::{TenantId, TenantRecord, TenantStatus};

use crate::error::TenantError;
use crate::ttl_cache::TtlCache;

const TREE_NAME: &str = "tenants";
const STATUS_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Tenant lifecycle and a short-lived status cache accelerating the hot
/// path (`is_enabled`, consulted by every scheduler/pool operation).
pub struct TenantRegistry {
    engine: StoreEngine,
    status_cache: Mutex<TtlCache<TenantId, TenantStatus>>,
    auto_create: bool,
    volume_mount_hint: String,
}

impl TenantRegistry {
    pub fn open(
        metadata_root: impl AsRef<Path>,
        auto_create: bool,
    ) -> Result<Self, TenantError> {
        let path: PathBuf = metadata_root.as_ref().join("_tenants.db");
        let engine = StoreEngine::open(path)?;
        Ok(Self {
            engine,
            status_cache: Mutex::new(TtlCache::new(STATUS_CACHE_TTL)),
            auto_create,
            volume_mount_hint: String::new(),
        })
    }

    fn tree(&self) -> Result<sled::Tree, TenantError> {
        Ok(self.engine.tree(TREE_NAME)?)
    }

    fn persist(&self, record: &TenantRecord) -> Result<(), TenantError> {
        let bytes = serde_json::to_vec(record).map_err(depot_store::StoreError::from)?;
        let tree = self.tree()?;
        tree.insert(record.tenant_id.as_str().as_bytes(), bytes)
            .map_err(depot_store::classify_sled_error)?;
        tree.flush().map_err(depot_store::classify_sled_error)?;
        self.status_cache
            .lock()
            .expect("status cache poisoned")
            .insert(record.tenant_id.clone(), record.status);
        Ok(())
    }

    fn load(&self, tenant_id: &TenantId) -> Result<Option<TenantRecord>, TenantError> {
        let tree = self.tree()?;
        match tree
            .get(tenant_id.as_str().as_bytes())
            .map_err(depot_store::classify_sled_error)?
        {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(depot_store::StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    pub fn get(&self, tenant_id: &TenantId) -> Result<Option<TenantRecord>, TenantError> {
        match self.load(tenant_id)? {
            Some(record) => Ok(Some(record)),
            None if self.auto_create => {
                let storage_path = format!("{}{}", self.volume_mount_hint, tenant_id);
                Ok(Some(self.create(tenant_id.clone(), storage_path)?))
            }
            None => Ok(None),
        }
    }

    /// Accelerated status check consulted on the hot path of every
    /// scheduler/pool operation. Falls back to a durable read (and repopulates
    /// the cache) on a miss.
    pub fn is_enabled(&self, tenant_id: &TenantId) -> Result<bool, TenantError> {
        if let Some(status) = self
            .status_cache
            .lock()
            .expect("status cache poisoned")
            .get(tenant_id)
        {
            return Ok(status == TenantStatus::Enabled);
        }
        let record = self.get(tenant_id)?.ok_or(TenantError::NotFound)?;
        Ok(record.status == TenantStatus::Enabled)
    }

    pub fn create(
        &self,
        tenant_id: TenantId,
        storage_path: impl Into<String>,
    ) -> Result<TenantRecord, TenantError> {
        if self.load(&tenant_id)?.is_some() {
            return Err(TenantError::AlreadyExists);
        }
        let record = TenantRecord::new(tenant_id, storage_path);
        self.persist(&record)?;
        tracing::info!(tenant_id = %record.tenant_id, "tenant created");
        Ok(record)
    }

    fn set_status(&self, tenant_id: &TenantId, status: TenantStatus) -> Result<(), TenantError> {
        let mut record = self.load(tenant_id)?.ok_or(TenantError::NotFound)?;
        record.status = status;
        record.updated_at = Utc::now();
        self.persist(&record)?;
        Ok(())
    }

    pub fn enable(&self, tenant_id: &TenantId) -> Result<(), TenantError> {
        self.set_status(tenant_id, TenantStatus::Enabled)?;
        tracing::info!(tenant_id = %tenant_id, "tenant enabled");
        Ok(())
    }

    pub fn disable(&self, tenant_id: &TenantId) -> Result<(), TenantError> {
        self.set_status(tenant_id, TenantStatus::Disabled)?;
        tracing::info!(tenant_id = %tenant_id, "tenant disabled");
        Ok(())
    }

    pub fn suspend(&self, tenant_id: &TenantId) -> Result<(), TenantError> {
        self.set_status(tenant_id, TenantStatus::Suspended)?;
        tracing::warn!(tenant_id = %tenant_id, "tenant suspended");
        Ok(())
    }

    pub fn resume(&self, tenant_id: &TenantId) -> Result<(), TenantError> {
        self.set_status(tenant_id, TenantStatus::Enabled)?;
        tracing::info!(tenant_id = %tenant_id, "tenant resumed");
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<TenantRecord>, TenantError> {
        let tree = self.tree()?;
        let mut records = Vec::new();
        for kv in tree.iter() {
            let (_, value) = kv.map_err(depot_store::classify_sled_error)?;
            records.push(serde_json::from_slice(&value).map_err(depot_store::StoreError::from)?);
        }
        Ok(records)
    }
}
