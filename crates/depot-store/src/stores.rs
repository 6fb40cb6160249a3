use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use depot_types::TenantId;

use crate::error::StoreError;
use crate::metadata::MetadataStore;
use crate::quota::QuotaStore;

/// Lazily opens and caches each tenant's metadata and quota stores,
/// implementing the "created lazily on first reference, torn down on
/// shutdown" lifetime rule. Every other subsystem (scheduler, pool,
/// reconciler, recovery service) shares one `TenantStores` instance rather
/// than opening its own handles.
pub struct TenantStores {
    metadata_root: PathBuf,
    quota_root: PathBuf,
    metadata: RwLock<HashMap<TenantId, Arc<MetadataStore>>>,
    quota: RwLock<HashMap<TenantId, Arc<QuotaStore>>>,
}

impl TenantStores {
    pub fn new(metadata_root: impl Into<PathBuf>, quota_root: impl Into<PathBuf>) -> Self {
        Self {
            metadata_root: metadata_root.into(),
            quota_root: quota_root.into(),
            metadata: RwLock::new(HashMap::new()),
            quota: RwLock::new(HashMap::new()),
        }
    }

    /// On-disk path of a tenant's metadata store, per the configured layout
    /// (`<metadata_root>/<tenant_id>.db`). Exposed for the recovery
    /// service, which must back up and wipe the file directly when
    /// corruption surfaces before a live handle can even be opened.
    pub fn metadata_path(&self, tenant_id: &TenantId) -> PathBuf {
        self.metadata_root.join(format!("{tenant_id}.db"))
    }

    /// On-disk path of a tenant's quota store (`<quota_root>/<tenant_id>-quotas.db`).
    pub fn quota_path(&self, tenant_id: &TenantId) -> PathBuf {
        self.quota_root.join(format!("{tenant_id}-quotas.db"))
    }

    pub fn metadata_store(&self, tenant_id: &TenantId) -> Result<Arc<MetadataStore>, StoreError> {
        if let Some(store) = self
            .metadata
            .read()
            .map_err(|_| StoreError::Io("tenant store registry poisoned".into()))?
            .get(tenant_id)
        {
            return Ok(store.clone());
        }
        let store = Arc::new(MetadataStore::open(self.metadata_path(tenant_id))?);
        self.metadata
            .write()
            .map_err(|_| StoreError::Io("tenant store registry poisoned".into()))?
            .insert(tenant_id.clone(), store.clone());
        Ok(store)
    }

    pub fn quota_store(&self, tenant_id: &TenantId) -> Result<Arc<QuotaStore>, StoreError> {
        if let Some(store) = self
            .quota
            .read()
            .map_err(|_| StoreError::Io("tenant store registry poisoned".into()))?
            .get(tenant_id)
        {
            return Ok(store.clone());
        }
        let store = Arc::new(QuotaStore::open(self.quota_path(tenant_id))?);
        self.quota
            .write()
            .map_err(|_| StoreError::Io("tenant store registry poisoned".into()))?
            .insert(tenant_id.clone(), store.clone());
        Ok(store)
    }

    /// Evicts both handles for a tenant, e.g. before a corruption rebuild
    /// or store compaction reopens them fresh.
    pub fn evict(&self, tenant_id: &TenantId) -> Result<(), StoreError> {
        self.metadata
            .write()
            .map_err(|_| StoreError::Io("tenant store registry poisoned".into()))?
            .remove(tenant_id);
        self.quota
            .write()
            .map_err(|_| StoreError::Io("tenant store registry poisoned".into()))?
            .remove(tenant_id);
        Ok(())
    }

    /// Every tenant id with a currently-open metadata store handle; used by
    /// the reconciler to enumerate tenants without consulting the tenant
    /// registry (a store can be open for a tenant the registry no longer
    /// lists as enabled, and still needs sweeping).
    pub fn known_tenants(&self) -> Vec<TenantId> {
        self.metadata
            .read()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_caches_per_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let stores = TenantStores::new(dir.path().join("meta"), dir.path().join("quota"));
        let tenant = TenantId::new("t1");
        let a = stores.metadata_store(&tenant).unwrap();
        let b = stores.metadata_store(&tenant).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn evict_forces_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let stores = TenantStores::new(dir.path().join("meta"), dir.path().join("quota"));
        let tenant = TenantId::new("t1");
        let a = stores.metadata_store(&tenant).unwrap();
        stores.evict(&tenant).unwrap();
        let b = stores.metadata_store(&tenant).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
