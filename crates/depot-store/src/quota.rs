use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use depot_types::QuotaRecord;

use crate::engine::StoreEngine;
use crate::error::StoreError;

const TREE_NAME: &str = "quotas";

/// Durable per-tenant map of directory-path to [`QuotaRecord`], sharing the
/// same embedded engine style as [`crate::MetadataStore`]. `try_increment`
/// reads, checks, and persists as separate engine round trips, so it is not
/// atomic on its own: every caller (`StoragePool`, `Scheduler`,
/// `RecoveryService`) must hold the tenant's `depot-tenant::TenantLocks`
/// mutex for the full span of the mutation, not just this call.
pub struct QuotaStore {
    engine: RwLock<StoreEngine>,
    path: PathBuf,
    cache: RwLock<HashMap<String, QuotaRecord>>,
}

impl QuotaStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let engine = StoreEngine::open(&path)?;
        Ok(Self {
            engine: RwLock::new(engine),
            path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_or_create(&self, dir: &str) -> Result<QuotaRecord, StoreError> {
        if let Some(cached) = self
            .cache
            .read()
            .map_err(|_| StoreError::Io("quota cache lock poisoned".into()))?
            .get(dir)
        {
            return Ok(cached.clone());
        }
        let engine = self
            .engine
            .read()
            .map_err(|_| StoreError::Io("quota store lock poisoned".into()))?;
        let tree = engine.tree(TREE_NAME)?;
        match tree.get(dir.as_bytes()).map_err(crate::error::classify_sled_error)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(QuotaRecord::new(dir)),
        }
    }

    fn persist(&self, record: &QuotaRecord) -> Result<(), StoreError> {
        let result = self.persist_attempt(record);
        match result {
            Err(StoreError::Corruption(reason)) => {
                tracing::warn!(directory = %record.directory_path, %reason, "quota store corruption detected, rebuilding in place");
                self.rebuild_in_place()?;
                self.persist_attempt(record)
            }
            other => other,
        }
    }

    fn persist_attempt(&self, record: &QuotaRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        let engine = self
            .engine
            .read()
            .map_err(|_| StoreError::Io("quota store lock poisoned".into()))?;
        let tree = engine.tree(TREE_NAME)?;
        tree.insert(record.directory_path.as_bytes(), bytes)
            .map_err(crate::error::classify_sled_error)?;
        tree.flush().map_err(crate::error::classify_sled_error)?;
        Ok(())
    }

    /// Rebuilds the on-disk quota file from whatever the in-memory cache
    /// still holds. This is a narrower rebuild than the recovery service's
    /// scan-the-physical-tree rebuild — it is the store's own
    /// reflex against a corruption signature surfacing mid-operation, not
    /// a substitute for the operator-triggered full rebuild.
    fn rebuild_in_place(&self) -> Result<(), StoreError> {
        let snapshot: Vec<QuotaRecord> = self
            .cache
            .read()
            .map_err(|_| StoreError::Io("quota cache lock poisoned".into()))?
            .values()
            .cloned()
            .collect();

        let mut guard = self
            .engine
            .write()
            .map_err(|_| StoreError::Io("quota store lock poisoned".into()))?;
        let placeholder = StoreEngine::open(&self.path)?;
        let current = std::mem::replace(&mut *guard, placeholder);
        let (rebuilt, _before, _after) = current.compact_in_place()?;
        *guard = rebuilt;
        drop(guard);

        for record in snapshot {
            self.persist_attempt(&record)?;
        }
        Ok(())
    }

    /// Atomically: load-or-create, refuse if exhausted, else increment and
    /// persist. Returns whether the increment was accepted.
    pub fn try_increment(&self, dir: &str) -> Result<bool, StoreError> {
        let mut record = self.load_or_create(dir)?;
        if record.is_exhausted() {
            return Ok(false);
        }
        record.current_count += 1;
        record.last_updated = Utc::now();
        self.persist(&record)?;
        self.cache
            .write()
            .map_err(|_| StoreError::Io("quota cache lock poisoned".into()))?
            .insert(dir.to_string(), record);
        Ok(true)
    }

    /// Saturating decrement; persists unconditionally.
    pub fn decrement(&self, dir: &str) -> Result<(), StoreError> {
        let mut record = self.load_or_create(dir)?;
        record.current_count = record.current_count.saturating_sub(1);
        record.last_updated = Utc::now();
        self.persist(&record)?;
        self.cache
            .write()
            .map_err(|_| StoreError::Io("quota cache lock poisoned".into()))?
            .insert(dir.to_string(), record);
        Ok(())
    }

    pub fn set_limit(&self, dir: &str, n: u64) -> Result<(), StoreError> {
        let mut record = self.load_or_create(dir)?;
        record.max_count = n;
        record.enabled = n > 0;
        record.last_updated = Utc::now();
        self.persist(&record)?;
        self.cache
            .write()
            .map_err(|_| StoreError::Io("quota cache lock poisoned".into()))?
            .insert(dir.to_string(), record);
        Ok(())
    }

    pub fn get(&self, dir: &str) -> Result<QuotaRecord, StoreError> {
        self.load_or_create(dir)
    }

    /// Periodic compaction (not corruption-triggered): reuses the same
    /// engine-swap mechanics as [`rebuild_in_place`](QuotaStore::rebuild_in_place)
    /// but skips the cache rewrite, since a plain compaction preserves the
    /// tree contents 1:1.
    pub fn compact(&self) -> Result<(u64, u64), StoreError> {
        let mut guard = self
            .engine
            .write()
            .map_err(|_| StoreError::Io("quota store lock poisoned".into()))?;
        let placeholder = StoreEngine::open(&self.path)?;
        let current = std::mem::replace(&mut *guard, placeholder);
        let (rebuilt, before, after) = current.compact_in_place()?;
        *guard = rebuilt;
        Ok((before, after))
    }

    /// Overwrites the quota record for `dir` unconditionally; used by the
    /// recovery service's quota-rebuild step, which recomputes
    /// `current_count` from a scan of the physical tree.
    pub fn rebuild_directory(&self, dir: &str, current_count: u64) -> Result<(), StoreError> {
        let mut record = QuotaRecord::new(dir);
        record.current_count = current_count;
        record.max_count = 0;
        record.enabled = true;
        self.persist(&record)?;
        self.cache
            .write()
            .map_err(|_| StoreError::Io("quota cache lock poisoned".into()))?
            .insert(dir.to_string(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = QuotaStore::open(dir.path().join("t1-quotas.db")).unwrap();
        store.set_limit("t1/root", 2).unwrap();
        assert!(store.try_increment("t1/root").unwrap());
        assert!(store.try_increment("t1/root").unwrap());
        assert!(!store.try_increment("t1/root").unwrap());
    }

    #[test]
    fn disabled_limit_is_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        let store = QuotaStore::open(dir.path().join("t1-quotas.db")).unwrap();
        for _ in 0..10 {
            assert!(store.try_increment("t1/root").unwrap());
        }
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = QuotaStore::open(dir.path().join("t1-quotas.db")).unwrap();
        store.decrement("t1/root").unwrap();
        assert_eq!(store.get("t1/root").unwrap().current_count, 0);
    }
}
