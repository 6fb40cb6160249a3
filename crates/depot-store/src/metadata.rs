use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use depot_types::{ItemId, ItemRecord, ItemStatus};

use crate::engine::StoreEngine;
use crate::error::StoreError;

const TREE_NAME: &str = "items";

/// Durable per-tenant map of item id to item record, fronted by an
/// in-memory active cache. Write-through: every mutation is persisted to
/// the embedded engine before the cache is updated, so a crash between the
/// two never surfaces a record that isn't durable.
pub struct MetadataStore {
    engine: RwLock<Option<StoreEngine>>,
    path: PathBuf,
    cache: RwLock<HashMap<ItemId, ItemRecord>>,
    pending_index: RwLock<BTreeSet<(DateTime<Utc>, ItemId)>>,
    hydrated: AtomicBool,
}

impl MetadataStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let engine = StoreEngine::open(&path)?;
        Ok(Self {
            engine: RwLock::new(Some(engine)),
            path,
            cache: RwLock::new(HashMap::new()),
            pending_index: RwLock::new(BTreeSet::new()),
            hydrated: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_engine<T>(
        &self,
        f: impl FnOnce(&StoreEngine) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self
            .engine
            .read()
            .map_err(|_| StoreError::Io("metadata store lock poisoned".into()))?;
        let engine = guard
            .as_ref()
            .ok_or_else(|| StoreError::Io("metadata store is mid-rebuild".into()))?;
        f(engine)
    }

    /// Loads every persisted record (pending, processing, failed,
    /// permanently-failed — completed never persists) into the cache, on
    /// first touch only.
    pub fn ensure_hydrated(&self) -> Result<(), StoreError> {
        if self.hydrated.load(Ordering::Acquire) {
            return Ok(());
        }
        let records = self.with_engine(|engine| {
            let tree = engine.tree(TREE_NAME)?;
            let mut records = Vec::new();
            for kv in tree.iter() {
                let (_, value) = kv.map_err(crate::error::classify_sled_error)?;
                let record: ItemRecord = serde_json::from_slice(&value)?;
                records.push(record);
            }
            Ok(records)
        })?;

        let mut cache = self.lock_cache_mut()?;
        let mut index = self.lock_index_mut()?;
        for record in records {
            if record.status == ItemStatus::Pending {
                index.insert((record.created_at, record.item_id.clone()));
            }
            cache.insert(record.item_id.clone(), record);
        }
        self.hydrated.store(true, Ordering::Release);
        Ok(())
    }

    fn lock_cache(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<ItemId, ItemRecord>>, StoreError> {
        self.cache
            .read()
            .map_err(|_| StoreError::Io("metadata cache lock poisoned".into()))
    }

    fn lock_cache_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<ItemId, ItemRecord>>, StoreError> {
        self.cache
            .write()
            .map_err(|_| StoreError::Io("metadata cache lock poisoned".into()))
    }

    fn lock_index_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeSet<(DateTime<Utc>, ItemId)>>, StoreError> {
        self.pending_index
            .write()
            .map_err(|_| StoreError::Io("metadata index lock poisoned".into()))
    }

    fn persist(&self, record: &ItemRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.with_engine(|engine| {
            let tree = engine.tree(TREE_NAME)?;
            tree.insert(record.item_id.as_str().as_bytes(), bytes.clone())
                .map_err(crate::error::classify_sled_error)?;
            tree.flush().map_err(crate::error::classify_sled_error)?;
            Ok(())
        })
    }

    fn persist_remove(&self, item_id: &ItemId) -> Result<bool, StoreError> {
        self.with_engine(|engine| {
            let tree = engine.tree(TREE_NAME)?;
            let existed = tree
                .remove(item_id.as_str().as_bytes())
                .map_err(crate::error::classify_sled_error)?
                .is_some();
            tree.flush().map_err(crate::error::classify_sled_error)?;
            Ok(existed)
        })
    }

    /// Durably writes `record`, then mirrors it into the cache.
    pub fn upsert(&self, record: ItemRecord) -> Result<(), StoreError> {
        self.ensure_hydrated()?;
        self.persist(&record)?;
        let mut cache = self.lock_cache_mut()?;
        let mut index = self.lock_index_mut()?;
        if let Some(previous) = cache.get(&record.item_id) {
            if previous.status == ItemStatus::Pending {
                index.remove(&(previous.created_at, previous.item_id.clone()));
            }
        }
        if record.status == ItemStatus::Pending {
            index.insert((record.created_at, record.item_id.clone()));
        }
        cache.insert(record.item_id.clone(), record);
        Ok(())
    }

    /// Idempotent delete. Returns whether a record existed.
    pub fn remove(&self, item_id: &ItemId) -> Result<bool, StoreError> {
        self.ensure_hydrated()?;
        let existed = self.persist_remove(item_id)?;
        let mut cache = self.lock_cache_mut()?;
        if let Some(record) = cache.remove(item_id) {
            if record.status == ItemStatus::Pending {
                let mut index = self.lock_index_mut()?;
                index.remove(&(record.created_at, record.item_id.clone()));
            }
        }
        Ok(existed)
    }

    pub fn get(&self, item_id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        self.ensure_hydrated()?;
        Ok(self.lock_cache()?.get(item_id).cloned())
    }

    /// Enumerates cached records whose status is not terminal, in
    /// unspecified order.
    pub fn list_non_terminal(&self) -> Result<Vec<ItemRecord>, StoreError> {
        self.ensure_hydrated()?;
        Ok(self
            .lock_cache()?
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }

    /// Enumerates every cached record regardless of status; used by the
    /// reconciler's terminal purge, which must see permanently-failed
    /// records too.
    pub fn list_all(&self) -> Result<Vec<ItemRecord>, StoreError> {
        self.ensure_hydrated()?;
        Ok(self.lock_cache()?.values().cloned().collect())
    }

    /// Atomically finds the pending record of minimum `created_at` eligible
    /// at `now`, transitions it to processing, persists, and mirrors to the
    /// cache. The caller must already hold the tenant mutex.
    pub fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ItemRecord>, StoreError> {
        self.ensure_hydrated()?;
        let candidate = {
            let index = self
                .pending_index
                .read()
                .map_err(|_| StoreError::Io("metadata index lock poisoned".into()))?;
            let cache = self.lock_cache()?;
            index
                .iter()
                .find(|(_, id)| cache.get(id).is_some_and(|r| r.is_claimable(now)))
                .map(|(_, id)| id.clone())
        };
        let Some(item_id) = candidate else {
            return Ok(None);
        };

        let mut record = {
            let cache = self.lock_cache()?;
            cache
                .get(&item_id)
                .cloned()
                .ok_or(StoreError::NotFound)?
        };
        record.status = ItemStatus::Processing;
        record.processing_started_at = Some(now);
        self.persist(&record)?;

        let mut cache = self.lock_cache_mut()?;
        let mut index = self.lock_index_mut()?;
        index.remove(&(record.created_at, record.item_id.clone()));
        cache.insert(record.item_id.clone(), record.clone());
        Ok(Some(record))
    }

    /// Claims up to `n` records. If a persistence failure occurs partway
    /// through, every record claimed so far in this call is reverted back
    /// to pending (both durably and in the cache) before the error is
    /// returned.
    pub fn claim_batch(&self, n: usize, now: DateTime<Utc>) -> Result<Vec<ItemRecord>, StoreError> {
        self.ensure_hydrated()?;
        let mut claimed = Vec::with_capacity(n);
        for _ in 0..n {
            match self.claim_next(now) {
                Ok(Some(record)) => claimed.push(record),
                Ok(None) => break,
                Err(err) => {
                    for mut record in claimed {
                        record.status = ItemStatus::Pending;
                        record.processing_started_at = None;
                        if self.persist(&record).is_ok() {
                            let mut cache = self.lock_cache_mut()?;
                            let mut index = self.lock_index_mut()?;
                            index.insert((record.created_at, record.item_id.clone()));
                            cache.insert(record.item_id.clone(), record);
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(claimed)
    }

    /// For every cached processing record started before `cutoff`: reverts
    /// it to pending and clears its processing/availability markers. Each
    /// record is handled independently; a persistence failure for one
    /// record rolls back only that record's in-memory state.
    pub fn reset_timed_out(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.ensure_hydrated()?;
        let stuck: Vec<ItemRecord> = self
            .lock_cache()?
            .values()
            .filter(|r| {
                r.status == ItemStatus::Processing
                    && r.processing_started_at.is_some_and(|started| started < cutoff)
            })
            .cloned()
            .collect();

        let mut reset_count = 0;
        for mut record in stuck {
            let original = record.clone();
            record.status = ItemStatus::Pending;
            record.processing_started_at = None;
            record.available_at = None;
            match self.persist(&record) {
                Ok(()) => {
                    let mut cache = self.lock_cache_mut()?;
                    let mut index = self.lock_index_mut()?;
                    index.insert((record.created_at, record.item_id.clone()));
                    cache.insert(record.item_id.clone(), record);
                    reset_count += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        item_id = %original.item_id,
                        error = %err,
                        "failed to persist timed-out reset; leaving record in processing"
                    );
                }
            }
        }
        Ok(reset_count)
    }

    /// Takes the engine out for the rebuild flow. The caller (the recovery
    /// service) owns it from this point and must eventually call
    /// [`finish_rebuild`](MetadataStore::finish_rebuild) to restore a
    /// usable store, or the metadata store stays unusable.
    pub fn begin_rebuild(&self) -> Result<StoreEngine, StoreError> {
        let mut guard = self
            .engine
            .write()
            .map_err(|_| StoreError::Io("metadata store lock poisoned".into()))?;
        guard
            .take()
            .ok_or_else(|| StoreError::Io("rebuild already in progress".into()))
    }

    /// Opens a fresh engine at the store's original path, persists the
    /// synthesized records, and replaces the cache wholesale.
    pub fn finish_rebuild(&self, synthesized: Vec<ItemRecord>) -> Result<(), StoreError> {
        let engine = StoreEngine::open(&self.path)?;
        {
            let tree = engine.tree(TREE_NAME)?;
            for record in &synthesized {
                let bytes = serde_json::to_vec(record)?;
                tree.insert(record.item_id.as_str().as_bytes(), bytes)
                    .map_err(crate::error::classify_sled_error)?;
            }
            tree.flush().map_err(crate::error::classify_sled_error)?;
        }

        let mut cache = self.lock_cache_mut()?;
        let mut index = self.lock_index_mut()?;
        cache.clear();
        index.clear();
        for record in synthesized {
            if record.status == ItemStatus::Pending {
                index.insert((record.created_at, record.item_id.clone()));
            }
            cache.insert(record.item_id.clone(), record);
        }
        drop(cache);
        drop(index);
        self.hydrated.store(true, Ordering::Release);

        let mut guard = self
            .engine
            .write()
            .map_err(|_| StoreError::Io("metadata store lock poisoned".into()))?;
        *guard = Some(engine);
        Ok(())
    }

    /// Periodic compaction: rebuilds the on-disk file in place without
    /// touching the cache, unlike [`begin_rebuild`](MetadataStore::begin_rebuild)
    /// / [`finish_rebuild`](MetadataStore::finish_rebuild), which also
    /// resynthesize records from a physical scan. Returns `(size_before,
    /// size_after)`.
    pub fn compact(&self) -> Result<(u64, u64), StoreError> {
        let mut guard = self
            .engine
            .write()
            .map_err(|_| StoreError::Io("metadata store lock poisoned".into()))?;
        let engine = guard
            .take()
            .ok_or_else(|| StoreError::Io("rebuild already in progress".into()))?;
        let (rebuilt, before, after) = engine.compact_in_place()?;
        *guard = Some(rebuilt);
        Ok((before, after))
    }
}
