use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{classify_sled_error, StoreError};

/// Thin wrapper over the embedded keyed engine for one per-tenant store
/// file: atomic upsert/delete, and an in-place rebuild.
///
/// Uses `sled` because it surfaces [`sled::Error::Corruption`] as a
/// distinct variant from I/O errors, and because `export`/`import` gives a
/// direct implementation of "ask the embedded engine to rebuild the
/// on-disk file in place".
pub struct StoreEngine {
    db: sled::Db,
    path: PathBuf,
}

impl StoreEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let db = sled::open(&path).map_err(classify_sled_error)?;
        Ok(Self { db, path })
    }

    pub fn tree(&self, name: &str) -> Result<sled::Tree, StoreError> {
        self.db.open_tree(name).map_err(classify_sled_error)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map(|_| ()).map_err(classify_sled_error)
    }

    pub fn size_on_disk(&self) -> Result<u64, StoreError> {
        self.db.size_on_disk().map_err(classify_sled_error)
    }

    /// Rebuilds the on-disk store in place: exports every tree into a fresh
    /// database at a sibling temp path, then swaps it over the original.
    /// Returns `(size_before, size_after)`.
    pub fn compact_in_place(self) -> Result<(Self, u64, u64), StoreError> {
        let size_before = self.size_on_disk().unwrap_or(0);
        let export = self.db.export();

        let temp_path = sibling_path(&self.path, ".compacting");
        let _ = fs::remove_dir_all(&temp_path);
        let fresh = sled::open(&temp_path).map_err(classify_sled_error)?;
        fresh.import(export);
        fresh.flush().map_err(classify_sled_error)?;

        drop(self.db);
        drop(fresh);

        fs::remove_dir_all(&self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&temp_path, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;

        let reopened = Self::open(&self.path)?;
        let size_after = reopened.size_on_disk().unwrap_or(0);
        Ok((reopened, size_before, size_after))
    }

    /// Copies the on-disk store to a forensic backup path and deletes the
    /// original, as the first two steps of the rebuild-from-scan protocol.
    /// Consumes `self`: the caller must not touch the store again.
    pub fn backup_and_delete(self, backup_suffix: &str) -> Result<PathBuf, StoreError> {
        drop(self.db);
        let backup_path = sibling_path(&self.path, backup_suffix);
        copy_dir_recursive(&self.path, &backup_path).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::remove_dir_all(&self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(backup_path)
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    path.with_file_name(name)
}

fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
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
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t1.db");
        let engine = StoreEngine::open(&path).unwrap();
        assert!(engine.tree("items").is_ok());
    }

    #[test]
    fn compact_in_place_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.db");
        let engine = StoreEngine::open(&path).unwrap();
        let tree = engine.tree("items").unwrap();
        tree.insert(b"k1", b"v1").unwrap();
        tree.flush().unwrap();

        let (engine, _before, _after) = engine.compact_in_place().unwrap();
        let tree = engine.tree("items").unwrap();
        assert_eq!(tree.get(b"k1").unwrap().as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn backup_and_delete_preserves_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.db");
        let engine = StoreEngine::open(&path).unwrap();
        let tree = engine.tree("items").unwrap();
        tree.insert(b"k1", b"v1").unwrap();
        tree.flush().unwrap();

        let backup = engine.backup_and_delete(".corrupted.20260101000000").unwrap();
        assert!(backup.exists());
        assert!(!path.exists());
    }
}
