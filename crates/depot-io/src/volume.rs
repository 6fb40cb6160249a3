use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use bytes::Bytes;
use depot_types::{ItemId, TenantId, VolumeConfig, VolumeId, VolumeInfo};

use crate::error::VolumeError;
use crate::path::{extension_of, relative_physical_path, resolve_under_root};

/// A byte-level read/write/delete surface over one mounted filesystem
/// subtree. Capacity and health are tracked in-memory: `available_space`
/// is adjusted on every write/delete rather than re-statted from the
/// filesystem on every call, and `healthy` is refreshed by [`probe_health`].
///
/// [`probe_health`]: Volume::probe_health
#[derive(Debug)]
pub struct Volume {
    config: VolumeConfig,
    total_capacity: u64,
    available_space: AtomicI64,
    healthy: AtomicBool,
}

impl Volume {
    /// Constructs a volume marked unhealthy until the first successful
    /// [`probe_health`](Volume::probe_health) call, per the admission
    /// stabilizing window in the storage pool.
    pub fn new(config: VolumeConfig, total_capacity: u64) -> Self {
        Self {
            config,
            total_capacity,
            available_space: AtomicI64::new(total_capacity as i64),
            healthy: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &VolumeId {
        &self.config.volume_id
    }

    pub fn mount_root(&self) -> &Path {
        Path::new(&self.config.mount_path)
    }

    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn available_space(&self) -> i64 {
        self.available_space.load(Ordering::Acquire)
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            total_capacity: self.total_capacity,
            available_space: self.available_space(),
            healthy: self.healthy(),
        }
    }

    /// Probes the mount by writing, reading, and removing a small canary
    /// file. Used both at pool-admission time (repeatedly, for the
    /// stabilizing window) and by the reconciler's periodic sweep.
    pub fn probe_health(&self) -> bool {
        let canary = self.mount_root().join(".depot-health-probe");
        let ok = fs::create_dir_all(self.mount_root())
            .and_then(|()| fs::write(&canary, b"ok"))
            .and_then(|()| fs::read(&canary))
            .and_then(|_| fs::remove_file(&canary))
            .is_ok();
        self.healthy.store(ok, Ordering::Release);
        ok
    }

    fn resolve(&self, relative: &Path) -> Result<PathBuf, VolumeError> {
        resolve_under_root(self.mount_root(), relative)
    }

    /// Computes the relative physical path an item will be written to.
    pub fn physical_path_for(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
        original_name: Option<&str>,
    ) -> Result<PathBuf, VolumeError> {
        let ext = extension_of(original_name)?;
        relative_physical_path(tenant_id, item_id, &ext, self.config.sharding_depth)
    }

    /// Writes `data` to `relative`, creating parent directories idempotently.
    /// On any failure the partial file, if created, is unlinked before
    /// returning.
    pub fn write(&self, relative: &Path, data: &[u8]) -> Result<PathBuf, VolumeError> {
        if !self.healthy() {
            return Err(VolumeError::Unhealthy);
        }
        if self.available_space() <= 0 {
            return Err(VolumeError::InsufficientStorage);
        }
        let absolute = self.resolve(relative)?;
        let result = (|| -> Result<(), VolumeError> {
            if let Some(parent) = absolute.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&absolute, data)?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.available_space
                    .fetch_sub(data.len() as i64, Ordering::AcqRel);
                Ok(absolute)
            }
            Err(err) => {
                let _ = fs::remove_file(&absolute);
                Err(err)
            }
        }
    }

    pub fn read(&self, relative: &Path) -> Result<Bytes, VolumeError> {
        let absolute = self.resolve(relative)?;
        Ok(Bytes::from(fs::read(absolute)?))
    }

    /// Idempotent delete; returns whether a file existed at that path.
    pub fn delete(&self, relative: &Path) -> Result<bool, VolumeError> {
        let absolute = self.resolve(relative)?;
        let size = fs::metadata(&absolute).map(|m| m.len()).ok();
        match fs::remove_file(&absolute) {
            Ok(()) => {
                if let Some(size) = size {
                    self.available_space
                        .fetch_add(size as i64, Ordering::AcqRel);
                }
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn exists(&self, relative: &Path) -> Result<bool, VolumeError> {
        let absolute = self.resolve(relative)?;
        Ok(absolute.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_types::VolumeId;

    fn volume(dir: &std::path::Path) -> Volume {
        let v = Volume::new(
            VolumeConfig {
                volume_id: VolumeId::new("v1"),
                mount_path: dir.to_string_lossy().into_owned(),
                sharding_depth: 1,
            },
            1_000_000,
        );
        assert!(v.probe_health());
        v
    }

    #[test]
    fn write_read_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let v = volume(dir.path());
        let tenant = TenantId::new("t1");
        let item = ItemId::generate();
        let rel = v.physical_path_for(&tenant, &item, Some("x.txt")).unwrap();

        v.write(&rel, b"hello").unwrap();
        assert!(v.exists(&rel).unwrap());
        assert_eq!(&v.read(&rel).unwrap()[..], b"hello");
        assert!(v.delete(&rel).unwrap());
        assert!(!v.exists(&rel).unwrap());
        assert!(!v.delete(&rel).unwrap());
    }

    #[test]
    fn write_rejects_when_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let v = Volume::new(
            VolumeConfig {
                volume_id: VolumeId::new("v1"),
                mount_path: dir.path().to_string_lossy().into_owned(),
                sharding_depth: 0,
            },
            1_000,
        );
        let tenant = TenantId::new("t1");
        let item = ItemId::generate();
        let rel = v.physical_path_for(&tenant, &item, None).unwrap();
        assert!(matches!(v.write(&rel, b"x"), Err(VolumeError::Unhealthy)));
    }

    #[test]
    fn available_space_tracks_writes_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let v = volume(dir.path());
        let before = v.available_space();
        let tenant = TenantId::new("t1");
        let item = ItemId::generate();
        let rel = v.physical_path_for(&tenant, &item, None).unwrap();
        v.write(&rel, b"12345").unwrap();
        assert_eq!(v.available_space(), before - 5);
        v.delete(&rel).unwrap();
        assert_eq!(v.available_space(), before);
    }
}
