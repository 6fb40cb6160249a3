use std::path::{Component, Path, PathBuf};

use depot_types::{ItemId, TenantId};

use crate::error::VolumeError;

/// Rejects any component that is a traversal segment or otherwise escapes
/// the literal name it claims to be (embedded separators, empty, `.`/`..`).
pub fn sanitize_component(component: &str) -> Result<(), VolumeError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('/')
        || component.contains('\\')
    {
        return Err(VolumeError::InvalidComponent {
            component: component.to_string(),
        });
    }
    Ok(())
}

/// Extracts a filesystem-safe extension (including the leading dot) from an
/// optional caller-supplied name, or an empty string if there is none.
pub fn extension_of(original_name: Option<&str>) -> Result<String, VolumeError> {
    let Some(name) = original_name else {
        return Ok(String::new());
    };
    sanitize_component(name)?;
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => Ok(format!(".{ext}")),
        _ => Ok(String::new()),
    }
}

/// Builds the relative (mount-root-relative) physical path for an item:
/// `<tenant_id>/<shard_1>/<shard_2>/.../<item_id><ext>`.
///
/// `sharding_depth` (0-3) is the number of leading shard directories, each a
/// 2-hex-char prefix slice of the item id, inserted to bound per-directory
/// fan-out.
pub fn relative_physical_path(
    tenant_id: &TenantId,
    item_id: &ItemId,
    extension: &str,
    sharding_depth: u8,
) -> Result<PathBuf, VolumeError> {
    sanitize_component(tenant_id.as_str())?;
    let depth = sharding_depth.min(3) as usize;
    let id = item_id.as_str();

    let mut path = PathBuf::from(tenant_id.as_str());
    for level in 0..depth {
        let start = level * 2;
        let end = (start + 2).min(id.len());
        if start >= id.len() {
            break;
        }
        path.push(&id[start..end]);
    }
    path.push(format!("{id}{extension}"));
    Ok(path)
}

/// Resolves `relative` against `mount_root`, rejecting any path that would
/// not remain lexically under the root (defense in depth alongside
/// per-component sanitization upstream).
pub fn resolve_under_root(mount_root: &Path, relative: &Path) -> Result<PathBuf, VolumeError> {
    for component in relative.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(VolumeError::PathEscapesRoot {
                    path: relative.to_path_buf(),
                });
            }
        }
    }
    Ok(mount_root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_components() {
        assert!(sanitize_component("..").is_err());
        assert!(sanitize_component(".").is_err());
        assert!(sanitize_component("a/b").is_err());
        assert!(sanitize_component("").is_err());
        assert!(sanitize_component("ok-name").is_ok());
    }

    #[test]
    fn builds_sharded_path() {
        let tenant = TenantId::new("t1");
        let item = ItemId::from("abcd1234ef0011223344556677889900".to_string());
        let path = relative_physical_path(&tenant, &item, ".txt", 2).unwrap();
        assert_eq!(
            path,
            PathBuf::from("t1/ab/cd/abcd1234ef0011223344556677889900.txt")
        );
    }

    #[test]
    fn zero_depth_has_no_shards() {
        let tenant = TenantId::new("t1");
        let item = ItemId::from("abcd1234ef0011223344556677889900".to_string());
        let path = relative_physical_path(&tenant, &item, "", 0).unwrap();
        assert_eq!(path, PathBuf::from("t1/abcd1234ef0011223344556677889900"));
    }

    #[test]
    fn resolve_rejects_escaping_paths() {
        let root = Path::new("/mnt/v1");
        let escaping = PathBuf::from("../../etc/passwd");
        assert!(resolve_under_root(root, &escaping).is_err());
    }

    #[test]
    fn extension_preserved_from_original_name() {
        assert_eq!(extension_of(Some("report.CSV")).unwrap(), ".CSV");
        assert_eq!(extension_of(None).unwrap(), "");
        assert_eq!(extension_of(Some("noext")).unwrap(), "");
    }
}
