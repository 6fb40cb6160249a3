use serde::{Deserialize, Serialize};

use crate::ids::VolumeId;

/// Static configuration for one mounted filesystem subtree.
///
/// `sharding_depth` bounds per-directory fan-out: the number of leading
/// 1-2 char hex prefixes of the item id inserted between the tenant root
/// and the byte file. Valid range is 0-3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub volume_id: VolumeId,
    pub mount_path: String,
    pub sharding_depth: u8,
}

/// A point-in-time view of a volume's capacity and health, as reported by
/// the pool's `capacity_snapshot` / volume listing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub total_capacity: u64,
    pub available_space: i64,
    pub healthy: bool,
}
