use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved directory-path key under which a tenant-wide quota is modeled.
pub const TENANT_WIDE_KEY: &str = "__tenant__";

/// `(directory_path, current_count, max_count, enabled)` plus bookkeeping.
///
/// `max_count = 0` means unlimited; `enabled = false` bypasses enforcement
/// entirely regardless of `max_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub directory_path: String,
    pub current_count: u64,
    pub max_count: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn new(directory_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            directory_path: directory_path.into(),
            current_count: 0,
            max_count: 0,
            enabled: false,
            created_at: now,
            last_updated: now,
        }
    }

    /// Whether incrementing would breach the limit.
    pub fn is_exhausted(&self) -> bool {
        self.enabled && self.max_count > 0 && self.current_count >= self.max_count
    }
}
