//! # depot-config: layered configuration loading
//!
//! Produces a single [`DepotConfig`] tree from defaults, a user config file,
//! a project config file, a local override file, and `DEPOT_`-prefixed
//! environment variables, in that precedence order (later sources win).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// One `[[volumes]]` entry: a mounted filesystem subtree the pool may
/// write to, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeEntry {
    pub id: String,
    pub mount_path: PathBuf,
    #[serde(default = "default_sharding_depth")]
    pub sharding_depth: u8,
    #[serde(default = "default_total_capacity")]
    pub total_capacity: u64,
}

fn default_sharding_depth() -> u8 {
    2
}

fn default_total_capacity() -> u64 {
    100 * 1024 * 1024 * 1024
}

/// Failure scheduling: the `retry.*` option group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max: u32,
    pub initial_delay_ms: u64,
    pub exponential: bool,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max: 5,
            initial_delay_ms: 100,
            exponential: true,
            max_delay_ms: 10_000,
        }
    }
}

/// A pre-seeded tenant entry from `tenants[]`, plus its optional
/// `default_tenant_quota` override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSeed {
    pub tenant_id: String,
    pub storage_path: String,
    #[serde(default)]
    pub quota: Option<u64>,
}

/// `connection_mode` passed through to the embedded store engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    Shared,
    Direct,
}

impl Default for ConnectionMode {
    fn default() -> Self {
        Self::Shared
    }
}

/// `store_engine` options, passed through verbatim to the embedded engine
/// rather than interpreted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreEngineSettings {
    pub journal_on: bool,
    pub checkpoint_n_tx: u32,
    pub lock_timeout_sec: u64,
    pub connection_mode: ConnectionMode,
}

impl Default for StoreEngineSettings {
    fn default() -> Self {
        Self {
            journal_on: true,
            checkpoint_n_tx: 1000,
            lock_timeout_sec: 10,
            connection_mode: ConnectionMode::Shared,
        }
    }
}

/// The complete configuration tree the core subsystems are built from.
/// Every field here corresponds to a named, documented configuration
/// option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    pub volumes: Vec<VolumeEntry>,
    pub metadata_root: PathBuf,
    pub quota_root: PathBuf,
    pub retry: RetrySettings,
    pub processing_timeout_secs: u64,
    pub failed_retention_secs: u64,
    pub completed_retention_secs: u64,
    pub cleanup_interval_secs: u64,
    pub cleanup_initial_delay_secs: u64,
    pub compaction_enabled: bool,
    pub compaction_interval_secs: u64,
    pub health_check_enabled: bool,
    pub auto_recover: bool,
    pub fail_fast: bool,
    pub default_tenant_quota: u64,
    pub tenants: Vec<TenantSeed>,
    pub auto_create_tenants: bool,
    pub store_engine: StoreEngineSettings,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            metadata_root: PathBuf::from(".depot/metadata"),
            quota_root: PathBuf::from(".depot/quota"),
            retry: RetrySettings::default(),
            processing_timeout_secs: 5 * 60,
            failed_retention_secs: 7 * 24 * 60 * 60,
            completed_retention_secs: 7 * 24 * 60 * 60,
            cleanup_interval_secs: 60,
            cleanup_initial_delay_secs: 10,
            compaction_enabled: true,
            compaction_interval_secs: 24 * 60 * 60,
            health_check_enabled: true,
            auto_recover: true,
            fail_fast: false,
            default_tenant_quota: 0,
            tenants: Vec::new(),
            auto_create_tenants: false,
            store_engine: StoreEngineSettings::default(),
        }
    }
}

impl DepotConfig {
    /// Loads configuration from default locations, rooted at the current
    /// directory.
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Loads configuration rooted at a specific project directory.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Resolves `metadata_root`/`quota_root` and every volume's
    /// `mount_path` to absolute paths under `base_dir`, if relative.
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        if self.metadata_root.is_relative() {
            self.metadata_root = base.join(&self.metadata_root);
        }
        if self.quota_root.is_relative() {
            self.quota_root = base.join(&self.quota_root);
        }
        for volume in &mut self.volumes {
            if volume.mount_path.is_relative() {
                volume.mount_path = base.join(&volume.mount_path);
            }
        }
    }
}
