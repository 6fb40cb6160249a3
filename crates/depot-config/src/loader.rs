use std::env;
use std::path::{Path, PathBuf};

use crate::{ConfigError, DepotConfig, Paths};

/// Builder that loads a [`DepotConfig`] from, in precedence order
/// (each source overrides the one before it):
///
/// 1. Built-in defaults
/// 2. The user config file (XDG config dir / `config.toml`)
/// 3. The project config file (`<project_dir>/depot.toml`)
/// 4. The local override file (`<project_dir>/depot.local.toml`, gitignored)
/// 5. Environment variables prefixed `DEPOT_`
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "DEPOT".to_string(),
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(self) -> Result<DepotConfig, ConfigError> {
        let mut builder = config::Config::builder();

        let defaults = DepotConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build()?;
        let mut depot_config: DepotConfig = built.try_deserialize()?;
        depot_config.resolve_paths(&self.project_dir);
        Ok(depot_config)
    }

    /// Loads configuration, falling back to defaults on any error (missing
    /// files are already tolerated by `load`; this additionally swallows
    /// malformed env/file parse errors for callers that would rather run
    /// with defaults than fail startup).
    pub fn load_or_default(self) -> DepotConfig {
        let project_dir = self.project_dir.clone();
        self.load().unwrap_or_else(|_| {
            let mut config = DepotConfig::default();
            config.resolve_paths(&project_dir);
            config
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_defaults_when_no_files_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .with_project_dir(dir.path())
            .load()
            .unwrap();
        assert_eq!(config.retry.max, 5);
        assert!(config.volumes.is_empty());
    }

    #[test]
    fn project_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("depot.toml"),
            r#"
auto_create_tenants = true

[retry]
max = 10
"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(dir.path())
            .load()
            .unwrap();
        assert!(config.auto_create_tenants);
        assert_eq!(config.retry.max, 10);
    }

    #[test]
    fn local_override_wins_over_project_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("depot.toml"), "processing_timeout_secs = 60\n").unwrap();
        fs::write(
            dir.path().join("depot.local.toml"),
            "processing_timeout_secs = 5\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(dir.path())
            .load()
            .unwrap();
        assert_eq!(config.processing_timeout_secs, 5);
    }

    #[test]
    fn relative_roots_are_resolved_against_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .with_project_dir(dir.path())
            .load()
            .unwrap();
        assert!(config.metadata_root.is_absolute());
        assert!(config.quota_root.is_absolute());
    }
}
