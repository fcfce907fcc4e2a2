//! Configuration management for Shipyard

pub mod schema;

pub use schema::Config;

use crate::error::{ShipyardError, ShipyardResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = "shipyard.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Pick the config path: explicit path, then `shipyard.toml` in `cwd`,
    /// then the user config directory
    pub fn discover(explicit: Option<PathBuf>, cwd: &Path) -> Self {
        if let Some(path) = explicit {
            return Self::with_path(path);
        }

        let local = cwd.join(LOCAL_CONFIG_FILE);
        if local.is_file() {
            debug!("Found local config: {}", local.display());
            return Self::with_path(local);
        }

        Self::new()
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shipyard")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> ShipyardResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ShipyardResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ShipyardError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ShipyardError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> ShipyardResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            ShipyardError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> ShipyardResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ShipyardError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.caches.deps, "app-deps");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.caches.prefix = "ci-".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.caches.prefix, "ci-");
    }

    #[tokio::test]
    async fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[caches\nprefix = 1").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        match err {
            ShipyardError::ConfigInvalid { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn discover_prefers_explicit_then_local() {
        let temp = TempDir::new().unwrap();
        let explicit = temp.path().join("custom.toml");

        let manager = ConfigManager::discover(Some(explicit.clone()), temp.path());
        assert_eq!(manager.path(), explicit.as_path());

        std::fs::write(temp.path().join(LOCAL_CONFIG_FILE), "").unwrap();
        let manager = ConfigManager::discover(None, temp.path());
        assert_eq!(manager.path(), temp.path().join(LOCAL_CONFIG_FILE).as_path());
    }
}
