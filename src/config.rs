//! Configuration types for the cache reconciler and the command-line driver.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::Origin;

/// Names and limits used by the cache reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Long-lived namespace served to fetch requests.
    pub content_cache: String,
    /// Transient namespace filled during install.
    pub staging_cache: String,
    /// Namespace holding the last activated manifest.
    pub manifest_cache: String,
    /// Sentinel key the manifest is stored under, resolved against the origin.
    pub manifest_key: String,
    /// Maximum number of network fetches in flight during install and offline download.
    pub concurrent_fetches: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            content_cache: "app-cache".to_string(),
            staging_cache: "app-temp-cache".to_string(),
            manifest_cache: "app-manifest".to_string(),
            manifest_key: "manifest".to_string(),
            concurrent_fetches: 8,
        }
    }
}

impl ReconcilerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the content namespace name.
    #[must_use]
    pub fn with_content_cache(mut self, name: impl Into<String>) -> Self {
        self.content_cache = name.into();
        self
    }

    /// Sets the staging namespace name.
    #[must_use]
    pub fn with_staging_cache(mut self, name: impl Into<String>) -> Self {
        self.staging_cache = name.into();
        self
    }

    /// Sets the manifest record namespace name.
    #[must_use]
    pub fn with_manifest_cache(mut self, name: impl Into<String>) -> Self {
        self.manifest_cache = name.into();
        self
    }

    /// Sets the number of concurrent network fetches.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Returns the three namespace names in wipe order.
    #[must_use]
    pub fn namespaces(&self) -> [&str; 3] {
        [
            self.content_cache.as_str(),
            self.staging_cache.as_str(),
            self.manifest_cache.as_str(),
        ]
    }

    /// Checks that the namespaces are distinct and the limits usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.concurrent_fetches == 0 {
            return Err(Error::Config(
                "concurrent_fetches must be greater than zero".to_string(),
            ));
        }
        if self.manifest_key.is_empty() {
            return Err(Error::Config("manifest_key must not be empty".to_string()));
        }
        let names: HashSet<&str> = self.namespaces().into_iter().collect();
        if names.len() != 3 || names.contains("") {
            return Err(Error::Config(
                "cache namespace names must be non-empty and distinct".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locations of the disk store, the asset manifest and the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding one subdirectory per cache namespace.
    pub store_dir: PathBuf,
    /// JSON asset manifest describing resources and the core set.
    pub manifest_path: PathBuf,
    /// Directory where `config.toml` is read from.
    pub config_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            store_dir: Self::default_store_dir(),
            manifest_path: PathBuf::from("asset-manifest.json"),
            config_dir: config_dir.join("shell-cache"),
        }
    }
}

impl PathConfig {
    /// Returns the default store directory.
    ///
    /// Uses `SHELL_CACHE_STORE` when set, falling back to
    /// `$XDG_DATA_HOME/shell-cache/caches`.
    #[must_use]
    pub fn default_store_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("SHELL_CACHE_STORE") {
            PathBuf::from(dir)
        } else {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("shell-cache")
                .join("caches")
        }
    }

    /// Returns the path of the TOML config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// Complete application configuration for the command-line driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Origin the application shell is served from.
    pub origin: String,
    /// Reconciler settings.
    pub reconciler: ReconcilerConfig,
    /// Path settings.
    pub paths: PathConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            reconciler: ReconcilerConfig::default(),
            paths: PathConfig::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the default config file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = PathConfig::default().config_file();
        if path.exists() {
            Self::load_from(&path)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the configured origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the origin is not an absolute http(s) URL.
    pub fn origin(&self) -> Result<Origin> {
        Origin::parse(&self.origin)
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<()> {
        self.origin()?;
        self.reconciler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_reconciler_config() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.content_cache, "app-cache");
        assert_eq!(config.staging_cache, "app-temp-cache");
        assert_eq!(config.manifest_cache, "app-manifest");
        assert_eq!(config.manifest_key, "manifest");
        assert_eq!(config.concurrent_fetches, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reconciler_config_builder_pattern() {
        let config = ReconcilerConfig::new()
            .with_content_cache("c")
            .with_staging_cache("s")
            .with_manifest_cache("m")
            .with_concurrent_fetches(2);

        assert_eq!(config.namespaces(), ["c", "s", "m"]);
        assert_eq!(config.concurrent_fetches, 2);
    }

    #[test]
    fn rejects_duplicate_namespaces() {
        let config = ReconcilerConfig::new().with_staging_cache("app-cache");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let config = ReconcilerConfig::new().with_concurrent_fetches(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn reconciler_config_serializes_to_toml() {
        let config = ReconcilerConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: ReconcilerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "origin = \"https://app.example.com\"\n\n[reconciler]\ncontent_cache = \"shell-v2\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.origin, "https://app.example.com");
        assert_eq!(config.reconciler.content_cache, "shell-v2");
        assert_eq!(config.reconciler.staging_cache, "app-temp-cache");
    }

    #[test]
    fn load_rejects_bad_origin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "origin = \"not a url\"\n").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn default_path_config() {
        let config = PathConfig::default();
        assert_eq!(config.manifest_path, PathBuf::from("asset-manifest.json"));
        assert!(config.config_file().ends_with("config.toml"));
    }
}
