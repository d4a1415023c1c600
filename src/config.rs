//! Configuration for the catalog page and the offline cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default location of the catalog, relative to the page.
pub const DEFAULT_CATALOG_PATH: &str = "apps.json";

/// Default cache version tag. Changing it invalidates every cached shell asset.
pub const DEFAULT_CACHE_VERSION: &str = "noppo-store-v3";

/// Icon used for entries that do not name one.
pub const DEFAULT_ICON: &str = "icons/icon-192.png";

/// Number of skeleton cards shown before the first catalog resolves.
pub const DEFAULT_SKELETON_COUNT: usize = 6;

/// Default shell assets cached at install time.
pub const DEFAULT_SHELL_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/store.js",
    "/manifest.webmanifest",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
];

/// Settings for fetching and rendering the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path of the catalog JSON, resolved against the page URL.
    pub catalog_path: String,
    /// Number of placeholder cards shown while loading.
    pub skeleton_count: usize,
    /// Icon applied by normalization when an entry has none.
    pub default_icon: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_path: DEFAULT_CATALOG_PATH.to_string(),
            skeleton_count: DEFAULT_SKELETON_COUNT,
            default_icon: DEFAULT_ICON.to_string(),
        }
    }
}

impl CatalogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the catalog path.
    #[must_use]
    pub fn with_catalog_path(mut self, path: impl Into<String>) -> Self {
        self.catalog_path = path.into();
        self
    }

    /// Sets the number of skeleton cards.
    #[must_use]
    pub fn with_skeleton_count(mut self, count: usize) -> Self {
        self.skeleton_count = count;
        self
    }
}

/// Settings for the offline cache worker.
///
/// The version tag and the shell list are deployed together. Nothing detects
/// a shell change that ships under an unchanged tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Worker script registered by the page.
    pub worker_script: String,
    /// Name of the cache bucket owned by the current deployment.
    pub cache_version: String,
    /// Same-origin paths cached at install time.
    pub shell_assets: Vec<String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            worker_script: "sw.js".to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            shell_assets: DEFAULT_SHELL_ASSETS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl OfflineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache version tag.
    #[must_use]
    pub fn with_cache_version(mut self, version: impl Into<String>) -> Self {
        self.cache_version = version.into();
        self
    }

    /// Replaces the shell asset list.
    #[must_use]
    pub fn with_shell_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell_assets = assets.into_iter().map(Into::into).collect();
        self
    }
}

/// Path configuration for the config file and the on-disk cache.
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Directory where `config.toml` is read from.
    pub config_dir: PathBuf,
    /// Directory holding on-disk cache buckets.
    pub cache_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            config_dir: config_dir.join("noppo-store"),
            cache_dir: data_dir.join("noppo-store").join("caches"),
        }
    }
}

impl PathConfig {
    /// Returns the path of the configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// Complete configuration combining catalog and offline settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Catalog settings.
    pub catalog: CatalogConfig,
    /// Offline cache settings.
    pub offline: OfflineConfig,
}

impl StoreConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the TOML is malformed.
    pub fn from_toml_str(s: &str) -> crate::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Loads the configuration from a file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                log::debug!("Loading config from {}", path.display());
                Self::from_toml_str(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Loads the configuration from the default config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&PathConfig::default().config_file())
    }
}
