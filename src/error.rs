//! Error types for the noppo-store library.

use thiserror::Error;

/// Errors that can occur while rendering the store or running the offline cache.
#[derive(Error, Debug)]
pub enum Error {
    /// The catalog could not be fetched or parsed.
    ///
    /// The page recovers from this by rendering the sample entry.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The manual offline-cache refresh failed.
    #[error("Cache refresh failed: {0}")]
    CacheRefreshFailed(String),

    /// The host rejected the worker registration at startup.
    #[error("Service worker registration failed: {0}")]
    ServiceWorkerRegistrationFailed(String),

    /// A shell asset could not be fetched during install.
    #[error("Shell asset fetch failed: {url}: {reason}")]
    ShellAssetFetchFailed {
        /// URL of the asset that failed.
        url: String,
        /// Status or transport failure description.
        reason: String,
    },

    /// A network request failed without an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// A relative path could not be resolved into a URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error in the on-disk cache store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// A specialized `Result` type for noppo-store operations.
pub type Result<T> = std::result::Result<T, Error>;
