//! Offline cache worker.
//!
//! The host owns the *installing → waiting → active* lifecycle and calls the
//! three [`WorkerLifecycle`] handlers. [`OfflineCacheController`] implements
//! them over a [`CacheStore`]:
//!
//! - install caches the shell assets under the current version tag,
//! - activate deletes every bucket with another name,
//! - fetch answers same-origin requests cache-first.

mod disk;
mod store;

pub use disk::DiskCacheStore;
pub use store::{CacheStore, MemoryCacheStore, cache_key};

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Url;
use tokio::sync::Mutex;

use crate::config::OfflineConfig;
use crate::error::{Error, Result};
use crate::net::{self, HttpFetch, Request, Response};

/// Lifecycle phase as observed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerPhase {
    /// No handler has run yet.
    #[default]
    Parsed,
    /// The install handler is populating the cache.
    Installing,
    /// Installed; waiting for activation.
    Waiting,
    /// The activate handler is cleaning up old buckets.
    Activating,
    /// Active and serving fetches.
    Active,
    /// Install failed. The host will retry with a fresh worker.
    Redundant,
}

/// Host capabilities available to the lifecycle handlers.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Lets an installed worker activate without waiting for old pages to close.
    async fn skip_waiting(&self) -> Result<()>;

    /// Takes control of pages already open in scope.
    async fn claim_clients(&self) -> Result<()>;
}

/// How a fetch was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from a cache bucket; the network was not touched.
    Cached(Response),
    /// Cache miss; fetched live and not written back.
    Network(Response),
    /// Cross-origin request left to the host's default handling.
    Passthrough,
}

impl FetchOutcome {
    /// Returns the response, if the worker answered the request.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Cached(r) | Self::Network(r) => Some(r),
            Self::Passthrough => None,
        }
    }
}

/// The three lifecycle handlers of a worker.
#[async_trait]
pub trait WorkerLifecycle: Send + Sync {
    /// Handles the install event.
    async fn on_install(&self, host: &dyn WorkerHost) -> Result<()>;

    /// Handles the activate event.
    async fn on_activate(&self, host: &dyn WorkerHost) -> Result<()>;

    /// Handles a fetch event.
    async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome>;
}

/// Cache-first offline controller with name-based versioning.
pub struct OfflineCacheController<S: CacheStore, N: HttpFetch> {
    origin: Url,
    config: OfflineConfig,
    store: S,
    network: N,
    phase: Mutex<WorkerPhase>,
}

impl<S: CacheStore, N: HttpFetch> OfflineCacheController<S, N> {
    /// Creates a controller for the worker served from `origin`.
    #[must_use]
    pub fn new(origin: Url, config: OfflineConfig, store: S, network: N) -> Self {
        Self {
            origin,
            config,
            store,
            network,
            phase: Mutex::new(WorkerPhase::default()),
        }
    }

    /// Returns the current version tag.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.config.cache_version
    }

    /// Returns a reference to the cache store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the phase last entered.
    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.lock().await
    }

    async fn set_phase(&self, phase: WorkerPhase) {
        log::debug!("Worker {} -> {phase:?}", self.config.cache_version);
        *self.phase.lock().await = phase;
    }

    /// Resolves the configured shell paths against the worker origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if a path cannot be resolved.
    pub fn shell_urls(&self) -> Result<Vec<Url>> {
        self.config
            .shell_assets
            .iter()
            .map(|path| net::resolve(&self.origin, path))
            .collect()
    }

    async fn fetch_shell_asset(&self, url: Url) -> Result<(Url, Response)> {
        let response = self
            .network
            .fetch(&Request::get(url.clone()))
            .await
            .map_err(|e| Error::ShellAssetFetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(Error::ShellAssetFetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status),
            });
        }
        Ok((url, response))
    }

    /// Fetches every shell asset, then stores them in one write.
    async fn populate_shell(&self) -> Result<usize> {
        let version = self.version();
        self.store.open(version).await?;

        let urls = self.shell_urls()?;
        let assets = try_join_all(urls.into_iter().map(|url| self.fetch_shell_asset(url))).await?;
        let count = assets.len();
        self.store.put_all(version, assets).await?;
        Ok(count)
    }
}

#[async_trait]
impl<S: CacheStore, N: HttpFetch> WorkerLifecycle for OfflineCacheController<S, N> {
    async fn on_install(&self, host: &dyn WorkerHost) -> Result<()> {
        self.set_phase(WorkerPhase::Installing).await;

        match self.populate_shell().await {
            Ok(count) => {
                log::info!("Cached {count} shell assets in {}", self.version());
            }
            Err(e) => {
                log::error!("Install of {} failed: {e}", self.version());
                self.set_phase(WorkerPhase::Redundant).await;
                return Err(e);
            }
        }

        if let Err(e) = host.skip_waiting().await {
            log::warn!("skip_waiting failed: {e}");
        }
        self.set_phase(WorkerPhase::Waiting).await;
        Ok(())
    }

    async fn on_activate(&self, host: &dyn WorkerHost) -> Result<()> {
        self.set_phase(WorkerPhase::Activating).await;

        let current = self.version();
        let removed = self
            .store
            .delete_where(&|name: &str| name != current)
            .await?;
        if !removed.is_empty() {
            log::info!("Deleted stale caches: {}", removed.join(", "));
        }

        if let Err(e) = host.claim_clients().await {
            log::warn!("claim_clients failed: {e}");
        }
        self.set_phase(WorkerPhase::Active).await;
        Ok(())
    }

    async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome> {
        if !net::same_origin(&request.url, &self.origin) {
            return Ok(FetchOutcome::Passthrough);
        }

        if let Some(response) = self.store.lookup(&request.url).await? {
            log::debug!("Cache hit {}", request.url);
            return Ok(FetchOutcome::Cached(response));
        }

        log::debug!("Cache miss {}", request.url);
        let response = self.network.fetch(request).await?;
        Ok(FetchOutcome::Network(response))
    }
}
