//! noppo-store - the catalog page and offline cache of a small app store.
//!
//! The crate has two independent halves that share only the network seam:
//!
//! - the **catalog renderer**: [`load_catalog`] fetches the JSON catalog,
//!   [`normalize`] fills in missing fields, and [`render`] filters, sorts,
//!   and maps entries to [`Card`]s. [`StorePage`] drives these through the
//!   host's [`StoreSurface`] and owns the per-page session state.
//! - the **offline cache controller**: [`OfflineCacheController`] implements
//!   the worker's install, activate, and fetch handlers over a
//!   [`CacheStore`].
//!
//! # Example
//!
//! ```no_run
//! use noppo_store::{
//!     DiskCacheStore, FetchOutcome, OfflineCacheController, PathConfig, ReqwestFetcher,
//!     Request, StoreConfig, Url, WorkerLifecycle,
//! };
//!
//! # async fn example() -> noppo_store::Result<()> {
//! let config = StoreConfig::load()?;
//! let origin = Url::parse("https://store.example/").expect("valid origin");
//!
//! let worker = OfflineCacheController::new(
//!     origin.clone(),
//!     config.offline,
//!     DiskCacheStore::new(PathConfig::default().cache_dir),
//!     ReqwestFetcher::new()?,
//! );
//!
//! let request = Request::get(origin.join("/style.css").expect("valid path"));
//! if let FetchOutcome::Cached(response) = worker.on_fetch(&request).await? {
//!     println!("served {} bytes from cache", response.body.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod net;
pub mod page;
pub mod view;
pub mod worker;

// Re-export main types for convenience
pub use catalog::{CatalogEntry, RawEntry, load_catalog, normalize, sample_entry};
pub use config::{CatalogConfig, OfflineConfig, PathConfig, StoreConfig};
pub use error::{Error, Result};
pub use net::{CacheMode, HttpFetch, ReqwestFetcher, Request, Response};
pub use page::{
    InstallChoice, InstallPrompt, InstallSession, RenderSummary, StorePage, StoreSurface,
    WorkerRegistry,
};
pub use view::{Card, GridContent, SortKey, count_label, render};
pub use worker::{
    CacheStore, DiskCacheStore, FetchOutcome, MemoryCacheStore, OfflineCacheController,
    WorkerHost, WorkerLifecycle, WorkerPhase,
};

pub use reqwest::Url;
