//! Page controller for the catalog view.
//!
//! [`StorePage`] owns the session state of one open page (search text, sort
//! order, pending install prompt) and drives every render cycle through the
//! host seams: [`HttpFetch`] for the catalog, [`StoreSurface`] for the
//! visible elements, and [`WorkerRegistry`] for the offline cache worker.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::Mutex;

use crate::catalog::{self, CatalogEntry};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::net::{self, HttpFetch};
use crate::view::{self, GridContent, SortKey};

/// Message shown after a successful offline-cache refresh.
pub const REFRESH_OK_MESSAGE: &str = "オフラインデータを更新しました";

/// Message shown when the offline-cache refresh fails.
pub const REFRESH_FAILED_MESSAGE: &str = "更新に失敗しました";

/// Visible elements of the page.
///
/// Implementations replace content wholesale; no diffing is expected.
pub trait StoreSurface: Send + Sync {
    /// Toggles the grid's busy indicator.
    fn set_busy(&self, busy: bool);

    /// Replaces everything in the grid.
    fn show_grid(&self, content: GridContent);

    /// Sets the count label text.
    fn set_count_label(&self, label: &str);

    /// Shows or hides the install control.
    fn set_install_visible(&self, visible: bool);

    /// Shows a blocking message to the user.
    fn alert(&self, message: &str);
}

/// The host's worker container as seen from the page.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Registers the worker script.
    async fn register(&self, script_url: &Url) -> Result<()>;

    /// Resolves once a worker is active for the page.
    async fn ready(&self) -> Result<()>;

    /// Asks the host to check for an updated worker.
    async fn update(&self) -> Result<()>;
}

/// The user's answer to an install prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallChoice {
    Accepted,
    Dismissed,
}

/// A deferred install prompt handed over by the host.
#[async_trait]
pub trait InstallPrompt: Send + Sync {
    /// Shows the prompt and waits for the user's choice.
    async fn prompt(&self) -> Result<InstallChoice>;
}

/// Install-prompt state for one page session.
#[derive(Default)]
pub struct InstallSession {
    pending: Option<Box<dyn InstallPrompt>>,
}

impl InstallSession {
    /// Creates a session with no pending prompt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a prompt for later replay, replacing any earlier one.
    pub fn defer(&mut self, prompt: Box<dyn InstallPrompt>) {
        self.pending = Some(prompt);
    }

    /// Removes and returns the pending prompt.
    pub fn take(&mut self) -> Option<Box<dyn InstallPrompt>> {
        self.pending.take()
    }

    /// Drops the pending prompt, if any.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Returns true if a prompt is waiting to be replayed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Current values of the search field and the sort selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controls {
    pub query: String,
    pub sort: SortKey,
}

/// Outcome of a completed render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    /// Number of cards shown.
    pub shown: usize,
    /// Whether the sample entry replaced an unavailable catalog.
    pub fallback: bool,
}

/// Controller for one open store page.
pub struct StorePage<F: HttpFetch, S: StoreSurface, W: WorkerRegistry> {
    base_url: Url,
    config: StoreConfig,
    fetcher: F,
    surface: S,
    worker: Option<W>,
    controls: Mutex<Controls>,
    install: Mutex<InstallSession>,
    generation: AtomicU64,
}

impl<F: HttpFetch, S: StoreSurface, W: WorkerRegistry> StorePage<F, S, W> {
    /// Creates a controller for the page at `base_url`.
    ///
    /// `worker` is `None` on hosts without worker support.
    #[must_use]
    pub fn new(base_url: Url, config: StoreConfig, fetcher: F, surface: S, worker: Option<W>) -> Self {
        Self {
            base_url,
            config,
            fetcher,
            surface,
            worker,
            controls: Mutex::new(Controls::default()),
            install: Mutex::new(InstallSession::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns a reference to the surface.
    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Returns a snapshot of the current control values.
    pub async fn controls(&self) -> Controls {
        self.controls.lock().await.clone()
    }

    /// Returns true if an install prompt is waiting for the user.
    pub async fn install_pending(&self) -> bool {
        self.install.lock().await.is_pending()
    }

    /// Page load: shows skeletons, then registers the worker and renders
    /// concurrently. A stalled registration never holds back the grid.
    pub async fn start(&self) -> Option<RenderSummary> {
        self.surface
            .show_grid(GridContent::Skeletons(self.config.catalog.skeleton_count));
        let (_, summary) = tokio::join!(self.register_worker(), self.refresh());
        summary
    }

    /// Registers the offline cache worker. Failures are logged and ignored.
    pub async fn register_worker(&self) -> bool {
        let Some(worker) = &self.worker else {
            log::info!("Service workers unavailable, running without offline support");
            return false;
        };

        let result = match net::resolve(&self.base_url, &self.config.offline.worker_script) {
            Ok(script) => worker.register(&script).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                let e = Error::ServiceWorkerRegistrationFailed(e.to_string());
                log::warn!("{e}");
                false
            }
        }
    }

    /// Search field changed.
    pub async fn on_search_input(&self, text: &str) -> Option<RenderSummary> {
        self.controls.lock().await.query = text.to_string();
        self.refresh().await
    }

    /// Sort selector changed.
    pub async fn on_sort_change(&self, value: &str) -> Option<RenderSummary> {
        let sort: SortKey = value.parse().unwrap_or_default();
        self.controls.lock().await.sort = sort;
        self.refresh().await
    }

    /// Loads the catalog, falling back to the sample entry.
    async fn load_entries(&self) -> (Vec<CatalogEntry>, bool) {
        let loaded = match net::resolve(&self.base_url, &self.config.catalog.catalog_path) {
            Ok(url) => catalog::load_catalog(&self.fetcher, &url).await,
            Err(e) => Err(Error::CatalogUnavailable(e.to_string())),
        };

        match loaded {
            Ok(raw) => {
                let icon = &self.config.catalog.default_icon;
                (raw.into_iter().map(|r| r.normalize(icon)).collect(), false)
            }
            Err(e) => {
                log::warn!("{e}, using sample");
                (vec![catalog::sample_entry()], true)
            }
        }
    }

    /// Runs one full fetch, filter, sort, and render cycle.
    ///
    /// Returns `None` if a newer cycle started while this one was fetching;
    /// its result is dropped so the newer cycle's grid stays.
    pub async fn refresh(&self) -> Option<RenderSummary> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.surface.set_busy(true);

        let (entries, fallback) = self.load_entries().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("Render cycle {generation} superseded, dropping result");
            return None;
        }

        let Controls { query, sort } = self.controls().await;
        let cards = view::render(&entries, &query, sort);
        let shown = cards.len();
        log::debug!("Render cycle {generation}: {shown} of {} entries, sort={sort}", entries.len());

        self.surface.show_grid(GridContent::Cards(cards));
        self.surface.set_count_label(&view::count_label(shown));
        self.surface.set_busy(false);

        Some(RenderSummary { shown, fallback })
    }

    /// The host offered a deferred install prompt.
    pub async fn on_before_install_prompt(&self, prompt: Box<dyn InstallPrompt>) {
        self.install.lock().await.defer(prompt);
        self.surface.set_install_visible(true);
    }

    /// The app was installed through any path.
    pub async fn on_app_installed(&self) {
        self.surface.set_install_visible(false);
        self.install.lock().await.clear();
    }

    /// The install control was clicked. Does nothing without a pending prompt.
    pub async fn on_install_clicked(&self) -> Option<InstallChoice> {
        let prompt = self.install.lock().await.take()?;

        let choice = match prompt.prompt().await {
            Ok(choice) => {
                log::info!("Install prompt answered: {choice:?}");
                Some(choice)
            }
            Err(e) => {
                log::warn!("Install prompt failed: {e}");
                None
            }
        };
        self.surface.set_install_visible(false);
        choice
    }

    /// Manual "update offline data" action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheRefreshFailed`] if the worker is unavailable or
    /// the update fails. The user has already been told either way.
    pub async fn refresh_offline_cache(&self) -> Result<()> {
        let result = match &self.worker {
            Some(worker) => update_worker(worker)
                .await
                .map_err(|e| Error::CacheRefreshFailed(e.to_string())),
            None => Err(Error::CacheRefreshFailed(
                "service workers unavailable".to_string(),
            )),
        };

        match result {
            Ok(()) => {
                self.surface.alert(REFRESH_OK_MESSAGE);
                Ok(())
            }
            Err(e) => {
                log::error!("{e}");
                self.surface.alert(REFRESH_FAILED_MESSAGE);
                Err(e)
            }
        }
    }
}

/// Waits for the active worker, then requests a registration update.
async fn update_worker<W: WorkerRegistry>(worker: &W) -> Result<()> {
    worker.ready().await?;
    worker.update().await
}
