//! The client cache worker.
//!
//! A [`CacheWorker`] owns two named stores: a static store filled once at
//! install time from a fixed asset list, and a runtime store filled lazily
//! as images and API responses pass through. Once activated it intercepts
//! fetches and serves each one with the [`Strategy`] its request classifies
//! to.
//!
//! Lifecycle: `Parsed -> Installing -> Installed -> Activating -> Activated`.
//! A failed install ends in `Redundant`, and so does a worker replaced by a
//! newer one (see [`Registration`]).

use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::config::WorkerConfig;
use crate::error::InterceptError;
use crate::network::Fetcher;
use crate::request::{FetchRequest, RequestKey};
use crate::response::BufferedResponse;
use crate::store::{CacheEntry, CacheStorage};
use crate::Result;

mod registration;
mod stats;
mod strategy;

pub use registration::Registration;
pub use stats::StatsSnapshot;
pub use strategy::{classify, Strategy};

use stats::WorkerStats;

/// Assets fetched into the static store at install time.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/static/js/bundle.js",
    "/static/css/main.css",
    "/logo192.png",
    "/logo512.png",
    "/favicon.ico",
];

/// Freshness window for cached API responses.
pub const API_CACHE_TIME: std::time::Duration = std::time::Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_cache: String,
    pub runtime: String,
}

impl CacheNames {
    pub fn new(static_cache: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            static_cache: static_cache.into(),
            runtime: runtime.into(),
        }
    }

    /// Both names carry the same version tag, so they always roll over
    /// together.
    pub fn versioned(static_prefix: &str, runtime_prefix: &str, version: &str) -> Self {
        Self::new(
            format!("{}-{}", static_prefix, version),
            format!("{}-{}", runtime_prefix, version),
        )
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.runtime
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
    /// Network failed; served a cached copy instead.
    CacheFallback,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub response: BufferedResponse,
    pub source: FetchSource,
    /// Background refresh spawned for a stale-while-revalidate hit. The
    /// response never waits on it; awaiting it is optional.
    pub revalidation: Option<JoinHandle<()>>,
    /// Runtime-store write of the response just fetched. Detached like the
    /// revalidation; its errors are logged and counted.
    pub write: Option<JoinHandle<()>>,
}

impl FetchOutcome {
    fn new(response: BufferedResponse, source: FetchSource) -> Self {
        Self {
            response,
            source,
            revalidation: None,
            write: None,
        }
    }

    /// Waits for whatever background cache work this fetch spawned.
    pub async fn settle(&mut self) {
        for handle in [self.revalidation.take(), self.write.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = handle.await {
                warn!("Background cache task did not complete: {}", e);
            }
        }
    }
}

pub struct CacheWorker {
    names: CacheNames,
    precache: Vec<Url>,
    api_prefix: String,
    api_ttl: Duration,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    state: RwLock<WorkerState>,
    stats: Arc<WorkerStats>,
}

impl CacheWorker {
    /// Builds a worker from configuration. Precache paths are resolved
    /// against the site `origin`.
    pub fn new(
        config: &WorkerConfig,
        origin: &Url,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let precache = config
            .precache
            .iter()
            .map(|path| origin.join(path))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let api_ttl = Duration::from_std(std::time::Duration::from_secs(config.api_cache_secs))
            .map_err(|e| InterceptError::Config(format!("worker.api_cache_secs: {}", e)))?;

        Ok(Self {
            names: config.cache_names(),
            precache,
            api_prefix: config.api_prefix.clone(),
            api_ttl,
            storage,
            network,
            clock: Arc::new(SystemClock),
            state: RwLock::new(WorkerState::Parsed),
            stats: Arc::new(WorkerStats::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(InterceptError::InvalidInput(format!(
                "worker is {:?}, expected {:?}",
                *state, from
            )));
        }
        debug!("Worker state {:?} -> {:?}", from, to);
        *state = to;
        Ok(())
    }

    pub(crate) fn retire(&self) {
        *self.state.write() = WorkerState::Redundant;
    }

    /// Fills the static store. Every asset is fetched before anything is
    /// written, and a failed write discards the store, so a failed install
    /// leaves nothing behind.
    #[tracing::instrument(skip(self), fields(cache = %self.names.static_cache))]
    pub async fn install(&self) -> Result<()> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        info!("Installing: precaching {} assets", self.precache.len());

        match self.precache_all().await {
            Ok(()) => {
                self.transition(WorkerState::Installing, WorkerState::Installed)?;
                info!("Installed; activating without waiting");
                Ok(())
            }
            Err(e) => {
                warn!("Install failed: {}", e);
                self.retire();
                Err(e)
            }
        }
    }

    async fn precache_all(&self) -> Result<()> {
        let mut fetched = Vec::with_capacity(self.precache.len());
        for url in &self.precache {
            let request = FetchRequest::new(hyper::Method::GET, url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| InterceptError::Install(format!("{}: {}", url, e)))?;
            if !response.is_success() {
                return Err(InterceptError::Install(format!(
                    "{} returned {}",
                    url, response.status
                )));
            }
            fetched.push((request.key(), response));
        }

        self.storage
            .open(&self.names.static_cache)
            .await
            .map_err(|e| InterceptError::Install(e.to_string()))?;
        for (key, response) in fetched {
            let written = self
                .storage
                .put(&self.names.static_cache, key, CacheEntry::new(response))
                .await;
            if let Err(e) = written {
                self.discard_static_cache().await;
                return Err(InterceptError::Install(e.to_string()));
            }
        }
        Ok(())
    }

    /// Drops a partly filled static store so no store of a failed version
    /// is ever matched.
    async fn discard_static_cache(&self) {
        match self.storage.delete_cache(&self.names.static_cache).await {
            Ok(_) => debug!("Discarded partial cache {}", self.names.static_cache),
            Err(e) => warn!(
                "Failed to discard partial cache {}: {}",
                self.names.static_cache, e
            ),
        }
    }

    /// Deletes every store not named by this worker, then takes control.
    /// Returns the names of the deleted stores.
    #[tracing::instrument(skip(self))]
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;

        let deleted = match self.purge_stale_caches().await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Activation failed: {}", e);
                *self.state.write() = WorkerState::Installed;
                return Err(e);
            }
        };

        self.transition(WorkerState::Activating, WorkerState::Activated)?;
        info!(
            "Activated; deleted {} stale caches, claiming clients",
            deleted.len()
        );
        Ok(deleted)
    }

    async fn purge_stale_caches(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.cache_names().await? {
            if self.names.is_current(&name) {
                continue;
            }
            info!("Deleting stale cache {}", name);
            if self.storage.delete_cache(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        if self.state() != WorkerState::Activated {
            debug!("Worker not in control, going to network");
            self.stats.uncontrolled();
            let response = self.network.fetch(request).await?;
            return Ok(FetchOutcome::new(response, FetchSource::Network));
        }

        match classify(request, &self.api_prefix) {
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            Strategy::TimeBoxed => self.time_boxed(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
        }
    }

    async fn stale_while_revalidate(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        let key = request.key();
        if let Some(entry) = self.lookup(&key).await {
            debug!("Image cache hit, revalidating in background");
            self.stats.hit();
            let mut outcome = FetchOutcome::new(entry.response, FetchSource::Cache);
            outcome.revalidation = Some(self.spawn_revalidation(request.clone()));
            return Ok(outcome);
        }

        self.stats.miss();
        let response = self.network.fetch(request).await?;
        let mut outcome = FetchOutcome::new(response, FetchSource::Network);
        outcome.write = Some(self.spawn_store(key, CacheEntry::new(outcome.response.clone())));
        Ok(outcome)
    }

    /// The refresh runs detached; its errors are logged and dropped.
    fn spawn_revalidation(&self, request: FetchRequest) -> JoinHandle<()> {
        let network = self.network.clone();
        let storage = self.storage.clone();
        let stats = self.stats.clone();
        let cache = self.names.runtime.clone();

        tokio::spawn(async move {
            match network.fetch(&request).await {
                Ok(response) => {
                    match storage
                        .put(&cache, request.key(), CacheEntry::new(response))
                        .await
                    {
                        Ok(()) => {
                            debug!("Revalidated {}", request.url);
                            stats.revalidated();
                        }
                        Err(e) => {
                            warn!("Failed to store revalidated {}: {}", request.url, e);
                            stats.write_failed();
                        }
                    }
                }
                Err(e) => {
                    warn!("Background revalidation of {} failed: {}", request.url, e);
                    stats.revalidation_failed();
                }
            }
        })
    }

    async fn time_boxed(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        let key = request.key();
        if let Some(entry) = self.lookup(&key).await {
            if entry.is_fresh(self.clock.now(), self.api_ttl) {
                debug!("Fresh API cache hit");
                self.stats.hit();
                return Ok(FetchOutcome::new(entry.response, FetchSource::Cache));
            }
            debug!("API cache entry expired");
        }

        self.stats.miss();
        let response = self.network.fetch(request).await?;
        let entry = CacheEntry::fetched_at(&response, self.clock.now());
        let mut outcome = FetchOutcome::new(response, FetchSource::Network);
        outcome.write = Some(self.spawn_store(key, entry));
        Ok(outcome)
    }

    async fn network_first(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        let error = match self.network.fetch(request).await {
            Ok(response) => return Ok(FetchOutcome::new(response, FetchSource::Network)),
            Err(e) => e,
        };

        match self.storage.match_any(&request.key()).await {
            Ok(Some(entry)) => {
                info!("Network failed ({}), serving cached copy", error);
                self.stats.offline_fallback();
                Ok(FetchOutcome::new(entry.response, FetchSource::CacheFallback))
            }
            Ok(None) => Err(error),
            Err(e) => {
                warn!("Cache lookup failed during fallback: {}", e);
                Err(error)
            }
        }
    }

    /// Runtime-store lookup; storage errors count as a miss.
    async fn lookup(&self, key: &RequestKey) -> Option<CacheEntry> {
        match self.storage.match_in(&self.names.runtime, key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", key, e);
                None
            }
        }
    }

    /// Runtime-store write, off the response path. Failures are logged and
    /// never reach the caller.
    fn spawn_store(&self, key: RequestKey, entry: CacheEntry) -> JoinHandle<()> {
        let storage = self.storage.clone();
        let stats = self.stats.clone();
        let cache = self.names.runtime.clone();

        tokio::spawn(async move {
            if let Err(e) = storage.put(&cache, key.clone(), entry).await {
                warn!("Failed to cache {}: {}", key, e);
                stats.write_failed();
            }
        })
    }
}
