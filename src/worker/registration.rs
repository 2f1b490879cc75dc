use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{CacheWorker, FetchOutcome, FetchSource};
use crate::network::Fetcher;
use crate::request::FetchRequest;
use crate::response::BufferedResponse;
use crate::Result;

/// Holds the worker currently in control of fetches.
///
/// A newly registered worker is installed and, on success, activated and
/// swapped in straight away. If its install fails the previous worker keeps
/// control. With no active worker, fetches go directly to the network.
pub struct Registration {
    active: RwLock<Option<Arc<CacheWorker>>>,
    network: Arc<dyn Fetcher>,
}

impl Registration {
    pub fn new(network: Arc<dyn Fetcher>) -> Self {
        Self {
            active: RwLock::new(None),
            network,
        }
    }

    pub async fn register(&self, worker: CacheWorker) -> Result<Arc<CacheWorker>> {
        let worker = Arc::new(worker);
        info!(
            "Registering worker for caches {} / {}",
            worker.names().static_cache,
            worker.names().runtime
        );

        if let Err(e) = worker.install().await {
            if self.active.read().await.is_some() {
                warn!("New worker failed to install, previous worker stays in control");
            }
            return Err(e);
        }

        if let Err(e) = worker.activate().await {
            error!("New worker failed to activate: {}", e);
            worker.retire();
            return Err(e);
        }

        let previous = self.active.write().await.replace(worker.clone());
        if let Some(previous) = previous {
            debug!(
                "Retiring worker for {} / {}",
                previous.names().static_cache,
                previous.names().runtime
            );
            previous.retire();
        }
        Ok(worker)
    }

    pub async fn active(&self) -> Option<Arc<CacheWorker>> {
        self.active.read().await.clone()
    }

    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        match self.active().await {
            Some(worker) => worker.handle_fetch(request).await,
            None => {
                let response = self.network.fetch(request).await?;
                Ok(FetchOutcome::new(response, FetchSource::Network))
            }
        }
    }
}

#[async_trait]
impl Fetcher for Registration {
    async fn fetch(&self, request: &FetchRequest) -> Result<BufferedResponse> {
        Ok(self.handle_fetch(request).await?.response)
    }
}
