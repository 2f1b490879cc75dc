use std::sync::Arc;

use storefront_edge::config::StorageBackend;
use storefront_edge::logger::init_logger;
use storefront_edge::prelude::*;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    info!("Starting storefront edge proxy");

    let config = Config::load()?;
    let origin = config.origin()?;

    let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);
    let upstream: Arc<dyn Fetcher> = Arc::new(OriginFetcher::new(config.upstream()?, http.clone()));

    let storage = create_storage(&config)?;
    let registration = Arc::new(Registration::new(upstream.clone()));
    let worker = CacheWorker::new(&config.worker, &origin, storage, upstream)?;
    if let Err(e) = registration.register(worker).await {
        warn!("Cache worker not installed, serving uncached: {}", e);
    }

    let mut server = ProxyServer::new(config.listen_addr()?, origin, registration.clone());
    if config.edge.enabled {
        server = server.with_edge(EdgeRouter::new(&config.edge, http)?);
    } else {
        info!("Edge router disabled");
    }

    server.run(wait_for_shutdown()).await?;

    info!("Shutting down...");
    if let Some(worker) = registration.active().await {
        info!("Worker stats: {:?}", worker.stats());
    }
    info!("Shutdown complete");

    Ok(())
}

fn create_storage(config: &Config) -> Result<Arc<dyn CacheStorage>, Box<dyn std::error::Error>> {
    match config.worker.storage {
        StorageBackend::Memory => Ok(Arc::new(MemoryCacheStorage::new())),
        StorageBackend::Disk => Ok(Arc::new(DiskCacheStorage::new(&config.worker.cache_dir)?)),
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
