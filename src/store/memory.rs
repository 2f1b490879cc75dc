use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CacheEntry, CacheStorage};
use crate::error::InterceptError;
use crate::request::RequestKey;
use crate::Result;

#[derive(Debug, Default)]
struct StorageState {
    // creation order, searched front to back by `match_any`
    order: Vec<String>,
    caches: HashMap<String, HashMap<RequestKey, CacheEntry>>,
}

impl StorageState {
    fn ensure(&mut self, cache: &str) -> &mut HashMap<RequestKey, CacheEntry> {
        if !self.caches.contains_key(cache) {
            self.order.push(cache.to_string());
        }
        self.caches.entry(cache.to_string()).or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    state: Arc<RwLock<StorageState>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, cache: &str) -> usize {
        self.state
            .read()
            .await
            .caches
            .get(cache)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, cache: &str) -> Result<()> {
        self.state.write().await.ensure(cache);
        Ok(())
    }

    async fn match_in(&self, cache: &str, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let state = self.state.read().await;
        Ok(state
            .caches
            .get(cache)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let state = self.state.read().await;
        for name in &state.order {
            if let Some(entry) = state.caches.get(name).and_then(|entries| entries.get(key)) {
                debug!("Found {} in cache {}", key, name);
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    async fn put(&self, cache: &str, key: RequestKey, entry: CacheEntry) -> Result<()> {
        if !key.is_get() {
            return Err(InterceptError::Cache(format!(
                "cannot store {} request {}",
                key.method(),
                key.url()
            )));
        }
        let mut state = self.state.write().await;
        state.ensure(cache).insert(key, entry);
        Ok(())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.order.retain(|name| name != cache);
        Ok(state.caches.remove(cache).is_some())
    }

    async fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.order.clone())
    }
}
