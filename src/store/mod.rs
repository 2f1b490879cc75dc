//! Named cache stores.
//!
//! A [`CacheStorage`] holds any number of named stores, each mapping a
//! [`RequestKey`] to a [`CacheEntry`]. It mirrors the browser Cache Storage
//! API closely enough for the worker: stores are opened lazily, deleted
//! wholesale, and only `GET` requests can be stored.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::request::RequestKey;
use crate::response::BufferedResponse;
use crate::Result;

mod disk;
mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

/// A stored response plus the time it was fetched, when known.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: BufferedResponse,
    pub fetched_on: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(response: BufferedResponse) -> Self {
        Self {
            response,
            fetched_on: None,
        }
    }

    /// Entry for a response fetched at `at`; the stored copy carries the
    /// freshness header as well.
    pub fn fetched_at(response: &BufferedResponse, at: DateTime<Utc>) -> Self {
        Self {
            response: response.stamped(at),
            fetched_on: Some(at),
        }
    }

    pub fn freshness(&self) -> Option<DateTime<Utc>> {
        self.fetched_on.or_else(|| self.response.fetched_on())
    }

    /// Entries without a timestamp are never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.freshness() {
            Some(fetched_on) => now - fetched_on < ttl,
            None => false,
        }
    }
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Creates the store if it does not exist yet.
    async fn open(&self, cache: &str) -> Result<()>;

    async fn match_in(&self, cache: &str, key: &RequestKey) -> Result<Option<CacheEntry>>;

    /// Looks `key` up in every store, returning the first hit.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<CacheEntry>>;

    /// Stores `entry`, creating the store on first write. Last write wins.
    async fn put(&self, cache: &str, key: RequestKey, entry: CacheEntry) -> Result<()>;

    /// Returns whether a store was deleted.
    async fn delete_cache(&self, cache: &str) -> Result<bool>;

    async fn cache_names(&self) -> Result<Vec<String>>;

    async fn has_cache(&self, cache: &str) -> Result<bool> {
        Ok(self.cache_names().await?.iter().any(|name| name == cache))
    }
}
