use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{CacheEntry, CacheStorage};
use crate::error::InterceptError;
use crate::request::RequestKey;
use crate::response::BufferedResponse;
use crate::Result;

/// On-disk metadata for one entry; the body lives next to it. Header values
/// are kept as raw bytes since they need not be UTF-8.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMetadata {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
    fetched_on: Option<DateTime<Utc>>,
}

/// Cache stores persisted under a root directory, one sub-directory per
/// store name.
#[derive(Debug)]
pub struct DiskCacheStorage {
    root_path: PathBuf,
    // serializes writers so a reader never sees a half-replaced entry
    write_lock: RwLock<()>,
}

impl DiskCacheStorage {
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        info!("Initializing disk cache storage at {:?}", root_path.as_ref());
        let root_path = root_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root_path)?;
        Ok(Self {
            root_path,
            write_lock: RwLock::new(()),
        })
    }

    fn cache_dir(&self, cache: &str) -> Result<PathBuf> {
        if cache.is_empty()
            || cache.starts_with('.')
            || cache.contains(['/', '\\'])
        {
            return Err(InterceptError::InvalidInput(format!(
                "invalid cache name: {:?}",
                cache
            )));
        }
        Ok(self.root_path.join(cache))
    }

    fn entry_stem(key: &RequestKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Swaps in a new body and metadata pair. Both are staged under
    /// temporary names first and the old metadata is removed before the
    /// body is replaced, so a failure leaves either the old entry or none.
    async fn replace_entry(dir: &Path, stem: &str, body: &[u8], metadata: &[u8]) -> Result<()> {
        let body_path = dir.join(format!("{}.body", stem));
        let meta_path = dir.join(format!("{}.json", stem));
        let body_tmp = dir.join(format!("{}.body.tmp", stem));
        let meta_tmp = dir.join(format!("{}.json.tmp", stem));

        let staged = async {
            fs::write(&body_tmp, body).await?;
            fs::write(&meta_tmp, metadata).await
        }
        .await;
        if let Err(e) = staged {
            let _ = fs::remove_file(&body_tmp).await;
            let _ = fs::remove_file(&meta_tmp).await;
            return Err(e.into());
        }

        match fs::remove_file(&meta_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&body_tmp, &body_path).await?;
        fs::rename(&meta_tmp, &meta_path).await?;
        Ok(())
    }

    async fn read_entry(dir: &Path, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let stem = Self::entry_stem(key);
        let meta_path = dir.join(format!("{}.json", stem));
        let raw = match fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata: EntryMetadata = serde_json::from_slice(&raw)?;
        if &metadata.key != key {
            warn!("Hash collision for {} in {:?}", key, dir);
            return Ok(None);
        }
        let body = fs::read(dir.join(format!("{}.body", stem))).await?;

        let mut headers = HeaderMap::new();
        for (name, value) in &metadata.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(name, value);
            }
        }
        let status = StatusCode::from_u16(metadata.status)
            .map_err(|e| InterceptError::Cache(e.to_string()))?;

        Ok(Some(CacheEntry {
            response: BufferedResponse {
                status,
                headers,
                body: body.into(),
            },
            fetched_on: metadata.fetched_on,
        }))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, cache: &str) -> Result<()> {
        let dir = self.cache_dir(cache)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn match_in(&self, cache: &str, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let dir = self.cache_dir(cache)?;
        let _guard = self.write_lock.read().await;
        Self::read_entry(&dir, key).await
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let names = self.cache_names().await?;
        let _guard = self.write_lock.read().await;
        for name in names {
            let dir = self.cache_dir(&name)?;
            if let Some(entry) = Self::read_entry(&dir, key).await? {
                debug!("Found {} in cache {}", key, name);
                return Ok(Some(entry));
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
        let dir = self.cache_dir(cache)?;
        let stem = Self::entry_stem(&key);
        let metadata = EntryMetadata {
            status: entry.response.status.as_u16(),
            headers: entry
                .response
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
                .collect(),
            fetched_on: entry.fetched_on,
            key,
        };
        let raw = serde_json::to_vec(&metadata)?;

        let _guard = self.write_lock.write().await;
        fs::create_dir_all(&dir).await?;
        Self::replace_entry(&dir, &stem, &entry.response.body, &raw).await?;
        debug!(
            "Stored {} bytes for {} in {}",
            entry.response.body.len(),
            metadata.key,
            cache
        );
        Ok(())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        let dir = self.cache_dir(cache)?;
        let _guard = self.write_lock.write().await;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Deleted cache store {}", cache);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Store names in lexical order.
    async fn cache_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut read_dir = fs::read_dir(&self.root_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::FetchRequest;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let key = FetchRequest::get("https://shop.test/api/products").unwrap().key();
        let at = Utc.with_ymd_and_hms(2026, 2, 2, 8, 30, 0).unwrap();
        let response = BufferedResponse::ok("[{\"id\":1}]")
            .with_header("content-type", "application/json")
            .unwrap();

        {
            let storage = DiskCacheStorage::new(temp_dir.path()).unwrap();
            storage
                .put("runtime-v1", key.clone(), CacheEntry::fetched_at(&response, at))
                .await
                .unwrap();
        }

        let storage = DiskCacheStorage::new(temp_dir.path()).unwrap();
        let entry = storage.match_in("runtime-v1", &key).await.unwrap().unwrap();
        assert_eq!(entry.fetched_on, Some(at));
        assert_eq!(entry.response.header("content-type"), Some("application/json"));
        assert_eq!(entry.response.fetched_on(), Some(at));
        assert_eq!(&entry.response.body[..], b"[{\"id\":1}]");
    }

    #[tokio::test]
    async fn test_raw_header_bytes_survive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(temp_dir.path()).unwrap();
        let key = FetchRequest::get("https://shop.test/logo192.png").unwrap().key();
        let mut response = BufferedResponse::ok("png");
        response.headers.insert(
            "x-origin-note",
            HeaderValue::from_bytes(b"caf\xe9 cr\xe8me").unwrap(),
        );

        storage
            .put("static-v1", key.clone(), CacheEntry::new(response))
            .await
            .unwrap();
        let entry = storage.match_in("static-v1", &key).await.unwrap().unwrap();
        assert_eq!(
            entry.response.headers.get("x-origin-note").unwrap().as_bytes(),
            b"caf\xe9 cr\xe8me"
        );
    }

    #[tokio::test]
    async fn test_failed_rewrite_keeps_previous_entry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(temp_dir.path()).unwrap();
        let key = FetchRequest::get("https://shop.test/api/products").unwrap().key();
        let first_at = Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap();
        storage
            .put(
                "runtime-v1",
                key.clone(),
                CacheEntry::fetched_at(&BufferedResponse::ok("old"), first_at),
            )
            .await
            .unwrap();

        // block the staged metadata file so the second write fails midway
        let stem = DiskCacheStorage::entry_stem(&key);
        std::fs::create_dir(temp_dir.path().join("runtime-v1").join(format!("{}.json.tmp", stem)))
            .unwrap();
        let second_at = first_at + chrono::Duration::minutes(10);
        assert!(storage
            .put(
                "runtime-v1",
                key.clone(),
                CacheEntry::fetched_at(&BufferedResponse::ok("new"), second_at),
            )
            .await
            .is_err());

        let entry = storage.match_in("runtime-v1", &key).await.unwrap().unwrap();
        assert_eq!(&entry.response.body[..], b"old");
        assert_eq!(entry.fetched_on, Some(first_at));
        assert!(!temp_dir
            .path()
            .join("runtime-v1")
            .join(format!("{}.body.tmp", stem))
            .exists());
    }

    #[tokio::test]
    async fn test_names_and_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(temp_dir.path()).unwrap();
        storage.open("static-v1").await.unwrap();
        storage.open("runtime-v1").await.unwrap();

        assert_eq!(storage.cache_names().await.unwrap(), vec!["runtime-v1", "static-v1"]);
        assert!(storage.delete_cache("static-v1").await.unwrap());
        assert!(!storage.delete_cache("static-v1").await.unwrap());
        assert_eq!(storage.cache_names().await.unwrap(), vec!["runtime-v1"]);
    }

    #[tokio::test]
    async fn test_match_any_and_miss() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(temp_dir.path()).unwrap();
        let key = FetchRequest::get("https://shop.test/").unwrap().key();
        assert!(storage.match_any(&key).await.unwrap().is_none());

        storage
            .put("static-v1", key.clone(), CacheEntry::new(BufferedResponse::ok("<html>")))
            .await
            .unwrap();
        let hit = storage.match_any(&key).await.unwrap().unwrap();
        assert_eq!(&hit.response.body[..], b"<html>");
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(temp_dir.path()).unwrap();
        assert!(matches!(
            storage.open("../escape").await,
            Err(InterceptError::InvalidInput(_))
        ));
    }
}
