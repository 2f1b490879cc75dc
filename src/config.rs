use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::edge::patterns::{DEFAULT_BOT_USER_AGENTS, DEFAULT_IGNORED_EXTENSIONS};
use crate::error::InterceptError;
use crate::worker::{CacheNames, API_CACHE_TIME, DEFAULT_PRECACHE};
use crate::Result;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub site: SiteConfig,
    pub worker: WorkerConfig,
    pub edge: EdgeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the storefront is served from and where requests end up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Public origin, e.g. `https://shop.example.com`.
    pub origin: String,
    /// Application server that pass-through requests are forwarded to.
    pub upstream: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Disk,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Shared version tag; bumping it rolls both stores over.
    pub version: String,
    pub static_prefix: String,
    pub runtime_prefix: String,
    pub precache: Vec<String>,
    pub api_prefix: String,
    pub api_cache_secs: u64,
    pub storage: StorageBackend,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub enabled: bool,
    pub prerender_url: String,
    pub token: String,
    /// Pass the request through when the prerender service is unreachable.
    pub fallback_on_error: bool,
    pub api_prefix: String,
    pub ignored_extensions: Vec<String>,
    pub bot_user_agents: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            upstream: "http://127.0.0.1:3000".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            static_prefix: "storefront-static".to_string(),
            runtime_prefix: "storefront-runtime".to_string(),
            precache: DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect(),
            api_prefix: "/api/".to_string(),
            api_cache_secs: API_CACHE_TIME.as_secs(),
            storage: StorageBackend::Memory,
            cache_dir: "./cache/worker".into(),
        }
    }
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prerender_url: "https://service.prerender.io".to_string(),
            token: String::new(),
            fallback_on_error: false,
            api_prefix: "/api/".to_string(),
            ignored_extensions: DEFAULT_IGNORED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            bot_user_agents: DEFAULT_BOT_USER_AGENTS
                .iter()
                .map(|b| b.to_string())
                .collect(),
        }
    }
}

impl WorkerConfig {
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::versioned(&self.static_prefix, &self.runtime_prefix, &self.version)
    }
}

impl Config {
    /// Reads the TOML file named by `CONFIG_PATH`, falling back to defaults.
    /// `PRERENDER_TOKEN` overrides the edge token either way.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(path) => {
                info!("Loading configuration from {}", path);
                Self::from_file(&path)?
            }
            Err(_) => {
                debug!("CONFIG_PATH not set, using default configuration");
                Self::default()
            }
        };

        if let Ok(token) = std::env::var("PRERENDER_TOKEN") {
            config.edge.token = token;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| InterceptError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.origin()?;
        self.upstream()?;
        if self.worker.version.trim().is_empty() {
            return Err(InterceptError::Config("worker.version must not be empty".into()));
        }
        let names = self.worker.cache_names();
        if names.static_cache == names.runtime {
            return Err(InterceptError::Config(format!(
                "static and runtime caches share the name {}",
                names.runtime
            )));
        }
        if self.edge.enabled {
            Url::parse(&self.edge.prerender_url)
                .map_err(|e| InterceptError::Config(format!("edge.prerender_url: {}", e)))?;
            if self.edge.token.trim().is_empty() {
                return Err(InterceptError::Config(
                    "edge.token is required when the edge router is enabled".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn origin(&self) -> Result<Url> {
        Url::parse(&self.site.origin)
            .map_err(|e| InterceptError::Config(format!("site.origin: {}", e)))
    }

    pub fn upstream(&self) -> Result<Url> {
        Url::parse(&self.site.upstream)
            .map_err(|e| InterceptError::Config(format!("site.upstream: {}", e)))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| InterceptError::Config(format!("server address: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [worker]
            version = "v7"
            storage = "disk"

            [edge]
            token = "secret"
            fallback_on_error = true
            "#,
        )
        .unwrap();

        assert_eq!(config.worker.storage, StorageBackend::Disk);
        assert_eq!(config.worker.api_cache_secs, 300);
        let names = config.worker.cache_names();
        assert_eq!(names.static_cache, "storefront-static-v7");
        assert_eq!(names.runtime, "storefront-runtime-v7");
        assert!(config.edge.fallback_on_error);
        assert!(config.edge.bot_user_agents.iter().any(|b| b == "googlebot"));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_token_when_edge_enabled() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(InterceptError::Config(_))));

        let mut config = Config::default();
        config.edge.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_colliding_names() {
        let mut config = Config::default();
        config.edge.enabled = false;
        config.worker.runtime_prefix = config.worker.static_prefix.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml("[server]\nport = \"eighty\""),
            Err(InterceptError::Config(_))
        ));
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::default();
        assert_eq!(config.listen_addr().unwrap().port(), 8080);
    }
}
