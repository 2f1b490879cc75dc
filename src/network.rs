use std::sync::Arc;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::HeaderValue;
use hyper::{Body, Client};
use hyper_tls::HttpsConnector;
use tracing::{debug, warn};
use url::Url;

use crate::error::InterceptError;
use crate::request::FetchRequest;
use crate::response::BufferedResponse;
use crate::Result;

/// Something that can turn a request into a response.
///
/// Transport failures are `Err`; any HTTP status, including 4xx and 5xx, is
/// a successful fetch.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<BufferedResponse>;
}

pub struct HttpFetcher {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let tls = native_tls::TlsConnector::new()
            .map_err(|e| InterceptError::Network(e.to_string()))?;
        let https = HttpsConnector::from((http, tls.into()));

        Ok(Self {
            client: Client::builder().build(https),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<BufferedResponse> {
        let req = request.to_hyper()?;
        let resp = self.client.request(req).await.map_err(|e| {
            warn!("Network request failed: {}", e);
            InterceptError::Network(e.to_string())
        })?;
        debug!("Upstream responded with {}", resp.status());
        BufferedResponse::from_hyper(resp).await
    }
}

/// Sends requests for the public site to the upstream application server,
/// keeping path and query.
pub struct OriginFetcher {
    upstream: Url,
    inner: Arc<dyn Fetcher>,
}

impl OriginFetcher {
    pub fn new(upstream: Url, inner: Arc<dyn Fetcher>) -> Self {
        Self { upstream, inner }
    }

    pub fn rewrite(&self, request: &FetchRequest) -> Result<FetchRequest> {
        let mut target = request.url.path().to_string();
        if let Some(query) = request.url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut rewritten = request.clone();
        rewritten.url = self.upstream.join(&target)?;
        if let Some(host) = request.url.host_str() {
            if let Ok(value) = HeaderValue::from_str(host) {
                rewritten.headers.insert("x-forwarded-host", value);
            }
        }
        Ok(rewritten)
    }
}

#[async_trait]
impl Fetcher for OriginFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<BufferedResponse> {
        let rewritten = self.rewrite(request)?;
        debug!("Forwarding {} to {}", request.url, rewritten.url);
        self.inner.fetch(&rewritten).await
    }
}
