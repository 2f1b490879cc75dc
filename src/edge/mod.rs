//! Edge router: hands crawler traffic to a prerendering service.
//!
//! Every request is decided on its own. A request is prerendered only when
//! it is a `GET`, its path is neither a static asset nor under the API
//! prefix, and its `User-Agent` looks like a known crawler. Everything else
//! goes to the next stage untouched.

use std::fmt;
use std::sync::Arc;

use hyper::header::{HeaderName, HeaderValue};
use hyper::Method;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EdgeConfig;
use crate::error::InterceptError;
use crate::network::Fetcher;
use crate::request::FetchRequest;
use crate::response::BufferedResponse;
use crate::Result;

pub mod patterns;

use patterns::{BotMatcher, ExtensionMatcher};

pub const PRERENDER_TOKEN_HEADER: &str = "x-prerender-token";

/// Which clause of the predicate sent a request past the prerenderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    Method,
    StaticAsset,
    ApiPath,
    NotBot,
}

impl fmt::Display for PassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PassReason::Method => "method is not GET",
            PassReason::StaticAsset => "static asset",
            PassReason::ApiPath => "API path",
            PassReason::NotBot => "user agent is not a crawler",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDecision {
    Prerender,
    PassThrough(PassReason),
}

pub struct EdgeRouter {
    prerender_base: String,
    token: HeaderValue,
    api_prefix: String,
    extensions: ExtensionMatcher,
    bots: BotMatcher,
    fallback_on_error: bool,
    client: Arc<dyn Fetcher>,
}

impl EdgeRouter {
    pub fn new(config: &EdgeConfig, client: Arc<dyn Fetcher>) -> Result<Self> {
        Url::parse(&config.prerender_url)
            .map_err(|e| InterceptError::Config(format!("edge.prerender_url: {}", e)))?;
        let token = HeaderValue::from_str(&config.token)
            .map_err(|e| InterceptError::Config(format!("edge.token: {}", e)))?;

        info!(
            "Edge router prerendering via {} ({} bot signatures, {} ignored extensions)",
            config.prerender_url,
            config.bot_user_agents.len(),
            config.ignored_extensions.len()
        );

        Ok(Self {
            prerender_base: config.prerender_url.trim_end_matches('/').to_string(),
            token,
            api_prefix: config.api_prefix.clone(),
            extensions: ExtensionMatcher::new(config.ignored_extensions.as_slice()),
            bots: BotMatcher::new(config.bot_user_agents.as_slice())?,
            fallback_on_error: config.fallback_on_error,
            client,
        })
    }

    pub fn decide(&self, request: &FetchRequest) -> EdgeDecision {
        if request.method != Method::GET {
            return EdgeDecision::PassThrough(PassReason::Method);
        }
        let path = request.path();
        if self.extensions.is_static_asset(path) {
            return EdgeDecision::PassThrough(PassReason::StaticAsset);
        }
        if path.starts_with(&self.api_prefix) {
            return EdgeDecision::PassThrough(PassReason::ApiPath);
        }
        match request.user_agent() {
            Some(ua) if self.bots.is_bot(ua) => EdgeDecision::Prerender,
            _ => EdgeDecision::PassThrough(PassReason::NotBot),
        }
    }

    /// `<base>/<origin><path><query>`
    pub fn prerender_target(&self, request: &FetchRequest) -> Result<Url> {
        let query = request
            .url
            .query()
            .map(|q| format!("?{}", q))
            .unwrap_or_default();
        let target = format!(
            "{}/{}{}{}",
            self.prerender_base,
            request.origin(),
            request.path(),
            query
        );
        Ok(Url::parse(&target)?)
    }

    /// The request sent to the prerender service: original headers plus the
    /// token.
    pub fn prerender_request(&self, request: &FetchRequest) -> Result<FetchRequest> {
        let mut outgoing = FetchRequest::new(Method::GET, self.prerender_target(request)?);
        outgoing.headers = request.headers.clone();
        outgoing.headers.insert(
            HeaderName::from_static(PRERENDER_TOKEN_HEADER),
            self.token.clone(),
        );
        Ok(outgoing)
    }

    #[tracing::instrument(skip(self, request, next), fields(path = %request.url.path()))]
    pub async fn handle(
        &self,
        request: &FetchRequest,
        next: &dyn Fetcher,
    ) -> Result<BufferedResponse> {
        match self.decide(request) {
            EdgeDecision::PassThrough(reason) => {
                debug!("Passing through: {}", reason);
                next.fetch(request).await
            }
            EdgeDecision::Prerender => {
                let outgoing = self.prerender_request(request)?;
                info!("Prerendering {} via {}", request.url, outgoing.url);
                match self.client.fetch(&outgoing).await {
                    Ok(response) => Ok(response),
                    Err(e) if self.fallback_on_error => {
                        warn!("Prerender service failed, passing through: {}", e);
                        next.fetch(request).await
                    }
                    Err(e) => {
                        warn!("Prerender service failed: {}", e);
                        Err(e)
                    }
                }
            }
        }
    }
}
