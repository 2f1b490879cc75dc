//! Requests as seen by the interceptors.
//!
//! A [`FetchRequest`] is a fully buffered request: method, absolute URL,
//! headers, body and the destination the page intends to use the response
//! for. Both the edge router and the cache worker operate on this type.

use std::fmt;

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, HOST, USER_AGENT};
use hyper::{Body, HeaderMap, Method, Request};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::InterceptError;
use crate::Result;

/// Header browsers use to announce a request's destination.
pub const SEC_FETCH_DEST: &str = "sec-fetch-dest";

/// What the page is going to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

impl Destination {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "script" | "worker" | "sharedworker" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            _ => Destination::Other,
        }
    }

    /// Reads `Sec-Fetch-Dest`; requests without it are `Other`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(SEC_FETCH_DEST)
            .and_then(|v| v.to_str().ok())
            .map(Destination::parse)
            .unwrap_or_default()
    }
}

/// Normalized request identity used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.to_string(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET.as_str()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub destination: Destination,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            destination: Destination::Other,
        }
    }

    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| InterceptError::InvalidInput(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| InterceptError::InvalidInput(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// `scheme://host[:port]` of the request URL.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    /// Buffers an incoming server request. Only the path and query of the
    /// request target are used; scheme and authority always come from
    /// `origin`.
    pub async fn from_hyper(req: Request<Body>, origin: &Url) -> Result<Self> {
        let (parts, body) = req.into_parts();
        let mut url = origin.clone();
        url.set_path(parts.uri.path());
        url.set_query(parts.uri.query());
        let body = hyper::body::to_bytes(body).await?;
        let destination = Destination::from_headers(&parts.headers);

        Ok(Self {
            method: parts.method,
            url,
            headers: parts.headers,
            body,
            destination,
        })
    }

    /// Builds an outgoing client request. `Host` is left for the client to
    /// derive from the target URL.
    pub fn to_hyper(&self) -> Result<Request<Body>> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str());
        for (name, value) in self.headers.iter() {
            if name == HOST {
                continue;
            }
            builder = builder.header(name, value);
        }
        builder
            .body(Body::from(self.body.clone()))
            .map_err(|e| InterceptError::InvalidInput(e.to_string()))
    }
}
