use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Body, HeaderMap, Response, StatusCode};

use crate::error::InterceptError;
use crate::Result;

/// Header stamped on stored API responses, holding the write time.
pub const FETCHED_ON_HEADER: &str = "sw-fetched-on";

/// A response whose body has been read into memory, so it can be both
/// stored and returned.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| InterceptError::InvalidInput(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| InterceptError::InvalidInput(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Copy of this response carrying the freshness header.
    pub fn stamped(&self, at: DateTime<Utc>) -> Self {
        let mut copy = self.clone();
        let stamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&stamp) {
            copy.headers
                .insert(HeaderName::from_static(FETCHED_ON_HEADER), value);
        }
        copy
    }

    /// Parses the freshness header, if present and well formed.
    pub fn fetched_on(&self) -> Option<DateTime<Utc>> {
        self.header(FETCHED_ON_HEADER)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    pub async fn from_hyper(resp: Response<Body>) -> Result<Self> {
        let (parts, body) = resp.into_parts();
        let body = hyper::body::to_bytes(body).await?;
        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    pub fn into_hyper(self) -> Response<Body> {
        let mut resp = Response::new(Body::from(self.body));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp
    }
}
