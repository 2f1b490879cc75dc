//! In-memory fakes for driving the interceptors without a network.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::error::InterceptError;
use crate::network::Fetcher;
use crate::request::FetchRequest;
use crate::response::BufferedResponse;
use crate::Result;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(BufferedResponse),
    Fail(String),
}

/// A [`Fetcher`] answering from a per-URL script and counting every call.
///
/// URLs without a script fail like an unreachable host.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
    last: Mutex<HashMap<String, FetchRequest>>,
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: BufferedResponse) {
        self.routes
            .lock()
            .insert(normalize(url), Scripted::Respond(response));
    }

    pub fn fail(&self, url: &str) {
        self.routes
            .lock()
            .insert(normalize(url), Scripted::Fail(format!("connection refused: {}", url)));
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(&normalize(url)).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// The most recent request seen for `url`.
    pub fn last_request(&self, url: &str) -> Option<FetchRequest> {
        self.last.lock().get(&normalize(url)).cloned()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<BufferedResponse> {
        let url = request.url.to_string();
        *self.calls.lock().entry(url.clone()).or_insert(0) += 1;
        self.last.lock().insert(url.clone(), request.clone());

        let scripted = self.routes.lock().get(&url).cloned();
        match scripted {
            Some(Scripted::Respond(resp)) => Ok(resp),
            Some(Scripted::Fail(reason)) => Err(InterceptError::Network(reason)),
            None => Err(InterceptError::Network(format!("no route to {}", url))),
        }
    }
}
