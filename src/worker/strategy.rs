use crate::request::{Destination, FetchRequest};

/// How an intercepted fetch is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve the cached copy at once and refresh it in the background.
    StaleWhileRevalidate,
    /// Serve from cache while the entry is younger than the freshness window.
    TimeBoxed,
    /// Go to the network; fall back to any cached copy when offline.
    NetworkFirst,
}

/// Picks the strategy for a request. The image check runs first, so an
/// image served from under the API prefix is still an image.
pub fn classify(request: &FetchRequest, api_prefix: &str) -> Strategy {
    if request.destination == Destination::Image {
        Strategy::StaleWhileRevalidate
    } else if request.path().starts_with(api_prefix) {
        Strategy::TimeBoxed
    } else {
        Strategy::NetworkFirst
    }
}
