use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use hyper::StatusCode;
use storefront_edge::config::WorkerConfig;
use storefront_edge::prelude::*;
use storefront_edge::response::FETCHED_ON_HEADER;
use storefront_edge::testing::ScriptedFetcher;
use url::Url;

const ORIGIN: &str = "https://shop.test";
const PRECACHE: &[&str] = &["/", "/static/js/bundle.js", "/logo192.png"];

struct Harness {
    worker: CacheWorker,
    network: Arc<ScriptedFetcher>,
    storage: Arc<MemoryCacheStorage>,
    clock: ManualClock,
}

fn harness(version: &str, storage: Arc<MemoryCacheStorage>) -> Harness {
    let network = Arc::new(ScriptedFetcher::new());
    for path in PRECACHE {
        network.respond(&format!("{}{}", ORIGIN, path), BufferedResponse::ok(format!("asset {}", path)));
    }
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap());
    let config = WorkerConfig {
        version: version.to_string(),
        precache: PRECACHE.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    };
    let worker = CacheWorker::new(
        &config,
        &Url::parse(ORIGIN).unwrap(),
        storage.clone(),
        network.clone(),
    )
    .unwrap()
    .with_clock(Arc::new(clock.clone()));

    Harness {
        worker,
        network,
        storage,
        clock,
    }
}

async fn activated() -> Harness {
    let h = harness("v1", Arc::new(MemoryCacheStorage::new()));
    h.worker.install().await.unwrap();
    h.worker.activate().await.unwrap();
    h
}

#[tokio::test]
async fn api_entry_is_served_from_cache_inside_the_window() {
    let h = activated().await;
    let url = "https://shop.test/api/products/7";
    h.network.respond(url, BufferedResponse::ok("{\"v\":1}"));
    let req = FetchRequest::get(url).unwrap();

    let mut first = h.worker.handle_fetch(&req).await.unwrap();
    assert_eq!(first.source, FetchSource::Network);
    first.settle().await;

    h.network.respond(url, BufferedResponse::ok("{\"v\":2}"));
    h.clock.advance(Duration::seconds(4 * 60 + 59));
    let second = h.worker.handle_fetch(&req).await.unwrap();
    assert_eq!(second.source, FetchSource::Cache);
    assert_eq!(&second.response.body[..], b"{\"v\":1}");
    assert_eq!(h.network.calls(url), 1);
}

#[tokio::test]
async fn api_entry_is_refetched_and_restamped_after_the_window() {
    let h = activated().await;
    let url = "https://shop.test/api/products/7";
    h.network.respond(url, BufferedResponse::ok("{\"v\":1}"));
    let req = FetchRequest::get(url).unwrap();
    let cached_at = h.clock.now();

    h.worker.handle_fetch(&req).await.unwrap().settle().await;
    h.network.respond(url, BufferedResponse::ok("{\"v\":2}"));
    h.clock.advance(Duration::seconds(5 * 60 + 1));

    let mut refreshed = h.worker.handle_fetch(&req).await.unwrap();
    refreshed.settle().await;
    assert_eq!(refreshed.source, FetchSource::Network);
    assert_eq!(&refreshed.response.body[..], b"{\"v\":2}");
    assert_eq!(h.network.calls(url), 2);

    let names = h.worker.names().clone();
    let entry = h
        .storage
        .match_in(&names.runtime, &req.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.fetched_on, Some(cached_at + Duration::seconds(5 * 60 + 1)));
    assert_eq!(&entry.response.body[..], b"{\"v\":2}");
}

#[tokio::test]
async fn api_caller_gets_unstamped_response_while_store_is_stamped() {
    let h = activated().await;
    let url = "https://shop.test/api/categories";
    h.network.respond(url, BufferedResponse::ok("[]"));
    let req = FetchRequest::get(url).unwrap();

    let mut outcome = h.worker.handle_fetch(&req).await.unwrap();
    assert!(outcome.response.header(FETCHED_ON_HEADER).is_none());
    outcome.settle().await;

    let cached = h.worker.handle_fetch(&req).await.unwrap();
    assert_eq!(cached.source, FetchSource::Cache);
    assert_eq!(cached.response.fetched_on(), Some(h.clock.now()));
}

#[tokio::test]
async fn api_network_failure_does_not_fall_back_to_stale_entry() {
    let h = activated().await;
    let url = "https://shop.test/api/products";
    h.network.respond(url, BufferedResponse::ok("[1]"));
    let req = FetchRequest::get(url).unwrap();
    h.worker.handle_fetch(&req).await.unwrap().settle().await;

    h.clock.advance(Duration::minutes(10));
    h.network.fail(url);
    let result = h.worker.handle_fetch(&req).await;
    assert!(matches!(result, Err(InterceptError::Network(_))));
}

#[tokio::test]
async fn featured_products_twice_within_two_minutes_hits_network_once() {
    let h = activated().await;
    let url = "https://shop.test/api/products?featured=true";
    h.network.respond(url, BufferedResponse::ok("[{\"id\":1,\"featured\":true}]"));
    let before = h.network.total_calls();

    let req = FetchRequest::get(url).unwrap();
    let mut first = h.worker.handle_fetch(&req).await.unwrap();
    first.settle().await;
    h.clock.advance(Duration::minutes(2));
    let second = h.worker.handle_fetch(&FetchRequest::get(url).unwrap()).await.unwrap();

    assert_eq!(first.response.body, second.response.body);
    assert_eq!(second.source, FetchSource::Cache);
    assert_eq!(h.network.total_calls() - before, 1);
}

#[tokio::test]
async fn image_hit_is_served_stale_then_refreshed() {
    let h = activated().await;
    let url = "https://shop.test/images/banner.jpg";
    h.network.respond(url, BufferedResponse::ok("old-bytes"));
    let req = FetchRequest::get(url).unwrap().with_destination(Destination::Image);

    let mut miss = h.worker.handle_fetch(&req).await.unwrap();
    assert_eq!(miss.source, FetchSource::Network);
    assert!(miss.revalidation.is_none());
    miss.settle().await;

    h.network.respond(url, BufferedResponse::ok("new-bytes"));
    let stale = h.worker.handle_fetch(&req).await.unwrap();
    assert_eq!(stale.source, FetchSource::Cache);
    assert_eq!(&stale.response.body[..], b"old-bytes");
    stale.revalidation.unwrap().await.unwrap();

    let fresh = h.worker.handle_fetch(&req).await.unwrap();
    assert_eq!(&fresh.response.body[..], b"new-bytes");
    assert!(h.worker.stats().revalidations >= 1);
}

#[tokio::test]
async fn image_miss_with_network_failure_propagates() {
    let h = activated().await;
    let url = "https://shop.test/images/missing.png";
    h.network.fail(url);
    let req = FetchRequest::get(url).unwrap().with_destination(Destination::Image);
    assert!(h.worker.handle_fetch(&req).await.is_err());
}

#[tokio::test]
async fn image_under_api_prefix_uses_stale_while_revalidate() {
    let h = activated().await;
    let url = "https://shop.test/api/products/1/image";
    h.network.respond(url, BufferedResponse::ok("png"));
    let req = FetchRequest::get(url).unwrap().with_destination(Destination::Image);

    h.worker.handle_fetch(&req).await.unwrap().settle().await;
    // far past the API window; an image hit ignores freshness
    h.clock.advance(Duration::hours(1));
    let outcome = h.worker.handle_fetch(&req).await.unwrap();
    assert_eq!(outcome.source, FetchSource::Cache);
    assert!(outcome.revalidation.is_some());
}

#[tokio::test]
async fn activate_purges_every_store_of_other_versions() {
    let storage = Arc::new(MemoryCacheStorage::new());
    storage.open("A-v1").await.unwrap();
    storage.open("B-v1").await.unwrap();

    let h = harness("v2", storage.clone());
    h.worker.install().await.unwrap();
    let deleted = h.worker.activate().await.unwrap();

    assert_eq!(deleted, vec!["A-v1".to_string(), "B-v1".to_string()]);
    assert_eq!(storage.cache_names().await.unwrap(), vec!["storefront-static-v2"]);

    // runtime store appears on first write
    let url = "https://shop.test/api/brands";
    h.network.respond(url, BufferedResponse::ok("[]"));
    h.worker
        .handle_fetch(&FetchRequest::get(url).unwrap())
        .await
        .unwrap()
        .settle()
        .await;
    let mut names = storage.cache_names().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["storefront-runtime-v2", "storefront-static-v2"]);
}

#[tokio::test]
async fn install_fails_whole_when_one_asset_404s() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let h = harness("v1", storage.clone());
    h.network.respond(
        "https://shop.test/static/js/bundle.js",
        BufferedResponse::new(StatusCode::NOT_FOUND, "not found"),
    );

    let result = h.worker.install().await;
    assert!(matches!(result, Err(InterceptError::Install(_))));
    assert_eq!(h.worker.state(), WorkerState::Redundant);
    assert_eq!(storage.len("storefront-static-v1").await, 0);
    assert!(h.worker.activate().await.is_err());
}

#[tokio::test]
async fn install_precaches_every_asset() {
    let h = harness("v1", Arc::new(MemoryCacheStorage::new()));
    h.worker.install().await.unwrap();
    assert_eq!(h.storage.len("storefront-static-v1").await, PRECACHE.len());
}

#[tokio::test]
async fn default_strategy_falls_back_to_cache_when_offline() {
    let h = activated().await;
    // "/" was precached at install
    h.network.fail("https://shop.test/");
    let outcome = h
        .worker
        .handle_fetch(&FetchRequest::get("https://shop.test/").unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.source, FetchSource::CacheFallback);
    assert_eq!(&outcome.response.body[..], b"asset /");
    assert_eq!(h.worker.stats().offline_fallbacks, 1);
}

#[tokio::test]
async fn default_strategy_propagates_failure_without_cached_copy() {
    let h = activated().await;
    h.network.fail("https://shop.test/account");
    let result = h
        .worker
        .handle_fetch(&FetchRequest::get("https://shop.test/account").unwrap())
        .await;
    assert!(matches!(result, Err(InterceptError::Network(_))));
}

#[tokio::test]
async fn default_strategy_prefers_network_when_online() {
    let h = activated().await;
    h.network.respond("https://shop.test/", BufferedResponse::ok("fresh shell"));
    let outcome = h
        .worker
        .handle_fetch(&FetchRequest::get("https://shop.test/").unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.source, FetchSource::Network);
    assert_eq!(&outcome.response.body[..], b"fresh shell");
}
