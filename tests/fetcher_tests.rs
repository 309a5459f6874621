//! Integration tests for the Armory fetcher against a mock HTTP server.

use armory_spyder::fetch::{build_http_client, ArmoryFetcher, BackoffPolicy, Fetch, FetchError};
use armory_spyder::CacheStore;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A fetcher with a fast retry policy and no session probe.
fn test_fetcher(cache: CacheStore) -> ArmoryFetcher {
    let policy = BackoffPolicy {
        attempts: 3,
        initial: Duration::from_millis(1),
        increment: Duration::from_millis(1),
    };
    let client = build_http_client("ArmorySpyderTest/0.1").unwrap();
    ArmoryFetcher::new(client, cache, policy, None)
}

#[tokio::test]
async fn test_fetch_returns_page_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guild-info.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("<guildInfo/>"))
        .mount(&server)
        .await;

    let mut fetcher = test_fetcher(CacheStore::new());
    let url = format!("{}/guild-info.xml", server.uri());
    let body = fetcher.fetch(&url).await.unwrap();
    assert_eq!(body, b"<guildInfo/>");
}

#[tokio::test]
async fn test_gzip_body_is_decompressed_and_cached_compressed() {
    let server = MockServer::start().await;
    let page = b"<?xml version=\"1.0\"?><arenaLadder maxPage=\"3\"/>";
    let compressed = gzip(page);
    Mock::given(method("GET"))
        .and(path("/arena-ladder.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(compressed.clone()))
        .mount(&server)
        .await;

    let cache = CacheStore::new();
    let mut fetcher = test_fetcher(cache.clone());
    let url = format!("{}/arena-ladder.xml", server.uri());

    let body = fetcher.fetch(&url).await.unwrap();
    assert_eq!(body, page);

    // The cache holds the wire bytes, not the decoded page.
    assert_eq!(cache.get(&url), Some(compressed));
}

#[tokio::test]
async fn test_not_found_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/team-info.xml"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = test_fetcher(CacheStore::new());
    let url = format!("{}/team-info.xml", server.uri());
    let err = fetcher.fetch(&url).await.unwrap_err();

    assert!(matches!(err, FetchError::NotFound { .. }));
    // expect(1) on the mock verifies no retry happened.
}

#[tokio::test]
async fn test_transient_failures_retry_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guild-info.xml"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guild-info.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("<guildInfo/>"))
        .mount(&server)
        .await;

    let mut fetcher = test_fetcher(CacheStore::new());
    let url = format!("{}/guild-info.xml", server.uri());
    let body = fetcher.fetch(&url).await.unwrap();
    assert_eq!(body, b"<guildInfo/>");
}

#[tokio::test]
async fn test_retry_budget_exhaustion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guild-info.xml"))
        .respond_with(ResponseTemplate::new(503))
        // Initial attempt plus three retries.
        .expect(4)
        .mount(&server)
        .await;

    let mut fetcher = test_fetcher(CacheStore::new());
    let url = format!("{}/guild-info.xml", server.uri());
    let err = fetcher.fetch(&url).await.unwrap_err();

    assert!(matches!(err, FetchError::Unavailable { attempts: 3, .. }));
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/character-sheet.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("<characterInfo/>"))
        .mount(&server)
        .await;

    let cache = CacheStore::new();
    let mut fetcher = test_fetcher(cache.clone());
    let url = format!("{}/character-sheet.xml", server.uri());

    assert_eq!(fetcher.fetch(&url).await.unwrap(), b"<characterInfo/>");
    assert_eq!(fetcher.fetch(&url).await.unwrap(), b"<characterInfo/>");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    // Flushing the cache forces the next fetch back to the network.
    cache.clear();
    assert_eq!(fetcher.fetch(&url).await.unwrap(), b"<characterInfo/>");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_session_probe_fires_once_before_first_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login-status.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("<loginStatus/>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guild-info.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("<guildInfo/>"))
        .expect(2)
        .mount(&server)
        .await;

    let policy = BackoffPolicy {
        attempts: 1,
        initial: Duration::from_millis(1),
        increment: Duration::from_millis(1),
    };
    let client = build_http_client("ArmorySpyderTest/0.1").unwrap();
    let probe = format!("{}/login-status.xml", server.uri());
    let mut fetcher = ArmoryFetcher::new(client, CacheStore::new(), policy, Some(probe));

    // Two fetches, but the probe runs only before the first.
    let first = format!("{}/guild-info.xml?p=1", server.uri());
    let second = format!("{}/guild-info.xml?p=2", server.uri());
    fetcher.fetch(&first).await.unwrap();
    fetcher.fetch(&second).await.unwrap();
}
