//! Upstream client integration tests against a real HTTP server (wiremock),
//! exercising the cached-GET contract and retry-on-5xx behavior end to end
//! rather than just the pure helper functions already unit-tested in
//! `src/upstream/mod.rs`.

use heatlink::cache::{Cache, CacheTtls};
use heatlink::upstream::UpstreamClient;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_against(server: &MockServer) -> UpstreamClient {
    // No real Redis is reachable here; `Cache::connect` falls back to its
    // in-process backend transparently, per §4.B.
    let cache = Arc::new(Cache::connect("redis://127.0.0.1:1/0", CacheTtls::default()).await);
    UpstreamClient::new(server.uri(), 5, cache).expect("client construction should succeed")
}

#[tokio::test]
async fn test_get_sources_only_hits_upstream_once_when_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/external/sources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sources": [{"source_id": "weibo"}, {"source_id": "zhihu"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(&server).await;

    let first = client.get_sources(false).await.unwrap();
    let second = client.get_sources(false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(UpstreamClient::extract_sources_list(&first).len(), 2);
    // `expect(1)` on the mock is verified when `server` drops; a second
    // network call here would fail that expectation.
}

#[tokio::test]
async fn test_get_sources_force_refresh_bypasses_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/external/sources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sources": []})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_against(&server).await;

    client.get_sources(false).await.unwrap();
    client.get_sources(true).await.unwrap();
}

#[tokio::test]
async fn test_transient_5xx_is_retried_then_succeeds() {
    let server = MockServer::start().await;

    // First two attempts return 503, the third succeeds — verifies the
    // retry-with-backoff loop rather than failing outright on one 5xx.
    Mock::given(method("GET"))
        .and(path("/external/source/weibo"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/external/source/weibo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"news": [{"id": "n1"}]})))
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let result = client.get_source("weibo").await.unwrap();
    assert_eq!(result["news"][0]["id"], "n1");
}

#[tokio::test]
async fn test_persistent_4xx_is_not_retried_and_reports_bad_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/external/source/unknown"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let err = client.get_source("unknown").await.unwrap_err();
    assert!(err.to_string().contains("404"));
}
