//! HeatLink upstream API client (§4.A).
//!
//! Request shape and retry semantics are grounded on the upstream
//! `HeatLinkAPIClient` this crate talks to: `heatlink:{prefix}:{sorted
//! k=v}` cache keys, a per-endpoint default TTL table, and 3 attempts with
//! exponential backoff on failure. The `reqwest::Client` construction and
//! response-handling style follow `platforms/metaculus.rs`.

use crate::cache::Cache;
use crate::error::{HeatlinkError, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 10;

/// Per-endpoint-kind default cache TTLs, mirroring the original client's
/// `cache_config` table.
#[derive(Debug, Clone, Copy)]
pub enum EndpointKind {
    HotNews,
    Sources,
    SourceDetail,
    UnifiedNews,
    Search,
    SourceTypes,
    SourcesStats,
}

impl EndpointKind {
    fn prefix(self) -> &'static str {
        match self {
            EndpointKind::HotNews => "hot_news",
            EndpointKind::Sources => "sources",
            EndpointKind::SourceDetail => "source_detail",
            EndpointKind::UnifiedNews => "unified_news",
            EndpointKind::Search => "search",
            EndpointKind::SourceTypes => "source_types",
            EndpointKind::SourcesStats => "sources_stats",
        }
    }

    fn default_ttl_secs(self) -> u64 {
        match self {
            EndpointKind::HotNews => 300,
            EndpointKind::Sources => 3600,
            EndpointKind::SourceDetail => 600,
            EndpointKind::UnifiedNews => 300,
            EndpointKind::Search => 180,
            EndpointKind::SourceTypes => 3600,
            EndpointKind::SourcesStats => 1800,
        }
    }
}

/// Compose the request URL from the configured base URL and an endpoint
/// path, collapsing an accidental duplicated `/api/` segment at the join
/// point — callers sometimes configure `HEATLINK_API_URL` already ending in
/// `/api` and then pass endpoints that also start with `api/`, per §4.A.
fn compose_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');

    if base.ends_with("/api") && path.starts_with("api/") {
        format!("{base}/{}", &path["api/".len()..])
    } else {
        format!("{base}/{path}")
    }
}

/// Build the `heatlink:{prefix}:{sorted k=v pairs}` cache key, trailing
/// colon stripped when there are no params.
fn cache_key(prefix: &str, params: &[(&str, String)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let param_str = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(":");
    format!("heatlink:{prefix}:{param_str}")
        .trim_end_matches(':')
        .to_string()
}

/// Thin client over the HeatLink aggregation API, with a transparent
/// cached-GET layer and retry-with-backoff on transient failures.
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    cache: std::sync::Arc<Cache>,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64, cache: std::sync::Arc<Cache>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| HeatlinkError::ConfigInvalid(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            cache,
        })
    }

    /// Cached GET with retry-with-backoff, mirroring `HeatLinkAPIClient.get`.
    async fn get_cached(
        &self,
        endpoint: &str,
        kind: EndpointKind,
        params: &[(&str, String)],
        force_refresh: bool,
    ) -> Result<Value> {
        let key = cache_key(kind.prefix(), params);

        if !force_refresh {
            if let Some(cached) = self.cache.get_json::<Value>(&key).await? {
                debug!("cache hit for {key}");
                return Ok(cached);
            }
            debug!("cache miss for {key}");
        }

        let value = self.get_with_retry(endpoint, params).await?;
        self.cache
            .set_json(&key, &value, kind.default_ttl_secs())
            .await?;
        Ok(value)
    }

    async fn get_with_retry(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = compose_url(&self.base_url, endpoint);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_once(&url, params).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= MAX_ATTEMPTS || !e.is_retryable() => return Err(e),
                Err(e) => {
                    let backoff = Duration::from_secs(
                        (BACKOFF_BASE_SECS * 2u64.pow(attempt - 1)).min(BACKOFF_CAP_SECS),
                    );
                    warn!("upstream GET {url} attempt {attempt} failed ({e}), retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn get_once(&self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .query(params)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| HeatlinkError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HeatlinkError::UpstreamBadStatus {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| HeatlinkError::UpstreamMalformed(e.to_string()))
    }

    // -----------------------------------------------------------------
    // Convenience endpoints
    // -----------------------------------------------------------------

    pub async fn get_hot_news(&self, hot_limit: u32, recommended_limit: u32, category_limit: u32) -> Result<Value> {
        let params = vec![
            ("hot_limit", hot_limit.to_string()),
            ("recommended_limit", recommended_limit.to_string()),
            ("category_limit", category_limit.to_string()),
        ];
        self.get_cached("external/hot", EndpointKind::HotNews, &params, false)
            .await
    }

    pub async fn get_sources(&self, force_refresh: bool) -> Result<Value> {
        self.get_cached("external/sources", EndpointKind::Sources, &[], force_refresh)
            .await
    }

    pub async fn get_source(&self, source_id: &str) -> Result<Value> {
        let encoded = urlencoding::encode(source_id);
        self.get_cached(
            &format!("external/source/{encoded}"),
            EndpointKind::SourceDetail,
            &[("source_id", source_id.to_string())],
            false,
        )
        .await
    }

    pub async fn get_source_types(&self) -> Result<Value> {
        self.get_cached("external/source-types", EndpointKind::SourceTypes, &[], false)
            .await
    }

    pub async fn get_unified_news(
        &self,
        page: u32,
        page_size: u32,
        category: Option<&str>,
        source_id: Option<&str>,
    ) -> Result<Value> {
        let mut params = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
            ("sort_by", "published_at".to_string()),
            ("sort_order", "desc".to_string()),
        ];
        if let Some(c) = category {
            params.push(("category", c.to_string()));
        }
        if let Some(s) = source_id {
            params.push(("source_id", s.to_string()));
        }
        self.get_cached("external/unified", EndpointKind::UnifiedNews, &params, false)
            .await
    }

    pub async fn search_news(&self, query: &str, page: u32, page_size: u32) -> Result<Value> {
        let params = vec![
            ("query", query.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        self.get_cached("external/search", EndpointKind::Search, &params, false)
            .await
    }

    pub async fn get_sources_stats(&self) -> Result<Value> {
        self.get_cached("external/sources-stats", EndpointKind::SourcesStats, &[], false)
            .await
    }

    /// Locate the source-descriptor list within a `sources` response: a bare
    /// array, or an object wrapping it under `sources`, per §6.
    pub fn extract_sources_list(value: &Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items.clone(),
            Value::Object(map) => map
                .get("sources")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Deserialize a response that may be a bare JSON array or an object
    /// wrapping the list under `items`/`data`/`results`/`news` — upstream is
    /// inconsistent about this across endpoints.
    pub fn extract_item_list<T: DeserializeOwned>(value: &Value) -> Result<Vec<T>> {
        let list_value = match value {
            Value::Array(_) => value,
            Value::Object(map) => map
                .get("items")
                .or_else(|| map.get("data"))
                .or_else(|| map.get("results"))
                .or_else(|| map.get("news"))
                .ok_or_else(|| {
                    HeatlinkError::UpstreamMalformed(
                        "response object has no recognised item-list field".to_string(),
                    )
                })?,
            _ => {
                return Err(HeatlinkError::UpstreamMalformed(
                    "response is neither an array nor an object".to_string(),
                ))
            }
        };

        serde_json::from_value(list_value.clone())
            .map_err(|e| HeatlinkError::UpstreamMalformed(format!("item list decode: {e}")))
    }
}

impl HeatlinkError {
    fn is_retryable(&self) -> bool {
        matches!(self, HeatlinkError::UpstreamUnavailable(_))
            || matches!(self, HeatlinkError::UpstreamBadStatus { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_url_plain_join() {
        assert_eq!(
            compose_url("https://api.heatlink.io", "external/hot"),
            "https://api.heatlink.io/external/hot"
        );
    }

    #[test]
    fn test_compose_url_collapses_duplicated_api_segment() {
        assert_eq!(
            compose_url("https://api.heatlink.io/api", "api/external/hot"),
            "https://api.heatlink.io/api/external/hot"
        );
    }

    #[test]
    fn test_compose_url_trims_slashes() {
        assert_eq!(
            compose_url("https://api.heatlink.io/", "/external/hot"),
            "https://api.heatlink.io/external/hot"
        );
    }

    #[test]
    fn test_cache_key_sorts_and_formats_params() {
        let key = cache_key("unified_news", &[("b", "2".into()), ("a", "1".into())]);
        assert_eq!(key, "heatlink:unified_news:a=1:b=2");
    }

    #[test]
    fn test_cache_key_no_params_strips_trailing_colon() {
        let key = cache_key("sources", &[]);
        assert_eq!(key, "heatlink:sources");
    }

    #[test]
    fn test_extract_item_list_from_bare_array() {
        let v: Value = serde_json::json!([{"x": 1}, {"x": 2}]);
        let items: Vec<serde_json::Value> = UpstreamClient::extract_item_list(&v).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_extract_item_list_from_wrapped_object() {
        let v: Value = serde_json::json!({"items": [{"x": 1}]});
        let items: Vec<serde_json::Value> = UpstreamClient::extract_item_list(&v).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_extract_item_list_rejects_unrecognised_shape() {
        let v: Value = serde_json::json!({"foo": "bar"});
        let err = UpstreamClient::extract_item_list::<serde_json::Value>(&v);
        assert!(err.is_err());
    }

    #[test]
    fn test_extract_sources_list_from_bare_array() {
        let v = serde_json::json!([{"id": "weibo"}, {"id": "zhihu"}]);
        assert_eq!(UpstreamClient::extract_sources_list(&v).len(), 2);
    }

    #[test]
    fn test_extract_sources_list_from_wrapped_object() {
        let v = serde_json::json!({"sources": [{"id": "weibo"}]});
        assert_eq!(UpstreamClient::extract_sources_list(&v).len(), 1);
    }

    #[test]
    fn test_extract_sources_list_unrecognised_shape_is_empty() {
        let v = serde_json::json!({"foo": "bar"});
        assert_eq!(UpstreamClient::extract_sources_list(&v).len(), 0);
    }

    #[test]
    fn test_endpoint_kind_default_ttls() {
        assert_eq!(EndpointKind::HotNews.default_ttl_secs(), 300);
        assert_eq!(EndpointKind::Sources.default_ttl_secs(), 3600);
        assert_eq!(EndpointKind::Search.default_ttl_secs(), 180);
    }
}
