//! Minimal HTTP surface over the core (§6), carried as ambient scaffolding
//! even though request validation and pagination plumbing are explicitly
//! out of scope. Router shape, CORS layer, and error-to-status mapping
//! follow `dashboard/mod.rs`'s axum wiring.

use crate::cache::Cache;
use crate::categories;
use crate::engine::batch_updater;
use crate::error::HeatlinkError;
use crate::source_weight::{self, SOURCE_WEIGHTS_CACHE_KEY};
use crate::store::{HeatScoreStore, SortBy, TopFilter};
use crate::trending::{self, TRENDING_CACHE_KEY};
use crate::types::{HeatScore, SourceWeightMap, TrendingEntry};
use crate::upstream::UpstreamClient;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared handles every handler needs. Cheap to clone: every field is an
/// `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Cache>,
    pub store: Arc<HeatScoreStore>,
    pub client: Arc<UpstreamClient>,
}

/// Build the router, wiring a permissive-by-default CORS layer unless
/// `allowed_origins` names specific origins.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(health))
        .route("/health/details", get(health_details))
        .route("/health/cache", get(health_cache))
        .route("/heat-score/scores", post(scores))
        .route("/heat-score/detailed-scores", post(detailed_scores))
        .route("/heat-score/top", get(top))
        .route("/heat-score/keywords", get(keywords))
        .route("/heat-score/source-weights", get(source_weights))
        .route("/heat-score/update-heat-scores", post(update_heat_scores))
        .route("/heat-score/update-keyword-heat", post(update_keyword_heat))
        .route("/heat-score/update-source-weights", post(update_source_weights))
        .route("/heat-score/update-categories", post(update_categories))
        .route("/external/hot", get(proxy_hot))
        .route("/external/sources", get(proxy_sources))
        .route("/external/source/:source_id", get(proxy_source_detail))
        .route("/external/unified", get(proxy_unified))
        .route("/external/search", get(proxy_search))
        .route("/external/source-types", get(proxy_source_types))
        .route("/external/stats", get(proxy_stats))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// `{detail: string}` body, per §6. Store/cache failures map to 503 since a
/// retry is expected to succeed; malformed/invalid input maps to 400/502.
struct ApiError(HeatlinkError);

impl From<HeatlinkError> for ApiError {
    fn from(e: HeatlinkError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HeatlinkError::ValidationError(_) => StatusCode::BAD_REQUEST,
            HeatlinkError::UpstreamBadStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            HeatlinkError::UpstreamUnavailable(_) | HeatlinkError::UpstreamMalformed(_) => {
                StatusCode::BAD_GATEWAY
            }
            HeatlinkError::CacheUnavailable(_)
            | HeatlinkError::StoreTransient(_)
            | HeatlinkError::TaskTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Liveness probe for the upstream feed API: a force-refreshed `sources`
/// fetch, bypassing the cache so a degraded upstream can't hide behind a
/// stale cached response.
async fn probe_upstream(client: &UpstreamClient) -> bool {
    client.get_sources(true).await.is_ok()
}

async fn health_details(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state.store.get_top(&TopFilter::default(), SortBy::HeatScore, 1, 0).await.is_ok();
    let cache_ok = state.cache.dbsize().await.is_ok();
    let upstream_ok = probe_upstream(&state.client).await;
    Json(serde_json::json!({
        "status": if db_ok && cache_ok && upstream_ok { "ok" } else { "degraded" },
        "database": if db_ok { "ok" } else { "error" },
        "cache": if cache_ok { "ok" } else { "error" },
        "upstream": if upstream_ok { "ok" } else { "error" },
    }))
}

/// Per §6, this probes cache **and** upstream.
async fn health_cache(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let size = state.cache.dbsize().await?;
    let upstream_ok = probe_upstream(&state.client).await;
    Ok(Json(serde_json::json!({
        "status": if upstream_ok { "ok" } else { "degraded" },
        "keys": size,
        "upstream": if upstream_ok { "ok" } else { "error" },
    })))
}

// ---------------------------------------------------------------------------
// Heat scores
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NewsIdsBody {
    news_ids: Vec<String>,
}

async fn scores(
    State(state): State<AppState>,
    Json(body): Json<NewsIdsBody>,
) -> Result<Json<Value>, ApiError> {
    let rows = state.store.get_multi_by_news_ids(&body.news_ids).await?;
    let map: HashMap<String, f64> = rows.into_iter().map(|r| (r.news_id, r.heat_score)).collect();
    Ok(Json(serde_json::json!({ "heat_scores": map })))
}

async fn detailed_scores(
    State(state): State<AppState>,
    Json(body): Json<NewsIdsBody>,
) -> Result<Json<Value>, ApiError> {
    let rows = state.store.get_multi_by_news_ids(&body.news_ids).await?;
    let map: HashMap<String, HeatScore> = rows.into_iter().map(|r| (r.news_id.clone(), r)).collect();
    Ok(Json(serde_json::json!({ "heat_scores": map })))
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    limit: Option<i64>,
    skip: Option<i64>,
    min_score: Option<f64>,
    max_age_hours: Option<i64>,
    category: Option<String>,
}

async fn top(
    State(state): State<AppState>,
    Query(q): Query<TopQuery>,
) -> Result<Json<Vec<HeatScore>>, ApiError> {
    let filter = TopFilter {
        category: q.category,
        source_id: None,
        min_heat: q.min_score,
        max_age_hours: q.max_age_hours,
    };
    let rows = state
        .store
        .get_top(&filter, SortBy::HeatScore, q.limit.unwrap_or(50), q.skip.unwrap_or(0))
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct KeywordsQuery {
    limit: Option<usize>,
    min_heat: Option<f64>,
}

async fn keywords(
    State(state): State<AppState>,
    Query(q): Query<KeywordsQuery>,
) -> Result<Json<Vec<TrendingEntry>>, ApiError> {
    let mut entries: Vec<TrendingEntry> =
        state.cache.get_json(TRENDING_CACHE_KEY).await?.unwrap_or_default();
    if let Some(min_heat) = q.min_heat {
        entries.retain(|e| e.heat >= min_heat);
    }
    entries.truncate(q.limit.unwrap_or(100));
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct SourceWeightsQuery {
    min_weight: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SourceWeightsResponse {
    total_sources: usize,
    sources: Vec<Value>,
}

async fn source_weights(
    State(state): State<AppState>,
    Query(q): Query<SourceWeightsQuery>,
) -> Result<Json<SourceWeightsResponse>, ApiError> {
    let map: SourceWeightMap = state.cache.get_json(SOURCE_WEIGHTS_CACHE_KEY).await?.unwrap_or_default();

    let descriptors = match state.client.get_sources(false).await {
        Ok(v) => UpstreamClient::extract_sources_list(&v),
        Err(e) => {
            warn!("source-weights: fetching upstream source metadata failed: {e}");
            Vec::new()
        }
    };

    let min_weight = q.min_weight.unwrap_or(0.0);
    let mut sources = Vec::new();
    for (source_id, record) in &map {
        if record.weight < min_weight {
            continue;
        }
        let descriptor = descriptors
            .iter()
            .find(|d| crate::engine::fan_out::source_id_of(d).as_deref() == Some(source_id.as_str()))
            .cloned()
            .unwrap_or(Value::Null);

        sources.push(serde_json::json!({
            "source_id": source_id,
            "weight": record.weight,
            "avg_engagement": record.avg_engagement,
            "update_frequency": record.update_frequency,
            "item_count": record.item_count,
            "updated_at": record.updated_at,
            "metadata": descriptor,
        }));
    }

    Ok(Json(SourceWeightsResponse {
        total_sources: sources.len(),
        sources,
    }))
}

// ---------------------------------------------------------------------------
// Background triggers
// ---------------------------------------------------------------------------

/// Shared shape for the four `update-*` trigger responses, per §6.
fn accepted(message: &str) -> Json<Value> {
    Json(serde_json::json!({
        "status": "accepted",
        "message": message,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Enqueue a full batch update and return immediately.
async fn update_heat_scores(State(state): State<AppState>) -> Json<Value> {
    let client = state.client.clone();
    let store = state.store.clone();
    let cache = state.cache.clone();

    tokio::spawn(async move {
        let written = batch_updater::run_batch_update(&client, &store, &cache, Utc::now()).await;
        info!(count = written.len(), "background heat-score update finished");
    });

    accepted("heat-score update enqueued")
}

/// Enqueue a trending-keyword re-aggregation and return immediately.
async fn update_keyword_heat(State(state): State<AppState>) -> Json<Value> {
    let store = state.store.clone();
    let cache = state.cache.clone();

    tokio::spawn(async move {
        match trending::update_trending_keywords(&store, &cache, Utc::now()).await {
            Ok(entries) => info!(count = entries.len(), "background trending-keyword update finished"),
            Err(e) => warn!("background trending-keyword update failed: {e}"),
        }
    });

    accepted("keyword-heat update enqueued")
}

/// Enqueue a source-weight re-learning pass and return immediately.
async fn update_source_weights(State(state): State<AppState>) -> Json<Value> {
    let client = state.client.clone();
    let cache = state.cache.clone();

    tokio::spawn(async move {
        match source_weight::update_source_weights(&client, &cache, Utc::now()).await {
            Ok(map) => info!(count = map.len(), "background source-weight update finished"),
            Err(e) => warn!("background source-weight update failed: {e}"),
        }
    });

    accepted("source-weight update enqueued")
}

/// Enqueue the category-backfill maintenance task and return immediately.
async fn update_categories(State(state): State<AppState>) -> Json<Value> {
    let store = state.store.clone();

    tokio::spawn(async move {
        match categories::backfill_categories(&store).await {
            Ok(fixed) => info!(fixed, "background category backfill finished"),
            Err(e) => warn!("background category backfill failed: {e}"),
        }
    });

    accepted("category backfill enqueued")
}

// ---------------------------------------------------------------------------
// Upstream proxy passthroughs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HotQuery {
    hot_limit: Option<u32>,
    recommended_limit: Option<u32>,
    category_limit: Option<u32>,
}

async fn proxy_hot(State(state): State<AppState>, Query(q): Query<HotQuery>) -> Result<Json<Value>, ApiError> {
    let v = state
        .client
        .get_hot_news(q.hot_limit.unwrap_or(20), q.recommended_limit.unwrap_or(10), q.category_limit.unwrap_or(10))
        .await?;
    Ok(Json(v))
}

async fn proxy_sources(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.client.get_sources(false).await?))
}

async fn proxy_source_detail(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.client.get_source(&source_id).await?))
}

#[derive(Debug, Deserialize)]
struct UnifiedQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    category: Option<String>,
    source_id: Option<String>,
}

async fn proxy_unified(
    State(state): State<AppState>,
    Query(q): Query<UnifiedQuery>,
) -> Result<Json<Value>, ApiError> {
    let v = state
        .client
        .get_unified_news(
            q.page.unwrap_or(1),
            q.page_size.unwrap_or(20),
            q.category.as_deref(),
            q.source_id.as_deref(),
        )
        .await?;
    Ok(Json(v))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: String,
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn proxy_search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let v = state.client.search_news(&q.query, q.page.unwrap_or(1), q.page_size.unwrap_or(20)).await?;
    Ok(Json(v))
}

async fn proxy_source_types(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.client.get_source_types().await?))
}

async fn proxy_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.client.get_sources_stats().await?))
}
