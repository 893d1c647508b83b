//! Fan-out Fetcher (§4.G): bounded-concurrency fetch across all sources.
//!
//! The chunked-concurrency shape is grounded on `engine/scanner.rs`'s
//! `MarketRouter::scan_all` (`tokio::join!` over a fixed platform set,
//! tolerant of individual failures); generalized here to an arbitrary list
//! of sources processed in fixed-size chunks rather than a fixed tuple.

use crate::upstream::UpstreamClient;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Sources are fetched this many at a time.
const CHUNK_CONCURRENCY: usize = 3;
/// Per-source fetch timeout.
const PER_SOURCE_TIMEOUT_SECS: u64 = 10;
/// Cooperative yield between chunks.
const INTER_CHUNK_YIELD_MS: u64 = 100;

/// A source descriptor as returned by `external/sources`. Any of
/// `source_id`/`id`/`key`/`name` may carry the identifier; first present
/// wins.
pub fn source_id_of(descriptor: &Value) -> Option<String> {
    descriptor
        .get("source_id")
        .or_else(|| descriptor.get("id"))
        .or_else(|| descriptor.get("key"))
        .or_else(|| descriptor.get("name"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// Locate the item list within a per-source detail response: object key
/// `news`, object key `items`, or a bare top-level array, in that order.
/// `pub(crate)` so the Source-Weight Learner (§4.J) can reuse the same
/// response-shape adapter.
pub(crate) fn extract_items(response: &Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get("news")
            .or_else(|| map.get("items"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Fetch all sources in chunks of [`CHUNK_CONCURRENCY`], each bounded by
/// [`PER_SOURCE_TIMEOUT_SECS`]. A chunk's per-source failures are logged
/// and skipped; they never affect sibling sources. Returns a flat list of
/// raw item JSON values, each stamped with its `source_id`.
pub async fn fetch_all(client: &UpstreamClient, sources: &[Value]) -> Vec<Value> {
    let mut all_items = Vec::new();

    for chunk in sources.chunks(CHUNK_CONCURRENCY) {
        let fetches = chunk.iter().filter_map(|descriptor| {
            let source_id = source_id_of(descriptor)?;
            Some(fetch_one(client, source_id))
        });

        let results = futures::future::join_all(fetches).await;
        for items in results {
            all_items.extend(items);
        }

        tokio::time::sleep(Duration::from_millis(INTER_CHUNK_YIELD_MS)).await;
    }

    all_items
}

async fn fetch_one(client: &UpstreamClient, source_id: String) -> Vec<Value> {
    let fetch = client.get_source(&source_id);
    match tokio::time::timeout(Duration::from_secs(PER_SOURCE_TIMEOUT_SECS), fetch).await {
        Ok(Ok(response)) => extract_items(&response)
            .into_iter()
            .map(|mut item| {
                if let Value::Object(ref mut map) = item {
                    map.insert("source_id".to_string(), Value::String(source_id.clone()));
                }
                item
            })
            .collect(),
        Ok(Err(e)) => {
            warn!("fetch failed for source {source_id}: {e}");
            Vec::new()
        }
        Err(_) => {
            warn!("fetch timed out for source {source_id} after {PER_SOURCE_TIMEOUT_SECS}s");
            Vec::new()
        }
    }
}
