//! Batch Updater (§4.H): pull every source, score the combined batch, and
//! persist each result.
//!
//! The try/log/continue accumulation over a batch is grounded on
//! `engine/enricher.rs`'s `enrich_batch` (collect what succeeds, warn and
//! skip what doesn't, never abort the whole run on one bad item).

use crate::cache::Cache;
use crate::engine::fan_out;
use crate::scoring;
use crate::source_weight::SOURCE_WEIGHTS_CACHE_KEY;
use crate::store::HeatScoreStore;
use crate::types::{HeatScore, NewsItem, SourceWeightMap};
use crate::upstream::UpstreamClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Hard timeout on the sources listing fetch, §4.H.
const SOURCES_TIMEOUT_SECS: u64 = 15;

fn parse_batch(raw: &[serde_json::Value]) -> Vec<NewsItem> {
    raw.iter()
        .filter_map(|v| match serde_json::from_value(v.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("skipping malformed item during batch update: {e}");
                None
            }
        })
        .collect()
}

/// Fetch a fresh source list, fan out across them, score the combined batch,
/// and persist each resulting row. Never propagates an error to the caller:
/// any failure along the way is logged and the run simply produces fewer
/// results, per §4.H.
pub async fn run_batch_update(
    client: &UpstreamClient,
    store: &HeatScoreStore,
    cache: &Cache,
    now: DateTime<Utc>,
) -> HashMap<String, HeatScore> {
    let mut written = HashMap::new();

    let sources_response = match tokio::time::timeout(
        Duration::from_secs(SOURCES_TIMEOUT_SECS),
        client.get_sources(true),
    )
    .await
    {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            warn!("batch update: fetching sources failed: {e}");
            return written;
        }
        Err(_) => {
            warn!("batch update: fetching sources timed out after {SOURCES_TIMEOUT_SECS}s");
            return written;
        }
    };

    let descriptors = UpstreamClient::extract_sources_list(&sources_response);
    if descriptors.is_empty() {
        warn!("batch update: sources response contained no sources");
        return written;
    }

    let raw_items = fan_out::fetch_all(client, &descriptors).await;
    if raw_items.is_empty() {
        warn!("batch update: fan-out returned no items");
        return written;
    }

    let batch = parse_batch(&raw_items);
    if batch.is_empty() {
        warn!("batch update: no items survived parsing");
        return written;
    }

    let learned_weights: Option<SourceWeightMap> = cache
        .get_json(SOURCE_WEIGHTS_CACHE_KEY)
        .await
        .unwrap_or_else(|e| {
            warn!("batch update: reading learned source weights failed: {e}");
            None
        });

    let calculator = scoring::default_calculator(&batch);

    for item in &batch {
        let score = match calculator
            .compute(item, &batch, learned_weights.as_ref(), now)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!("batch update: scoring failed for item {}: {e}", item.id);
                continue;
            }
        };

        match store.create(&score).await {
            Ok(persisted) => {
                written.insert(persisted.news_id.clone(), persisted);
            }
            Err(e) => {
                warn!("batch update: persisting score failed for item {}: {e}", item.id);
            }
        }
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_skips_malformed_items() {
        let raw = vec![
            serde_json::json!({
                "id": "n1",
                "source_id": "weibo",
                "title": "t",
                "url": "u",
                "published_at": "2024-01-01T00:00:00Z"
            }),
            serde_json::json!({"not_an_item": true}),
        ];
        let batch = parse_batch(&raw);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "n1");
    }

    #[test]
    fn test_parse_batch_empty_input_is_empty() {
        assert!(parse_batch(&[]).is_empty());
    }
}
