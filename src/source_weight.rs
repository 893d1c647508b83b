//! Source-Weight Learner (§4.J).
//!
//! Per-source engagement and update-cadence scoring grounded on
//! `strategy/edge.rs`'s `EdgeConfig` (a fixed lookup table with a
//! documented default, here generalized from market categories to source
//! ids) composed with the Fan-out Fetcher's response-shape adapters.

use crate::cache::Cache;
use crate::engine::fan_out::{extract_items, source_id_of};
use crate::error::Result;
use crate::scoring::platform_baseline;
use crate::types::{parse_timestamp, NewsItem, SourceWeight, SourceWeightMap};
use crate::upstream::UpstreamClient;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// Cache key the learned `source_id -> record` map is written to, per §6.
pub const SOURCE_WEIGHTS_CACHE_KEY: &str = "heatsight:heatscore:source_weights";

const BASE_WEIGHT_COEFF: f64 = 0.5;
const ENGAGEMENT_COEFF: f64 = 0.3;
const UPDATE_FREQUENCY_COEFF: f64 = 0.2;
const WEIGHT_FLOOR: f64 = 10.0;
const WEIGHT_CEIL: f64 = 100.0;

/// Engagement-normalization baseline, §4.J — the platform-popularity table
/// from §4.F.3 plus two sources that only matter for engagement scoring.
fn engagement_baseline(source_id: &str) -> f64 {
    match source_id {
        "bilibili" => 3000.0,
        "36kr" => 2000.0,
        other => platform_baseline(other),
    }
}

/// Fixed per-source base weight table, §4.J.
fn base_weight(source_id: &str) -> f64 {
    match source_id {
        "weibo" => 90.0,
        "baidu" => 88.0,
        "zhihu" => 86.0,
        "toutiao" => 85.0,
        "bilibili" | "douyin" => 80.0,
        "36kr" => 85.0,
        "wsj" => 82.0,
        "bbc" => 78.0,
        "v2ex" => 68.0,
        "hn" => 65.0,
        "github" => 60.0,
        _ => 50.0,
    }
}

/// Average normalized engagement across `items`, §4.J.
fn average_engagement_score(items: &[NewsItem], source_id: &str) -> f64 {
    let baseline = engagement_baseline(source_id);
    let total: f64 = items
        .iter()
        .map(|item| {
            let raw = item.metrics.as_ref().map(|m| m.engagement_raw()).unwrap_or(0.0);
            (raw / baseline * 100.0).min(100.0)
        })
        .sum();
    total / items.len() as f64
}

/// Map an average inter-publish interval to a discrete score, §4.J.
fn interval_to_score(avg_hours: f64) -> f64 {
    let avg_minutes = avg_hours * 60.0;
    if avg_minutes <= 5.0 {
        100.0
    } else if avg_minutes <= 10.0 {
        90.0
    } else if avg_minutes <= 30.0 {
        80.0
    } else if avg_minutes <= 60.0 {
        70.0
    } else if avg_minutes <= 120.0 {
        60.0
    } else if avg_hours <= 4.0 {
        50.0
    } else {
        40.0
    }
}

/// Update-cadence score from the first five items' publish timestamps
/// (assumed newest-first, as the upstream feed returns them), §4.J. Falls
/// back to 50 when fewer than five items carry a parseable timestamp.
fn update_frequency_score(items: &[NewsItem]) -> f64 {
    if items.len() < 5 {
        return 50.0;
    }
    let timestamps: Vec<DateTime<Utc>> = items
        .iter()
        .take(5)
        .filter_map(|i| parse_timestamp(&i.published_at).ok())
        .collect();
    if timestamps.len() < 5 {
        return 50.0;
    }

    let intervals: Vec<f64> = timestamps
        .windows(2)
        .map(|w| ((w[0] - w[1]).num_seconds() as f64 / 3600.0).abs())
        .collect();
    let avg_hours = intervals.iter().sum::<f64>() / intervals.len() as f64;
    interval_to_score(avg_hours)
}

/// Learn one source's weight record from its recent items, §4.J. Returns
/// `None` if the source has no items (the caller skips it entirely).
fn learn_one(source_id: &str, items: &[NewsItem], now: DateTime<Utc>) -> Option<SourceWeight> {
    if items.is_empty() {
        return None;
    }

    let avg_engagement = average_engagement_score(items, source_id);
    let update_frequency = update_frequency_score(items);
    let base = base_weight(source_id);

    let weight = (BASE_WEIGHT_COEFF * base
        + ENGAGEMENT_COEFF * avg_engagement
        + UPDATE_FREQUENCY_COEFF * update_frequency)
        .clamp(WEIGHT_FLOOR, WEIGHT_CEIL);

    Some(SourceWeight {
        weight,
        avg_engagement,
        update_frequency,
        item_count: items.len() as u32,
        updated_at: now,
    })
}

fn parse_items(raw: &[Value]) -> Vec<NewsItem> {
    raw.iter()
        .filter_map(|v| match serde_json::from_value(v.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("skipping malformed item during source-weight learning: {e}");
                None
            }
        })
        .collect()
}

/// Fetch every source's recent items, learn a weight record for each, and
/// write the full map to the cache, per §4.J. Per-source fetch failures are
/// logged and that source is simply omitted from the result.
pub async fn update_source_weights(
    client: &UpstreamClient,
    cache: &Cache,
    now: DateTime<Utc>,
) -> Result<SourceWeightMap> {
    let sources_response = client.get_sources(false).await?;
    let descriptors = UpstreamClient::extract_sources_list(&sources_response);

    let mut map = SourceWeightMap::new();
    for descriptor in &descriptors {
        let Some(source_id) = source_id_of(descriptor) else {
            continue;
        };

        let response = match client.get_source(&source_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!("source-weight fetch failed for {source_id}: {e}");
                continue;
            }
        };

        let items = parse_items(&extract_items(&response));
        if let Some(record) = learn_one(&source_id, &items, now) {
            map.insert(source_id, record);
        }
    }

    cache
        .set_json(SOURCE_WEIGHTS_CACHE_KEY, &map, cache.ttls.source_weight_secs)
        .await?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metrics;

    fn item(published_at: &str, metrics: Option<Metrics>) -> NewsItem {
        NewsItem {
            id: "n".into(),
            source_id: "weibo".into(),
            title: "t".into(),
            url: "u".into(),
            published_at: published_at.into(),
            content: None,
            metrics,
            category: None,
            metadata: None,
        }
    }

    #[test]
    fn test_base_weight_known_sources() {
        assert_eq!(base_weight("weibo"), 90.0);
        assert_eq!(base_weight("bilibili"), 80.0);
        assert_eq!(base_weight("unknown_blog"), 50.0);
    }

    #[test]
    fn test_engagement_baseline_extends_platform_table() {
        assert_eq!(engagement_baseline("bilibili"), 3000.0);
        assert_eq!(engagement_baseline("36kr"), 2000.0);
        assert_eq!(engagement_baseline("weibo"), 10_000.0);
    }

    #[test]
    fn test_average_engagement_score_averages_across_items() {
        let items = vec![
            item(
                "2024-01-01T00:00:00Z",
                Some(Metrics {
                    view_count: Some(10_000.0),
                    ..Default::default()
                }),
            ),
            item("2024-01-01T00:00:00Z", None),
        ];
        // weibo baseline 10000: item 1 -> 100, item 2 -> 0. Average 50.
        assert_eq!(average_engagement_score(&items, "weibo"), 50.0);
    }

    #[test]
    fn test_update_frequency_default_when_fewer_than_five_items() {
        let items = vec![item("2024-01-01T00:00:00Z", None); 3];
        assert_eq!(update_frequency_score(&items), 50.0);
    }

    #[test]
    fn test_update_frequency_fast_cadence_scores_100() {
        let items = vec![
            item("2024-01-01T00:20:00Z", None),
            item("2024-01-01T00:16:00Z", None),
            item("2024-01-01T00:12:00Z", None),
            item("2024-01-01T00:08:00Z", None),
            item("2024-01-01T00:04:00Z", None),
        ];
        // 4-minute gaps throughout -> average well under 5 minutes.
        assert_eq!(update_frequency_score(&items), 100.0);
    }

    #[test]
    fn test_update_frequency_slow_cadence_scores_40() {
        let items = vec![
            item("2024-01-01T20:00:00Z", None),
            item("2024-01-01T15:00:00Z", None),
            item("2024-01-01T10:00:00Z", None),
            item("2024-01-01T05:00:00Z", None),
            item("2024-01-01T00:00:00Z", None),
        ];
        assert_eq!(update_frequency_score(&items), 40.0);
    }

    #[test]
    fn test_learn_one_none_for_empty_items() {
        assert!(learn_one("weibo", &[], Utc::now()).is_none());
    }

    #[test]
    fn test_learn_one_weight_within_bounds() {
        let items = vec![
            item(
                "2024-01-01T00:00:00Z",
                Some(Metrics {
                    view_count: Some(1.0),
                    ..Default::default()
                }),
            );
            2
        ];
        let record = learn_one("some_unknown_source", &items, Utc::now()).unwrap();
        assert!((WEIGHT_FLOOR..=WEIGHT_CEIL).contains(&record.weight));
        assert_eq!(record.item_count, 2);
    }
}
