//! Trending-Keyword Aggregator (§4.I).
//!
//! Grounded on `engine/enricher.rs`'s `HashMap`-keyed accumulation pattern,
//! generalized from a TTL cache into a one-shot aggregation pass over
//! recently-scored rows. The per-type distinct-source thresholds and
//! scaling divisors are fixed in `passes_threshold` and `type_scale` below.

use crate::cache::Cache;
use crate::error::Result;
use crate::store::HeatScoreStore;
use crate::types::{HeatScore, Keyword, KeywordType, TrendingEntry};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Cache key the ranked keyword list is written to, per §6.
pub const TRENDING_CACHE_KEY: &str = "heatsight:heatscore:keywords";

/// Lookback window for candidate rows.
const LOOKBACK_HOURS: i64 = 12;
/// Minimum heat score for a row to contribute keywords.
const MIN_ROW_HEAT: f64 = 20.0;
/// Maximum candidate rows considered.
const MAX_CANDIDATE_ROWS: i64 = 1000;
/// Ranked list is truncated to this many entries.
const MAX_RANKED_ENTRIES: usize = 300;

struct Accumulator {
    count: u32,
    total_weight: f64,
    total_heat: f64,
    sources: HashSet<String>,
    kind: KeywordType,
}

/// Per-type distinct-source (and, for phrases, count) thresholds a keyword
/// must clear to be considered trending at all.
fn passes_threshold(kind: KeywordType, count: u32, distinct_sources: usize) -> bool {
    match kind {
        KeywordType::Topic => distinct_sources >= 2,
        KeywordType::Phrase => distinct_sources >= 2 && count >= 2,
        KeywordType::Keyword => distinct_sources >= 3,
    }
}

/// Divisor applied after the raw heat product, per type — topics and
/// phrases need fewer corroborating sources to reach the same score as a
/// keyword, so they're scaled down less.
fn type_scale(kind: KeywordType) -> f64 {
    match kind {
        KeywordType::Topic => 500.0,
        KeywordType::Phrase => 750.0,
        KeywordType::Keyword => 1000.0,
    }
}

/// Pure aggregation over a set of already-fetched rows: testable without a
/// store or cache. Order of `rows` and of each row's `keywords` does not
/// affect the result, satisfying the idempotence property in §8.
pub fn aggregate(rows: &[HeatScore], now: DateTime<Utc>) -> Vec<TrendingEntry> {
    let mut acc: HashMap<(String, KeywordType), Accumulator> = HashMap::new();

    for row in rows {
        for kw in &row.keywords {
            let Keyword { word, weight, kind } = kw;
            let entry = acc.entry((word.clone(), *kind)).or_insert_with(|| Accumulator {
                count: 0,
                total_weight: 0.0,
                total_heat: 0.0,
                sources: HashSet::new(),
                kind: *kind,
            });
            entry.count += 1;
            entry.total_weight += weight;
            entry.total_heat += row.heat_score;
            entry.sources.insert(row.source_id.clone());
        }
    }

    let mut ranked: Vec<TrendingEntry> = acc
        .into_iter()
        .filter(|((_, kind), a)| passes_threshold(*kind, a.count, a.sources.len()))
        .map(|((word, kind), a)| {
            let avg_weight = a.total_weight / a.count as f64;
            let avg_heat = a.total_heat / a.count as f64;
            let raw = a.count as f64 * avg_weight * avg_heat * a.sources.len() as f64;
            let heat = (raw / type_scale(kind)).min(100.0);

            let mut sources: Vec<String> = a.sources.into_iter().collect();
            sources.sort();

            TrendingEntry {
                keyword: word,
                heat,
                count: a.count,
                sources,
                kind,
                updated_at: now,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.heat
            .partial_cmp(&a.heat)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    ranked.truncate(MAX_RANKED_ENTRIES);
    ranked
}

/// Mine recently-scored rows from the store, rank keywords/phrases/topics,
/// and write the result to the cache, per §4.I.
pub async fn update_trending_keywords(
    store: &HeatScoreStore,
    cache: &Cache,
    now: DateTime<Utc>,
) -> Result<Vec<TrendingEntry>> {
    let since = (now - Duration::hours(LOOKBACK_HOURS)).naive_utc();
    let rows = store.get_recent(since, MIN_ROW_HEAT, MAX_CANDIDATE_ROWS).await?;
    let ranked = aggregate(&rows, now);
    cache
        .set_json(TRENDING_CACHE_KEY, &ranked, cache.ttls.trending_secs)
        .await?;
    Ok(ranked)
}
