//! Heat-Score Calculator (§4.F).
//!
//! Config-struct-plus-calculator-plus-tests shape is grounded on
//! `strategy/edge.rs`/`strategy/kelly.rs`. The relevance sub-score is kept
//! pluggable per the open question in `DESIGN.md`: the upstream `search`
//! endpoint the original relied on for this isn't part of the documented
//! surface, so a local batch-matching proxy is the default.

use crate::error::{HeatlinkError, Result};
use crate::text::similarity::is_near_duplicate;
use crate::text::tokenizer::extract_keywords;
use crate::types::{clamp_score, parse_timestamp, HeatScore, HeatScoreMetaData, NewsItem, SourceWeightMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

/// Weight placed on each sub-score in the final weighted sum, §4.F.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub relevance: f64,
    pub recency: f64,
    pub platform: f64,
    pub cross_source: f64,
    pub source: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            relevance: 0.30,
            recency: 0.25,
            platform: 0.15,
            cross_source: 0.20,
            source: 0.10,
        }
    }
}

/// Divisor applied to the summed relevance search hits, §4.F.1.
const RELEVANCE_BASELINE_FACTOR: f64 = 10.0;
/// Number of leading keywords queried for the relevance sub-score.
const RELEVANCE_KEYWORD_COUNT: usize = 3;
/// Cross-source normalization divisor, §4.F.4.
const CROSS_SOURCE_BASELINE: f64 = 10.0;

/// Per-source popularity-normalization baseline, §4.F.3. `pub(crate)` so the
/// Source-Weight Learner (§4.J) can reuse it for its engagement baseline.
pub(crate) fn platform_baseline(source_id: &str) -> f64 {
    match source_id {
        "weibo" => 10_000.0,
        "zhihu" => 5_000.0,
        "toutiao" => 8_000.0,
        _ => 1_000.0,
    }
}

/// Fixed fallback source-weight table, from the glossary.
pub fn fallback_source_weight(source_id: &str) -> f64 {
    match source_id {
        "weibo" => 90.0,
        "baidu" => 90.0,
        "zhihu" => 85.0,
        "toutiao" => 80.0,
        "sina" => 75.0,
        "163" => 70.0,
        "qq" => 70.0,
        "sohu" => 65.0,
        "ifeng" => 65.0,
        _ => 50.0,
    }
}

/// `pub(crate)` so the category-backfill maintenance task (§3 Lifecycle)
/// can derive the same fallback the live scoring path uses.
pub(crate) fn category_for_source(source_id: &str) -> Option<&'static str> {
    match source_id {
        "weibo" => Some("social"),
        "zhihu" => Some("knowledge"),
        "toutiao" => Some("news"),
        "bilibili" => Some("video"),
        "36kr" => Some("technology"),
        _ => None,
    }
}

/// A pluggable source of relevance hit-counts for a keyword, decoupling the
/// relevance sub-score from any one upstream search endpoint.
#[async_trait]
pub trait RelevanceSource: Send + Sync {
    async fn search_count(&self, word: &str) -> Result<f64>;
}

/// Default relevance proxy: counts how many other titles in the current
/// batch contain the keyword, case-insensitively. Used when no live
/// upstream search endpoint is configured.
pub struct LocalBatchRelevanceSource {
    titles: Vec<String>,
}

impl LocalBatchRelevanceSource {
    pub fn new(titles: Vec<String>) -> Self {
        Self { titles }
    }
}

#[async_trait]
impl RelevanceSource for LocalBatchRelevanceSource {
    async fn search_count(&self, word: &str) -> Result<f64> {
        let needle = word.to_lowercase();
        Ok(self
            .titles
            .iter()
            .filter(|t| t.to_lowercase().contains(&needle))
            .count() as f64)
    }
}

pub struct ScoreCalculator<R: RelevanceSource> {
    weights: ScoringWeights,
    relevance: R,
}

impl<R: RelevanceSource> ScoreCalculator<R> {
    pub fn new(weights: ScoringWeights, relevance: R) -> Self {
        Self { weights, relevance }
    }

    /// Score a single item against its batch snapshot. `now` is injected
    /// for deterministic recency computation in tests.
    pub async fn compute(
        &self,
        item: &NewsItem,
        batch: &[NewsItem],
        learned_weights: Option<&SourceWeightMap>,
        now: DateTime<Utc>,
    ) -> Result<HeatScore> {
        let published_at = parse_timestamp(&item.published_at).map_err(|e| {
            HeatlinkError::ItemScoringError {
                news_id: item.id.clone(),
                title: item.title.clone(),
                source_id: item.source_id.clone(),
                message: format!("unparseable published_at: {e}"),
            }
        })?;

        let keywords = extract_keywords(&item.title, item.content.as_deref());

        let relevance_score = self.relevance_score(&keywords).await;
        let recency_score = recency_score(published_at, now);
        let popularity_score = platform_score(item, &item.source_id);
        let cross_source_score = cross_source_score(item, batch);
        let source_weight = source_weight(&item.source_id, learned_weights);

        let heat_score = clamp_score(
            self.weights.relevance * relevance_score
                + self.weights.recency * recency_score
                + self.weights.platform * popularity_score
                + self.weights.cross_source * cross_source_score
                + self.weights.source * source_weight,
        );

        let category = item
            .category
            .clone()
            .or_else(|| category_for_source(&item.source_id).map(String::from))
            .unwrap_or_else(|| "others".to_string());

        let keyword_words = keywords.iter().take(5).map(|k| k.word.clone()).collect();

        Ok(HeatScore {
            id: Uuid::new_v4(),
            news_id: item.id.clone(),
            source_id: item.source_id.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            heat_score,
            relevance_score,
            recency_score,
            popularity_score,
            meta_data: HeatScoreMetaData {
                cross_source_score,
                source_weight,
                category,
                keywords: keyword_words,
            },
            keywords,
            published_at: published_at.naive_utc(),
            calculated_at: now.naive_utc(),
            updated_at: now.naive_utc(),
        })
    }

    async fn relevance_score(&self, keywords: &[crate::types::Keyword]) -> f64 {
        let mut total = 0.0;
        for kw in keywords.iter().take(RELEVANCE_KEYWORD_COUNT) {
            match self.relevance.search_count(&kw.word).await {
                Ok(count) => total += count,
                Err(e) => warn!("relevance lookup failed for '{}': {e}", kw.word),
            }
        }
        clamp_score((total / RELEVANCE_BASELINE_FACTOR * 100.0).min(100.0))
    }
}

/// Exponential recency decay, §4.F.2: `100 * e^(-hours/24)`. Negative
/// (future-dated) timestamps are clamped to zero elapsed hours.
pub fn recency_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - published_at).num_seconds() as f64 / 3600.0;
    let hours = hours.max(0.0);
    clamp_score(100.0 * (-hours / 24.0).exp())
}

/// Platform popularity normalization, §4.F.3.
pub fn platform_score(item: &NewsItem, source_id: &str) -> f64 {
    let raw = item
        .metrics
        .as_ref()
        .and_then(|m| m.popularity_raw())
        .unwrap_or(0.0);
    let baseline = platform_baseline(source_id);
    clamp_score((raw / baseline * 100.0).min(100.0))
}

/// Cross-source frequency, §4.F.4. The distinct-source set always includes
/// the item's own source (its title is trivially a near-duplicate of
/// itself); when that set has only one member — no corroborating source —
/// the score is 0, not `min(1/10*100,100)`, matching §8 scenario 1.
pub fn cross_source_score(item: &NewsItem, batch: &[NewsItem]) -> f64 {
    let sources: HashSet<&str> = batch
        .iter()
        .filter(|other| is_near_duplicate(&other.title, &item.title))
        .map(|other| other.source_id.as_str())
        .collect();

    let distinct = if sources.len() <= 1 { 0 } else { sources.len() };
    clamp_score((distinct as f64 / CROSS_SOURCE_BASELINE * 100.0).min(100.0))
}

/// Source weight from the learner's cached output, falling back to the
/// fixed table when not yet learned, §4.F.5.
pub fn source_weight(source_id: &str, learned: Option<&SourceWeightMap>) -> f64 {
    learned
        .and_then(|map| map.get(source_id))
        .map(|w| w.weight)
        .unwrap_or_else(|| fallback_source_weight(source_id))
}

/// Build the default relevance source for a batch (the local-matching
/// proxy), convenience constructor for callers wiring up the calculator.
pub fn default_calculator(batch: &[NewsItem]) -> ScoreCalculator<LocalBatchRelevanceSource> {
    let titles = batch.iter().map(|i| i.title.clone()).collect();
    ScoreCalculator::new(ScoringWeights::default(), LocalBatchRelevanceSource::new(titles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metrics;
    use chrono::TimeZone;

    fn item(id: &str, source_id: &str, title: &str, published_at: &str, metrics: Option<Metrics>) -> NewsItem {
        NewsItem {
            id: id.into(),
            source_id: source_id.into(),
            title: title.into(),
            url: "u".into(),
            published_at: published_at.into(),
            content: None,
            metrics,
            category: None,
            metadata: None,
        }
    }

    struct ZeroRelevance;
    #[async_trait]
    impl RelevanceSource for ZeroRelevance {
        async fn search_count(&self, _word: &str) -> Result<f64> {
            Ok(0.0)
        }
    }

    #[tokio::test]
    async fn test_scenario_basic_item_heat_49() {
        let it = item(
            "n1",
            "weibo",
            "测试热点：一则示例新闻",
            "2024-01-01T00:00:00Z",
            Some(Metrics {
                view_count: Some(10_000.0),
                ..Default::default()
            }),
        );
        let batch = vec![it.clone()];
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let calc = ScoreCalculator::new(ScoringWeights::default(), ZeroRelevance);
        let score = calc.compute(&it, &batch, None, now).await.unwrap();

        assert_eq!(score.relevance_score, 0.0);
        assert!((score.popularity_score - 100.0).abs() < 1e-9);
        assert_eq!(score.meta_data.cross_source_score, 0.0);
        assert!((score.meta_data.source_weight - 90.0).abs() < 1e-9);
        assert!((score.recency_score - 100.0).abs() < 1e-6);
        assert!((score.heat_score - 49.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_scenario_recency_decay() {
        let it = item(
            "n1",
            "weibo",
            "测试热点：一则示例新闻",
            "2024-01-01T00:00:00Z",
            Some(Metrics {
                view_count: Some(10_000.0),
                ..Default::default()
            }),
        );
        let batch = vec![it.clone()];
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let calc = ScoreCalculator::new(ScoringWeights::default(), ZeroRelevance);
        let score = calc.compute(&it, &batch, None, now).await.unwrap();

        assert!((score.recency_score - 36.79).abs() < 0.1);
        assert!((score.heat_score - 33.20).abs() < 0.1);
    }

    #[test]
    fn test_cross_source_two_matching_one_unrelated() {
        let a = item("a", "weibo", "breaking market news today", "2024-01-01T00:00:00Z", None);
        let b = item("b", "zhihu", "breaking market news today", "2024-01-01T00:00:00Z", None);
        let c = item("c", "toutiao", "unrelated sports result", "2024-01-01T00:00:00Z", None);
        let batch = vec![a.clone(), b.clone(), c.clone()];

        assert_eq!(cross_source_score(&a, &batch), 20.0);
        assert_eq!(cross_source_score(&b, &batch), 20.0);
        assert_eq!(cross_source_score(&c, &batch), 0.0);
    }

    #[test]
    fn test_cross_source_single_item_batch_is_zero() {
        let a = item("a", "weibo", "a lone headline", "2024-01-01T00:00:00Z", None);
        assert_eq!(cross_source_score(&a, &[a.clone()]), 0.0);
    }

    #[test]
    fn test_category_fallback_36kr_technology() {
        let it = item("n1", "36kr", "some headline", "2024-01-01T00:00:00Z", None);
        assert_eq!(category_for_source(&it.source_id), Some("technology"));
    }

    #[test]
    fn test_category_fallback_unknown_source_is_none() {
        assert_eq!(category_for_source("unknown_source"), None);
    }

    #[test]
    fn test_source_weight_uses_learned_over_fallback() {
        use crate::types::SourceWeight;
        use std::collections::HashMap;

        let mut learned: SourceWeightMap = HashMap::new();
        learned.insert(
            "weibo".into(),
            SourceWeight {
                weight: 77.0,
                avg_engagement: 0.0,
                update_frequency: 0.0,
                item_count: 0,
                updated_at: Utc::now(),
            },
        );
        assert_eq!(source_weight("weibo", Some(&learned)), 77.0);
        assert_eq!(source_weight("weibo", None), 90.0);
        assert_eq!(source_weight("unknown", None), 50.0);
    }

    #[test]
    fn test_platform_score_unknown_source_uses_default_baseline() {
        let it = item(
            "n1",
            "some_blog",
            "t",
            "2024-01-01T00:00:00Z",
            Some(Metrics {
                view_count: Some(500.0),
                ..Default::default()
            }),
        );
        assert_eq!(platform_score(&it, "some_blog"), 50.0);
    }

    #[test]
    fn test_recency_score_monotonic_and_equal_for_same_timestamp() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now_a = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let now_b = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let s12 = recency_score(t0, now_a);
        let s24 = recency_score(t0, now_b);
        assert!(s12 > s24);

        let s12_again = recency_score(t0, now_a);
        assert_eq!(s12, s12_again);
    }
}
