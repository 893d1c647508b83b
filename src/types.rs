//! Core data model: transient upstream items, persisted heat scores, and the
//! cached-only trending/source-weight records.
//!
//! Timestamp discipline (see `DESIGN.md`): `published_at` on `NewsItem` is
//! kept as the raw upstream string since upstream is inconsistent about
//! offset notation; `parse_timestamp` is the single place that turns it into
//! an aware `DateTime<Utc>`. Persisted timestamps on `HeatScore` are
//! `NaiveDateTime` — naive-UTC instants, with offsets stripped on write by
//! the store (§4.C). Keeping these as two distinct Rust types makes the
//! naive/aware boundary a compiler-checked fact instead of a convention.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use uuid::Uuid;

/// Clamp a score into the canonical `[0, 100]` heat range.
pub fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Render a naive-UTC instant as an offset-bearing ISO-8601 string
/// (`...Z`) for API responses. The store keeps these fields as
/// `NaiveDateTime` internally (§3, §9's naive/aware split) — this is the
/// one point where that naive value is dressed back up as an aware UTC
/// instant on the way out over HTTP, per §6: "timestamps in API responses
/// are ISO-8601 with offset."
fn serialize_naive_as_utc<S>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Utc.from_utc_datetime(dt)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .serialize(serializer)
}

// ---------------------------------------------------------------------------
// Transient upstream types
// ---------------------------------------------------------------------------

/// Engagement metrics as reported by a single upstream source. Any subset
/// may be present; §4.F.3 picks the first present of view/like/comment/heat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub view_count: Option<f64>,
    #[serde(default)]
    pub like_count: Option<f64>,
    #[serde(default)]
    pub comment_count: Option<f64>,
    #[serde(default)]
    pub share_count: Option<f64>,
    #[serde(default)]
    pub heat: Option<f64>,
}

impl Metrics {
    /// First present of view/like/comment/heat, per §4.F.3.
    pub fn popularity_raw(&self) -> Option<f64> {
        self.view_count
            .or(self.like_count)
            .or(self.comment_count)
            .or(self.heat)
    }

    /// Weighted engagement raw value for the source-weight learner, §4.J.
    pub fn engagement_raw(&self) -> f64 {
        self.view_count.unwrap_or(0.0) * 1.0
            + self.like_count.unwrap_or(0.0) * 3.0
            + self.comment_count.unwrap_or(0.0) * 5.0
            + self.share_count.unwrap_or(0.0) * 10.0
    }
}

/// A single upstream-supplied news record. Transient — never persisted as
/// such; only the derived `HeatScore` is written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub url: String,
    /// Raw upstream timestamp string; parse with [`parse_timestamp`].
    pub published_at: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Parse a `published_at` string tolerant of `Z`, explicit offset, and
/// naive (assumed-UTC) representations, per §4.F.2.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let normalized = if raw.ends_with('Z') {
        format!("{}+00:00", &raw[..raw.len() - 1])
    } else {
        raw.to_string()
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Naive string (no offset) — assume UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(format!("unrecognised timestamp format: {raw}"))
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordType {
    Keyword,
    Phrase,
    Topic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub weight: f64,
    #[serde(rename = "type")]
    pub kind: KeywordType,
}

// ---------------------------------------------------------------------------
// HeatScore (persisted)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatScoreMetaData {
    pub cross_source_score: f64,
    pub source_weight: f64,
    pub category: String,
    /// First five keyword words, for quick display without decoding the
    /// full `keywords` list.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatScore {
    pub id: Uuid,
    pub news_id: String,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub heat_score: f64,
    pub relevance_score: f64,
    pub recency_score: f64,
    pub popularity_score: f64,
    pub meta_data: HeatScoreMetaData,
    pub keywords: Vec<Keyword>,
    /// Naive-UTC instant internally; serialized as an offset-bearing UTC
    /// string over the wire, see [`serialize_naive_as_utc`].
    #[serde(serialize_with = "serialize_naive_as_utc")]
    pub published_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_naive_as_utc")]
    pub calculated_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_naive_as_utc")]
    pub updated_at: NaiveDateTime,
}

impl HeatScore {
    /// True iff every score field satisfies invariant (i) in §3.
    pub fn scores_in_range(&self) -> bool {
        [
            self.heat_score,
            self.relevance_score,
            self.recency_score,
            self.popularity_score,
        ]
        .iter()
        .all(|s| (0.0..=100.0).contains(s))
    }
}

// ---------------------------------------------------------------------------
// Cached-only aggregates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingEntry {
    pub keyword: String,
    pub heat: f64,
    pub count: u32,
    pub sources: Vec<String>,
    #[serde(rename = "type")]
    pub kind: KeywordType,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWeight {
    pub weight: f64,
    pub avg_engagement: f64,
    pub update_frequency: f64,
    pub item_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// `source_id -> SourceWeight`, as cached by §4.J.
pub type SourceWeightMap = HashMap<String, SourceWeight>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_z_suffix() {
        let dt = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_offset() {
        let dt = parse_timestamp("2024-01-01T08:00:00+08:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_naive_assumed_utc() {
        let dt = parse_timestamp("2024-01-01T00:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp("not-a-date").is_err());
    }

    #[test]
    fn test_metrics_popularity_raw_precedence() {
        let m = Metrics {
            view_count: None,
            like_count: Some(50.0),
            comment_count: Some(10.0),
            share_count: None,
            heat: Some(5.0),
        };
        assert_eq!(m.popularity_raw(), Some(50.0));
    }

    #[test]
    fn test_metrics_engagement_raw() {
        let m = Metrics {
            view_count: Some(10.0),
            like_count: Some(2.0),
            comment_count: Some(1.0),
            share_count: Some(1.0),
            heat: None,
        };
        // 10*1 + 2*3 + 1*5 + 1*10 = 31
        assert_eq!(m.engagement_raw(), 31.0);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(150.0), 100.0);
        assert_eq!(clamp_score(-10.0), 0.0);
        assert_eq!(clamp_score(42.0), 42.0);
    }

    #[test]
    fn test_heat_score_scores_in_range() {
        let hs = HeatScore {
            id: Uuid::new_v4(),
            news_id: "n1".into(),
            source_id: "weibo".into(),
            title: "t".into(),
            url: "u".into(),
            heat_score: 49.0,
            relevance_score: 0.0,
            recency_score: 100.0,
            popularity_score: 100.0,
            meta_data: HeatScoreMetaData {
                cross_source_score: 0.0,
                source_weight: 90.0,
                category: "social".into(),
                keywords: vec![],
            },
            keywords: vec![],
            published_at: Utc::now().naive_utc(),
            calculated_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        };
        assert!(hs.scores_in_range());
    }

    #[test]
    fn test_heat_score_serializes_timestamps_with_utc_offset() {
        let naive = NaiveDateTime::parse_from_str("2024-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let hs = HeatScore {
            id: Uuid::new_v4(),
            news_id: "n1".into(),
            source_id: "weibo".into(),
            title: "t".into(),
            url: "u".into(),
            heat_score: 49.0,
            relevance_score: 0.0,
            recency_score: 100.0,
            popularity_score: 100.0,
            meta_data: HeatScoreMetaData {
                cross_source_score: 0.0,
                source_weight: 90.0,
                category: "social".into(),
                keywords: vec![],
            },
            keywords: vec![],
            published_at: naive,
            calculated_at: naive,
            updated_at: naive,
        };
        let json = serde_json::to_value(&hs).unwrap();
        assert_eq!(json["published_at"], "2024-01-01T00:00:00Z");
        assert_eq!(json["calculated_at"], "2024-01-01T00:00:00Z");
        assert_eq!(json["updated_at"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_keyword_serialization_type_tag() {
        let kw = Keyword {
            word: "测试".into(),
            weight: 1.0,
            kind: KeywordType::Topic,
        };
        let json = serde_json::to_value(&kw).unwrap();
        assert_eq!(json["type"], "topic");
    }
}
