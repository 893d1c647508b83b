//! Persistent heat-score store (§4.C), backed by Postgres.
//!
//! Query shape (plain `sqlx::query_as` with positional binds, `map_err` into
//! a crate error) is grounded on `proerror77-Nova`'s
//! `auth-service/src/db/users.rs`. Timestamps are written and read as
//! `NaiveDateTime` — callers are responsible for stripping offsets before
//! calling `create`/`update`, per the naive/aware split documented in
//! `types.rs`.

use crate::error::{HeatlinkError, Result};
use crate::types::{HeatScore, HeatScoreMetaData, Keyword};
use chrono::{NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// `get_multi_by_news_ids` issues one query per chunk of this size to stay
/// well under Postgres' bind-parameter limit.
const MULTI_LOOKUP_CHUNK_SIZE: usize = 100;

/// Deterministic cache key for a bulk `news_ids` lookup: the ids are sorted
/// first so two requests for the same set in different orders share a
/// cache entry, then hashed so the key has a bounded length regardless of
/// how many ids were requested.
pub fn bulk_cache_key(news_ids: &[String]) -> String {
    let mut sorted: Vec<&str> = news_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(sorted.join(",").as_bytes());
    format!("heatsight:heatscore:bulk:{:x}", hasher.finalize())
}

#[derive(Debug, FromRow)]
struct HeatScoreRow {
    id: Uuid,
    news_id: String,
    source_id: String,
    title: String,
    url: String,
    heat_score: f64,
    relevance_score: f64,
    recency_score: f64,
    popularity_score: f64,
    meta_data: serde_json::Value,
    keywords: serde_json::Value,
    published_at: NaiveDateTime,
    calculated_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl TryFrom<HeatScoreRow> for HeatScore {
    type Error = HeatlinkError;

    fn try_from(row: HeatScoreRow) -> Result<Self> {
        let meta_data: HeatScoreMetaData = serde_json::from_value(row.meta_data)
            .map_err(|e| HeatlinkError::StorePermanent(format!("decoding meta_data: {e}")))?;
        let keywords: Vec<Keyword> = serde_json::from_value(row.keywords)
            .map_err(|e| HeatlinkError::StorePermanent(format!("decoding keywords: {e}")))?;

        Ok(HeatScore {
            id: row.id,
            news_id: row.news_id,
            source_id: row.source_id,
            title: row.title,
            url: row.url,
            heat_score: row.heat_score,
            relevance_score: row.relevance_score,
            recency_score: row.recency_score,
            popularity_score: row.popularity_score,
            meta_data,
            keywords,
            published_at: row.published_at,
            calculated_at: row.calculated_at,
            updated_at: row.updated_at,
        })
    }
}

/// Sort key accepted by `get_top`, per §4.C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    HeatScore,
    PublishedAt,
    CalculatedAt,
}

impl SortBy {
    fn column(self) -> &'static str {
        match self {
            SortBy::HeatScore => "heat_score",
            SortBy::PublishedAt => "published_at",
            SortBy::CalculatedAt => "calculated_at",
        }
    }
}

/// Filters accepted by `get_top`. `None` fields are unconstrained.
///
/// `category` accepts a comma-separated list per §4.C; multiple categories
/// are combined with logical OR over `meta_data.category`.
#[derive(Debug, Clone, Default)]
pub struct TopFilter {
    pub category: Option<String>,
    pub source_id: Option<String>,
    pub min_heat: Option<f64>,
    pub max_age_hours: Option<i64>,
}

impl TopFilter {
    fn category_list(&self) -> Option<Vec<String>> {
        self.category.as_ref().map(|c| {
            c.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}

pub struct HeatScoreStore {
    pool: PgPool,
}

impl HeatScoreStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| HeatlinkError::StoreTransient(format!("connecting to database: {e}")))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| HeatlinkError::StorePermanent(format!("running migrations: {e}")))
    }

    pub async fn create(&self, score: &HeatScore) -> Result<HeatScore> {
        let meta_data = serde_json::to_value(&score.meta_data)
            .map_err(|e| HeatlinkError::StorePermanent(format!("encoding meta_data: {e}")))?;
        let keywords = serde_json::to_value(&score.keywords)
            .map_err(|e| HeatlinkError::StorePermanent(format!("encoding keywords: {e}")))?;

        let row = sqlx::query_as::<_, HeatScoreRow>(
            r#"
            INSERT INTO news_heat_scores
                (id, news_id, source_id, title, url, heat_score, relevance_score,
                 recency_score, popularity_score, meta_data, keywords,
                 published_at, calculated_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(score.id)
        .bind(&score.news_id)
        .bind(&score.source_id)
        .bind(&score.title)
        .bind(&score.url)
        .bind(score.heat_score)
        .bind(score.relevance_score)
        .bind(score.recency_score)
        .bind(score.popularity_score)
        .bind(meta_data)
        .bind(keywords)
        .bind(score.published_at)
        .bind(score.calculated_at)
        .bind(score.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HeatlinkError::StoreTransient(format!("inserting heat score: {e}")))?;

        row.try_into()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<HeatScore>> {
        let row = sqlx::query_as::<_, HeatScoreRow>("SELECT * FROM news_heat_scores WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HeatlinkError::StoreTransient(format!("fetching by id: {e}")))?;

        row.map(TryInto::try_into).transpose()
    }

    /// Most recently calculated score for a news item, per §4.C.
    pub async fn get_latest_by_news_id(&self, news_id: &str) -> Result<Option<HeatScore>> {
        let row = sqlx::query_as::<_, HeatScoreRow>(
            "SELECT * FROM news_heat_scores WHERE news_id = $1 ORDER BY calculated_at DESC LIMIT 1",
        )
        .bind(news_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HeatlinkError::StoreTransient(format!("fetching latest by news_id: {e}")))?;

        row.map(TryInto::try_into).transpose()
    }

    /// Latest score per `news_id`, batched to stay under the bind-parameter
    /// limit for large id lists.
    pub async fn get_multi_by_news_ids(&self, news_ids: &[String]) -> Result<Vec<HeatScore>> {
        let mut out = Vec::with_capacity(news_ids.len());
        for chunk in news_ids.chunks(MULTI_LOOKUP_CHUNK_SIZE) {
            let rows = sqlx::query_as::<_, HeatScoreRow>(
                r#"
                SELECT DISTINCT ON (news_id) *
                FROM news_heat_scores
                WHERE news_id = ANY($1)
                ORDER BY news_id, calculated_at DESC
                "#,
            )
            .bind(chunk)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HeatlinkError::StoreTransient(format!("batch fetching by news_id: {e}")))?;

            for row in rows {
                out.push(row.try_into()?);
            }
        }
        Ok(out)
    }

    /// Filtered, sorted, paginated top scores, per §4.C/§4.I. `category ==
    /// $1` is checked with `= ANY`, so a single-element list behaves exactly
    /// like an equality filter and a multi-element list is an OR.
    pub async fn get_top(
        &self,
        filter: &TopFilter,
        sort_by: SortBy,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HeatScore>> {
        let categories = filter.category_list();
        let min_published_at = filter
            .max_age_hours
            .map(|hours| Utc::now().naive_utc() - chrono::Duration::hours(hours));

        let query = format!(
            r#"
            SELECT * FROM news_heat_scores
            WHERE ($1::text[] IS NULL OR meta_data->>'category' = ANY($1))
              AND ($2::text IS NULL OR source_id = $2)
              AND ($3::double precision IS NULL OR heat_score >= $3)
              AND ($4::timestamp IS NULL OR published_at >= $4)
            ORDER BY {} DESC
            LIMIT $5 OFFSET $6
            "#,
            sort_by.column()
        );

        let rows = sqlx::query_as::<_, HeatScoreRow>(&query)
            .bind(&categories)
            .bind(&filter.source_id)
            .bind(filter.min_heat)
            .bind(min_published_at)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HeatlinkError::StoreTransient(format!("fetching top scores: {e}")))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Recently-calculated scores at or above `min_heat`, capped at `limit`,
    /// feeding the Trending-Keyword Aggregator (§4.I).
    pub async fn get_recent(
        &self,
        since: NaiveDateTime,
        min_heat: f64,
        limit: i64,
    ) -> Result<Vec<HeatScore>> {
        let rows = sqlx::query_as::<_, HeatScoreRow>(
            r#"
            SELECT * FROM news_heat_scores
            WHERE calculated_at >= $1 AND heat_score >= $2
            ORDER BY calculated_at DESC
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(min_heat)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HeatlinkError::StoreTransient(format!("fetching recent scores: {e}")))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn update(&self, score: &HeatScore) -> Result<HeatScore> {
        let meta_data = serde_json::to_value(&score.meta_data)
            .map_err(|e| HeatlinkError::StorePermanent(format!("encoding meta_data: {e}")))?;
        let keywords = serde_json::to_value(&score.keywords)
            .map_err(|e| HeatlinkError::StorePermanent(format!("encoding keywords: {e}")))?;

        let row = sqlx::query_as::<_, HeatScoreRow>(
            r#"
            UPDATE news_heat_scores
            SET heat_score = $2, relevance_score = $3, recency_score = $4,
                popularity_score = $5, meta_data = $6, keywords = $7,
                updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(score.id)
        .bind(score.heat_score)
        .bind(score.relevance_score)
        .bind(score.recency_score)
        .bind(score.popularity_score)
        .bind(meta_data)
        .bind(keywords)
        .bind(score.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HeatlinkError::StoreTransient(format!("updating heat score: {e}")))?;

        row.try_into()
    }

    /// Rows whose `meta_data.category` is missing or blank, feeding the
    /// category-backfill maintenance task (§3 Lifecycle, §8 invariant 6).
    pub async fn find_missing_category(&self, limit: i64) -> Result<Vec<HeatScore>> {
        let rows = sqlx::query_as::<_, HeatScoreRow>(
            r#"
            SELECT * FROM news_heat_scores
            WHERE meta_data->>'category' IS NULL OR meta_data->>'category' = ''
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HeatlinkError::StoreTransient(format!("fetching rows missing category: {e}")))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Set `meta_data.category` on an existing row in place, without
    /// touching its other fields.
    pub async fn set_category(&self, id: Uuid, category: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE news_heat_scores
            SET meta_data = jsonb_set(meta_data, '{category}', to_jsonb($2::text), true),
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(category)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| HeatlinkError::StoreTransient(format!("backfilling category for {id}: {e}")))?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM news_heat_scores WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| HeatlinkError::StoreTransient(format!("deleting heat score: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_column_mapping() {
        assert_eq!(SortBy::HeatScore.column(), "heat_score");
        assert_eq!(SortBy::PublishedAt.column(), "published_at");
        assert_eq!(SortBy::CalculatedAt.column(), "calculated_at");
    }

    #[test]
    fn test_top_filter_default_is_unconstrained() {
        let f = TopFilter::default();
        assert!(f.category.is_none());
        assert!(f.source_id.is_none());
        assert!(f.min_heat.is_none());
        assert!(f.max_age_hours.is_none());
    }

    #[test]
    fn test_top_filter_category_list_splits_and_trims() {
        let f = TopFilter {
            category: Some("news, technology,social".to_string()),
            ..Default::default()
        };
        assert_eq!(
            f.category_list(),
            Some(vec!["news".to_string(), "technology".to_string(), "social".to_string()])
        );
    }

    #[test]
    fn test_top_filter_category_list_none_when_unset() {
        assert_eq!(TopFilter::default().category_list(), None);
    }
}
