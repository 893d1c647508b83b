//! Category-backfill maintenance task (§3 Lifecycle, §8 invariant 6).
//!
//! Scoring always sets `meta_data.category` on insert, but this task exists
//! as a separate pass for rows written before that fallback chain was in
//! place (or by any future writer that skips it) — it re-derives a category
//! from the fixed source map the same way the live scoring path does,
//! grounded on `scoring::category_for_source`, and only ever touches rows
//! where the field is missing or blank.

use crate::error::Result;
use crate::scoring::category_for_source;
use crate::store::HeatScoreStore;
use tracing::{info, warn};

/// Rows are fetched and fixed in batches of this size until none remain.
const BATCH_LIMIT: i64 = 500;

/// Category assigned when the source isn't in the fixed map, matching the
/// live scoring path's final fallback.
const DEFAULT_CATEGORY: &str = "others";

/// Backfill every row with a missing/blank `meta_data.category`. Returns the
/// number of rows fixed. Per-row failures are logged and skipped, never
/// aborting the rest of the pass.
pub async fn backfill_categories(store: &HeatScoreStore) -> Result<usize> {
    let mut fixed = 0;

    loop {
        let rows = store.find_missing_category(BATCH_LIMIT).await?;
        if rows.is_empty() {
            break;
        }

        let batch_len = rows.len();
        for row in rows {
            let category = category_for_source(&row.source_id).unwrap_or(DEFAULT_CATEGORY);
            match store.set_category(row.id, category).await {
                Ok(()) => fixed += 1,
                Err(e) => warn!("category backfill failed for {}: {e}", row.id),
            }
        }

        if (batch_len as i64) < BATCH_LIMIT {
            break;
        }
    }

    info!(fixed, "category backfill finished");
    Ok(fixed)
}
