//! Crate-wide error types.
//!
//! One variant per error kind distinguished in the design: upstream failures
//! are split into transport/status/decode so callers can tell "the feed is
//! down" from "the feed rejected us" from "the feed sent us garbage".
//! Per-item and per-task errors carry enough context to log and skip without
//! aborting the surrounding batch or scheduler loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeatlinkError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream returned error status {status}: {message}")]
    UpstreamBadStatus { status: u16, message: String },

    #[error("upstream response malformed: {0}")]
    UpstreamMalformed(String),

    #[error("cache unavailable, falling back to in-process cache: {0}")]
    CacheUnavailable(String),

    #[error("transient store error: {0}")]
    StoreTransient(String),

    #[error("permanent store error: {0}")]
    StorePermanent(String),

    #[error("scoring error for item {news_id} ({title:?}, source {source_id}): {message}")]
    ItemScoringError {
        news_id: String,
        title: String,
        source_id: String,
        message: String,
    },

    #[error("task {task} timed out after {elapsed_secs}s")]
    TaskTimeout { task: String, elapsed_secs: u64 },

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, HeatlinkError>;
