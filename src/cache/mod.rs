//! Cache layer (§4.B): a thin Redis client with transparent fallback to an
//! in-process store when Redis is unreachable at startup.
//!
//! Grounded on `proerror77-Nova`'s `feed-service/src/cache.rs` for the
//! `ConnectionManager` + `SETEX`/`GET`/`SCAN`/`DEL` command shapes, and on
//! `engine/enricher.rs`'s `ContextCache` for the TTL-table / JSON-envelope
//! convenience layer built on top.

use crate::error::{HeatlinkError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Namespaced TTLs used by the rest of the crate, per §4.B/§4.H/§4.J.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub upstream_get_secs: u64,
    pub heat_score_secs: u64,
    pub trending_secs: u64,
    pub source_weight_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            upstream_get_secs: 300,
            heat_score_secs: 600,
            trending_secs: 7200,
            source_weight_secs: 86_400,
        }
    }
}

#[async_trait]
trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    async fn dbsize(&self) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// Redis backend
// ---------------------------------------------------------------------------

struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("redis connect failed: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("GET {key} failed: {e}")))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs)
            .arg(value)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("SETEX {key} failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("DEL {key} failed: {e}")))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("EXISTS {key} failed: {e}")))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut self.conn.clone())
                .await
                .map_err(|e| HeatlinkError::CacheUnavailable(format!("SCAN failed: {e}")))?;
            found.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }

    async fn dbsize(&self) -> Result<u64> {
        redis::cmd("DBSIZE")
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("DBSIZE failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// In-memory fallback
// ---------------------------------------------------------------------------

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Single-process store used when Redis cannot be reached. Not shared across
/// replicas; intended purely to keep the service running degraded rather
/// than failing every cached operation.
struct InMemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryBackend {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut map = self.entries.lock().unwrap();
        if let Some(entry) = map.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
            map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs.max(1)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, e)| e.expires_at > now && k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn dbsize(&self) -> Result<u64> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.expires_at > now)
            .count() as u64)
    }
}

// ---------------------------------------------------------------------------
// Public facade
// ---------------------------------------------------------------------------

/// Cache handle used by the rest of the crate. Falls back to an in-process
/// store transparently if Redis is unreachable at construction time, rather
/// than failing startup outright.
pub struct Cache {
    backend: Box<dyn CacheBackend>,
    pub ttls: CacheTtls,
}

impl Cache {
    pub async fn connect(redis_url: &str, ttls: CacheTtls) -> Self {
        match RedisBackend::connect(redis_url).await {
            Ok(backend) => {
                debug!("connected to redis cache backend");
                Self {
                    backend: Box::new(backend),
                    ttls,
                }
            }
            Err(e) => {
                warn!("redis unavailable ({e}), falling back to in-memory cache");
                Self {
                    backend: Box::new(InMemoryBackend::new()),
                    ttls,
                }
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.backend.set(key, value, ttl_secs).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key).await
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.backend.keys(pattern).await
    }

    pub async fn dbsize(&self) -> Result<u64> {
        self.backend.dbsize().await
    }

    /// Deserialize a cached JSON value, treating malformed JSON as a miss
    /// rather than an error (an upstream schema change shouldn't take the
    /// whole cache down).
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("discarding unparseable cache entry {key}: {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| HeatlinkError::CacheUnavailable(format!("serialize {key}: {e}")))?;
        self.set(key, &raw, ttl_secs).await
    }
}
