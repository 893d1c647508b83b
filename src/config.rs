//! Configuration loading from the process environment.
//!
//! All tuning lives in `.env`/the real environment rather than a TOML file —
//! this is a service meant to run as one process per deploy target, not an
//! agent with a local config file. `.env` is loaded first (non-fatal if
//! missing) exactly as the entry point already did.

use crate::error::{HeatlinkError, Result};
use std::env;

/// Top-level application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub heatlink_api_url: String,
    pub heatlink_api_timeout_secs: u64,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
    pub debug: bool,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Build configuration from environment variables.
    pub fn load() -> Result<Self> {
        let database_url = require_env("DATABASE_URL")?;
        let redis_url = require_env("REDIS_URL")?;
        let heatlink_api_url = require_env("HEATLINK_API_URL")?;

        let heatlink_api_timeout_secs = optional_env("HEATLINK_API_TIMEOUT")
            .map(|v| {
                v.parse::<u64>().map_err(|e| {
                    HeatlinkError::ConfigInvalid(format!(
                        "HEATLINK_API_TIMEOUT must be an integer number of seconds: {e}"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(15);

        let allowed_origins = parse_allowed_origins(
            optional_env("ALLOWED_ORIGINS").as_deref().unwrap_or("*"),
        )?;

        let log_level = optional_env("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let debug = optional_env("DEBUG")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let host = optional_env("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = optional_env("PORT")
            .map(|v| {
                v.parse::<u16>()
                    .map_err(|e| HeatlinkError::ConfigInvalid(format!("PORT invalid: {e}")))
            })
            .transpose()?
            .unwrap_or(8000);

        Ok(Self {
            database_url,
            redis_url,
            heatlink_api_url,
            heatlink_api_timeout_secs,
            allowed_origins,
            log_level,
            debug,
            host,
            port,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| HeatlinkError::ConfigInvalid(format!("missing required env var {name}")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// `ALLOWED_ORIGINS` may be a comma-separated list (`"a,b,c"`) or a JSON
/// array (`'["a","b"]'`); the original service accepts both.
fn parse_allowed_origins(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<String>>(trimmed).map_err(|e| {
            HeatlinkError::ConfigInvalid(format!("ALLOWED_ORIGINS is not valid JSON: {e}"))
        })
    } else {
        Ok(trimmed
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allowed_origins_comma_list() {
        let origins = parse_allowed_origins("https://a.com, https://b.com").unwrap();
        assert_eq!(origins, vec!["https://a.com", "https://b.com"]);
    }

    #[test]
    fn test_parse_allowed_origins_json_array() {
        let origins = parse_allowed_origins(r#"["https://a.com","https://b.com"]"#).unwrap();
        assert_eq!(origins, vec!["https://a.com", "https://b.com"]);
    }

    #[test]
    fn test_parse_allowed_origins_wildcard() {
        let origins = parse_allowed_origins("*").unwrap();
        assert_eq!(origins, vec!["*"]);
    }

    #[test]
    fn test_parse_allowed_origins_invalid_json() {
        assert!(parse_allowed_origins("[not json").is_err());
    }
}
