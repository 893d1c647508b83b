//! HeatLink — news heat-scoring and aggregation engine.
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! up the cache/upstream/store layers, registers the background scheduler,
//! and serves the HTTP surface until Ctrl+C.

use anyhow::Context;
use chrono::Utc;
use heatlink::cache::{Cache, CacheTtls};
use heatlink::config::AppConfig;
use heatlink::engine::batch_updater;
use heatlink::http::{self, AppState};
use heatlink::scheduler::Scheduler;
use heatlink::source_weight;
use heatlink::store::HeatScoreStore;
use heatlink::trending;
use heatlink::upstream::UpstreamClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const BANNER: &str = r#"
 _   _            _   _     _       _
| | | | ___  __ _| |_| |   (_)_ __ | | __
| |_| |/ _ \/ _` | __| |   | | '_ \| |/ /
|  _  |  __/ (_| | |_| |___| | | | |   <
|_| |_|\___|\__,_|\__|_____|_|_| |_|_|\_\

  News heat-scoring and aggregation engine
"#;

/// Tasks are registered on these cadences, per §4.K.
const HEAT_UPDATE_INTERVAL_SECS: u64 = 600;
const TRENDING_UPDATE_INTERVAL_SECS: u64 = 3600;
const SOURCE_WEIGHT_UPDATE_INTERVAL_SECS: u64 = 7200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load().context("loading configuration")?;
    init_logging(&cfg);

    println!("{BANNER}");
    info!(host = %cfg.host, port = cfg.port, "HeatLink starting up");

    let cache = Arc::new(Cache::connect(&cfg.redis_url, CacheTtls::default()).await);
    let store = Arc::new(
        HeatScoreStore::connect(&cfg.database_url)
            .await
            .context("connecting to the heat-score store")?,
    );
    store.migrate().await.context("running database migrations")?;
    let client = Arc::new(
        UpstreamClient::new(&cfg.heatlink_api_url, cfg.heatlink_api_timeout_secs, cache.clone())
            .context("building upstream client")?,
    );

    let mut scheduler = Scheduler::new();

    {
        let client = client.clone();
        let store = store.clone();
        let cache = cache.clone();
        scheduler.register(
            "heat-score-update",
            Duration::from_secs(HEAT_UPDATE_INTERVAL_SECS),
            move || {
                let client = client.clone();
                let store = store.clone();
                let cache = cache.clone();
                async move {
                    let written = batch_updater::run_batch_update(&client, &store, &cache, Utc::now()).await;
                    info!(count = written.len(), "scheduled heat-score update finished");
                }
            },
        );
    }

    {
        let store = store.clone();
        let cache = cache.clone();
        scheduler.register(
            "trending-keyword-update",
            Duration::from_secs(TRENDING_UPDATE_INTERVAL_SECS),
            move || {
                let store = store.clone();
                let cache = cache.clone();
                async move {
                    if let Err(e) = trending::update_trending_keywords(&store, &cache, Utc::now()).await {
                        tracing::warn!("scheduled trending-keyword update failed: {e}");
                    }
                }
            },
        );
    }

    {
        let client = client.clone();
        let cache = cache.clone();
        scheduler.register(
            "source-weight-update",
            Duration::from_secs(SOURCE_WEIGHT_UPDATE_INTERVAL_SECS),
            move || {
                let client = client.clone();
                let cache = cache.clone();
                async move {
                    if let Err(e) = source_weight::update_source_weights(&client, &cache, Utc::now()).await {
                        tracing::warn!("scheduled source-weight update failed: {e}");
                    }
                }
            },
        );
    }

    let state = AppState { cache, store, client };
    let app = http::router(state, &cfg.allowed_origins);
    let listener = tokio::net::TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .context("binding HTTP listener")?;

    info!("listening on {}:{}", cfg.host, cfg.port);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("HTTP server terminated unexpectedly")?;
        }
        _ = &mut shutdown => {
            info!("shutdown signal received, stopping background tasks...");
        }
    }

    scheduler.stop().await;
    info!("HeatLink shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
///
/// - In development, uses human-readable pretty format.
/// - When `DEBUG` is unset, uses structured JSON logging to stdout.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("heatlink={}", cfg.log_level)));

    if cfg.debug {
        fmt().with_env_filter(env_filter).with_target(true).init();
    } else {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}
