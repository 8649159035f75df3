mod app;
mod config;
mod db;
mod errors;
mod external;
mod logging;
mod models;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::time::Duration;

use crate::config::Settings;
use crate::external::finnhub::FinnhubSource;
use crate::external::quote_source::{FetchOptions, QuoteSource};
use crate::external::yahoo::YahooSource;
use crate::logging::LoggingConfig;
use crate::services::pacer::Pacer;
use crate::services::retry::RetryPolicy;
use crate::services::scheduler::{self, JobContext};
use crate::services::watermark::FileWatermark;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    logging::init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;

    let fetch_options = FetchOptions {
        batch_size: settings.fetch_batch_size,
        pacer: Pacer::new(Duration::from_millis(settings.fetch_delay_ms)),
        retry: RetryPolicy::new(
            settings.fetch_max_attempts,
            Duration::from_secs(5),
        ),
    };

    let quote_source: Arc<dyn QuoteSource> = match settings.quote_source.to_lowercase().as_str() {
        "finnhub" => {
            tracing::info!("using quote source: Finnhub");
            Arc::new(
                FinnhubSource::from_env(fetch_options)
                    .map_err(|e| anyhow::anyhow!("failed to create Finnhub source: {}", e))?,
            )
        }
        "yahoo" => {
            tracing::info!("using quote source: Yahoo Finance");
            Arc::new(YahooSource::new(fetch_options))
        }
        other => anyhow::bail!(
            "invalid QUOTE_SOURCE: {} (must be 'finnhub' or 'yahoo')",
            other
        ),
    };

    let watermark = Arc::new(FileWatermark::new(&settings.data_dir));
    let run_guard = Arc::new(tokio::sync::Mutex::new(()));

    let _scheduler = scheduler::start(JobContext {
        pool: pool.clone(),
        quote_source: quote_source.clone(),
        watermark: watermark.clone(),
        settings: settings.clone(),
        run_guard: run_guard.clone(),
    })
    .await
    .map_err(|e| anyhow::anyhow!("failed to start scheduler: {}", e))?;

    let bind_addr = settings.bind_addr.clone();
    let state = AppState {
        pool,
        quote_source,
        watermark,
        settings,
        run_guard,
    };
    let app = app::create_app(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("stockboard backend running at http://{}/", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
