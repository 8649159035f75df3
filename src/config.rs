use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

/// Runtime settings, read once at startup.
///
/// Everything except `DATABASE_URL` has a default so a bare `.env` with a
/// connection string is enough to run locally.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    /// Which quote source to use: "finnhub" or "yahoo".
    pub quote_source: String,
    /// Scheduler cadence for the update pipeline.
    pub update_interval_minutes: u64,
    /// Debounce window: a run within this many seconds of the last successful
    /// run is skipped unless forced.
    pub update_cooldown_secs: i64,
    /// How many tickers go into one fetch batch.
    pub fetch_batch_size: usize,
    /// Minimum delay between external calls (jittered upward by the pacer).
    pub fetch_delay_ms: u64,
    /// Bounded retry attempts per external call.
    pub fetch_max_attempts: u32,
    /// Directory holding the update watermark file.
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        Ok(Self {
            database_url,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000".to_string()),
            quote_source: env_or("QUOTE_SOURCE", "finnhub".to_string()),
            update_interval_minutes: env_or("UPDATE_INTERVAL_MINUTES", 60),
            update_cooldown_secs: env_or("UPDATE_COOLDOWN_SECS", 120),
            fetch_batch_size: env_or("FETCH_BATCH_SIZE", 10),
            fetch_delay_ms: env_or("FETCH_DELAY_MS", 1_000),
            fetch_max_attempts: env_or("FETCH_MAX_ATTEMPTS", 4),
            data_dir: PathBuf::from(env_or("DATA_DIR", "./data".to_string())),
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
