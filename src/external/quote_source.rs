use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::services::pacer::Pacer;
use crate::services::retry::RetryPolicy;

/// One price observation as returned by an external source.
///
/// `observed_at` is always timezone-aware UTC by the time it leaves the
/// adapter; sources that report naive or local times are converted here,
/// never downstream.
#[derive(Debug, Clone)]
pub struct Quote {
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Daily,
    Hourly,
}

#[derive(Debug, Error)]
pub enum QuoteSourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

impl QuoteSourceError {
    /// Transient failures worth another attempt: rate limits, timeouts and
    /// garbled payloads. Hard rejections (403, unknown symbol) are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QuoteSourceError::Network(_)
                | QuoteSourceError::RateLimited
                | QuoteSourceError::Parse(_)
        )
    }
}

/// Shared knobs for every provider: chunking, pacing between external calls
/// and the retry schedule. Built once from `Settings` at startup.
#[derive(Clone)]
pub struct FetchOptions {
    pub batch_size: usize,
    pub pacer: Pacer,
    pub retry: RetryPolicy,
}

/// Adapter over a third-party market-data API.
///
/// Both operations are best-effort per ticker: a ticker the source knows
/// nothing about is simply absent from the returned map, and a call that
/// keeps failing after retries drops its tickers rather than erroring the
/// whole batch. An `Err` from these methods means the batch as a whole could
/// not be attempted; callers treat that as "no data" for the affected
/// tickers.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Latest available price per ticker.
    async fn fetch_latest(
        &self,
        tickers: &[String],
    ) -> Result<HashMap<String, Quote>, QuoteSourceError>;

    /// Historical bars per ticker over `[start, end)`, chronological.
    async fn fetch_range(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
        resolution: Resolution,
    ) -> Result<HashMap<String, Vec<Quote>>, QuoteSourceError>;
}

/// Split a ticker list into fetch batches of at most `n`.
pub fn chunked(tickers: &[String], n: usize) -> impl Iterator<Item = &[String]> {
    tickers.chunks(n.max(1))
}
