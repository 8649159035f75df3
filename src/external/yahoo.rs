use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::external::quote_source::{
    chunked, FetchOptions, Quote, QuoteSource, QuoteSourceError, Resolution,
};
use crate::services::retry::with_retries;

/// Yahoo Finance v8 chart API. No API key required.
///
/// The chart endpoint is per-symbol; "latest" is approximated the same way
/// the hourly-bars path always has been: pull two days of hourly bars and
/// keep the newest non-null close.
pub struct YahooSource {
    client: reqwest::Client,
    options: FetchOptions,
}

impl YahooSource {
    pub fn new(options: FetchOptions) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; Stockboard/0.1)")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            options,
        }
    }

    async fn chart(
        &self,
        ticker: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Quote>, QuoteSourceError> {
        let url = format!("https://query1.finance.yahoo.com/v8/finance/chart/{}", ticker);

        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| QuoteSourceError::Network(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(QuoteSourceError::RateLimited);
        }
        if resp.status().as_u16() == 404 {
            // unknown symbol: not an error, just nothing to report
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(QuoteSourceError::BadResponse(format!("HTTP {}", resp.status())));
        }

        let body: YahooChartResponse = resp
            .json()
            .await
            .map_err(|e| QuoteSourceError::Parse(e.to_string()))?;

        if let Some(error) = body.chart.error {
            if error.description.contains("No data found") {
                return Ok(Vec::new());
            }
            return Err(QuoteSourceError::BadResponse(error.description));
        }

        let results = body
            .chart
            .result
            .ok_or_else(|| QuoteSourceError::BadResponse("no results in response".into()))?;
        let Some(result) = results.into_iter().next() else {
            return Ok(Vec::new());
        };

        let Some(quote) = result.indicators.quote.into_iter().next() else {
            return Ok(Vec::new());
        };
        if result.timestamp.len() != quote.close.len() {
            return Err(QuoteSourceError::Parse(
                "timestamp and close arrays have different lengths".into(),
            ));
        }

        let currency = result.meta.and_then(|m| m.currency);
        let mut quotes: Vec<Quote> = result
            .timestamp
            .iter()
            .zip(quote.close.iter())
            .filter_map(|(ts, close_opt)| {
                // null closes are market holidays / not-yet-final bars
                let close = (*close_opt)?;
                let observed_at = DateTime::<Utc>::from_timestamp(*ts, 0)?;
                Some(Quote {
                    observed_at,
                    price: close,
                    currency: currency.clone(),
                })
            })
            .collect();

        quotes.sort_by_key(|q| q.observed_at);
        Ok(quotes)
    }

    async fn fetch_one(
        &self,
        ticker: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Quote>, QuoteSourceError> {
        self.options.pacer.wait().await;
        with_retries(&self.options.retry, QuoteSourceError::is_transient, || {
            self.chart(ticker, query)
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: Option<YahooMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooMeta {
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    close: Vec<Option<f64>>,
}

#[async_trait]
impl QuoteSource for YahooSource {
    async fn fetch_latest(
        &self,
        tickers: &[String],
    ) -> Result<HashMap<String, Quote>, QuoteSourceError> {
        let query = [
            ("interval", "1h".to_string()),
            ("range", "2d".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];

        let mut out = HashMap::new();
        for batch in chunked(tickers, self.options.batch_size) {
            debug!("fetching latest closes for batch of {}", batch.len());
            for ticker in batch {
                match self.fetch_one(ticker, &query).await {
                    Ok(quotes) => {
                        if let Some(last) = quotes.into_iter().last() {
                            out.insert(ticker.clone(), last);
                        } else {
                            debug!("{}: no recent bars", ticker);
                        }
                    }
                    Err(e) => warn!("{}: giving up on latest fetch: {}", ticker, e),
                }
            }
        }

        Ok(out)
    }

    async fn fetch_range(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
        resolution: Resolution,
    ) -> Result<HashMap<String, Vec<Quote>>, QuoteSourceError> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc().timestamp())
            .unwrap_or_default();
        let period2 = end
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc().timestamp())
            .unwrap_or_default();
        let interval = match resolution {
            Resolution::Daily => "1d",
            Resolution::Hourly => "1h",
        };
        let query = [
            ("interval", interval.to_string()),
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];

        let mut out = HashMap::new();
        for batch in chunked(tickers, self.options.batch_size) {
            for ticker in batch {
                match self.fetch_one(ticker, &query).await {
                    Ok(quotes) if quotes.is_empty() => debug!("{}: no bars in range", ticker),
                    Ok(quotes) => {
                        out.insert(ticker.clone(), quotes);
                    }
                    Err(e) => warn!("{}: giving up on range fetch: {}", ticker, e),
                }
            }
        }

        Ok(out)
    }
}
