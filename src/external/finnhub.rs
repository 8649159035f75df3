use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::external::quote_source::{
    chunked, FetchOptions, Quote, QuoteSource, QuoteSourceError, Resolution,
};
use crate::services::retry::with_retries;

const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Finnhub quote source.
///
/// Free tier allows 60 calls/minute, so the default one-second pacing is
/// safe for a few dozen tickers. Both endpoints are per-symbol; chunking
/// only groups the pacing, it does not reduce call volume.
pub struct FinnhubSource {
    client: reqwest::Client,
    api_key: String,
    options: FetchOptions,
}

impl FinnhubSource {
    pub fn from_env(options: FetchOptions) -> Result<Self, QuoteSourceError> {
        let api_key = std::env::var("FINNHUB_API_KEY")
            .map_err(|_| QuoteSourceError::BadResponse("FINNHUB_API_KEY not set".into()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            options,
        })
    }

    async fn quote(&self, ticker: &str) -> Result<Option<Quote>, QuoteSourceError> {
        let resp = self
            .client
            .get(format!("{}/quote", FINNHUB_BASE_URL))
            .query(&[("symbol", ticker), ("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| QuoteSourceError::Network(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(QuoteSourceError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(QuoteSourceError::BadResponse(format!("HTTP {}", resp.status())));
        }

        let body: FinnhubQuote = resp
            .json()
            .await
            .map_err(|e| QuoteSourceError::Parse(e.to_string()))?;

        // Finnhub answers {"c":0,...,"t":0} for unknown symbols
        if body.c == 0.0 && body.t == 0 {
            return Ok(None);
        }

        let observed_at = if body.t > 0 {
            DateTime::<Utc>::from_timestamp(body.t, 0)
                .ok_or_else(|| QuoteSourceError::Parse(format!("bad timestamp {}", body.t)))?
        } else {
            Utc::now()
        };

        Ok(Some(Quote {
            observed_at,
            price: body.c,
            currency: None,
        }))
    }

    async fn candles(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        resolution: Resolution,
    ) -> Result<Vec<Quote>, QuoteSourceError> {
        let from_ts = start
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc().timestamp())
            .unwrap_or_default();
        let to_ts = end
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc().timestamp())
            .unwrap_or_default();
        let res = match resolution {
            Resolution::Daily => "D",
            Resolution::Hourly => "60",
        };

        let resp = self
            .client
            .get(format!("{}/stock/candle", FINNHUB_BASE_URL))
            .query(&[
                ("symbol", ticker),
                ("resolution", res),
                ("from", &from_ts.to_string()),
                ("to", &to_ts.to_string()),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| QuoteSourceError::Network(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(QuoteSourceError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(QuoteSourceError::BadResponse(format!("HTTP {}", resp.status())));
        }

        let body: FinnhubCandles = resp
            .json()
            .await
            .map_err(|e| QuoteSourceError::Parse(e.to_string()))?;

        if body.s == "no_data" {
            return Ok(Vec::new());
        }
        if body.s != "ok" {
            return Err(QuoteSourceError::BadResponse(format!("candle status: {}", body.s)));
        }
        if body.t.len() != body.c.len() {
            return Err(QuoteSourceError::Parse(
                "timestamp and close arrays have different lengths".into(),
            ));
        }

        let quotes = body
            .t
            .iter()
            .zip(body.c.iter())
            .filter_map(|(ts, close)| {
                let observed_at = DateTime::<Utc>::from_timestamp(*ts, 0)?;
                Some(Quote {
                    observed_at,
                    price: *close,
                    currency: None,
                })
            })
            .collect();

        Ok(quotes)
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    /// Current price
    #[serde(default)]
    c: f64,
    /// Unix timestamp of the quote
    #[serde(default)]
    t: i64,
}

#[derive(Debug, Deserialize)]
struct FinnhubCandles {
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    c: Vec<f64>,
}

#[async_trait]
impl QuoteSource for FinnhubSource {
    async fn fetch_latest(
        &self,
        tickers: &[String],
    ) -> Result<HashMap<String, Quote>, QuoteSourceError> {
        let mut out = HashMap::new();

        for batch in chunked(tickers, self.options.batch_size) {
            debug!("fetching latest quotes for batch of {}", batch.len());
            for ticker in batch {
                self.options.pacer.wait().await;
                let fetched = with_retries(
                    &self.options.retry,
                    QuoteSourceError::is_transient,
                    || self.quote(ticker),
                )
                .await;

                match fetched {
                    Ok(Some(quote)) => {
                        out.insert(ticker.clone(), quote);
                    }
                    Ok(None) => debug!("{}: no quote data", ticker),
                    Err(e) => warn!("{}: giving up on quote fetch: {}", ticker, e),
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
        let mut out = HashMap::new();

        for batch in chunked(tickers, self.options.batch_size) {
            for ticker in batch {
                self.options.pacer.wait().await;
                let fetched = with_retries(
                    &self.options.retry,
                    QuoteSourceError::is_transient,
                    || self.candles(ticker, start, end, resolution),
                )
                .await;

                match fetched {
                    Ok(quotes) if quotes.is_empty() => debug!("{}: no candles in range", ticker),
                    Ok(mut quotes) => {
                        quotes.sort_by_key(|q| q.observed_at);
                        out.insert(ticker.clone(), quotes);
                    }
                    Err(e) => warn!("{}: giving up on candle fetch: {}", ticker, e),
                }
            }
        }

        Ok(out)
    }
}
