use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::db::{price_queries, stock_queries};
use crate::errors::AppError;
use crate::external::quote_source::{Quote, QuoteSource, Resolution};
use crate::models::Stock;
use crate::services::reconciler::{self, ReconcileOutcome, TickerSummary};
use crate::services::watermark::WatermarkStore;

/// How far past the purchase date to look for the first available close.
const PURCHASE_WINDOW_DAYS: i64 = 7;

/// The sole observability contract of a pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerStatus {
    /// A new observation advanced the cached last price.
    Updated,
    /// No new/usable data, including "source returned nothing".
    Skipped,
    /// Per-ticker processing errored; the run continued without it.
    Failed,
}

impl UpdateSummary {
    pub fn record(&mut self, status: TickerStatus) {
        match status {
            TickerStatus::Updated => self.updated += 1,
            TickerStatus::Skipped => self.skipped += 1,
            TickerStatus::Failed => self.failed += 1,
        }
    }
}

/// Classify one ticker at the end of a run. Failures win; otherwise a ticker
/// counts as updated exactly when the run advanced its cached `last_price_at`.
pub(crate) fn classify(
    failed: bool,
    before: Option<DateTime<Utc>>,
    after: Option<DateTime<Utc>>,
) -> TickerStatus {
    if failed {
        TickerStatus::Failed
    } else if after != before {
        TickerStatus::Updated
    } else {
        TickerStatus::Skipped
    }
}

/// Debounce check against the injected watermark. Best-effort: an unreadable
/// watermark means "never updated" and lets the run proceed.
pub fn within_cooldown(
    watermark: &dyn WatermarkStore,
    cooldown_secs: i64,
    now: DateTime<Utc>,
) -> bool {
    watermark
        .last_run()
        .map_or(false, |last| (now - last).num_seconds() < cooldown_secs)
}

/// Fetch current prices for every active ticker.
///
/// Two-phase: first a narrow range fetch fills purchase prices for tickers
/// that still lack one, then a latest-price fetch covers the whole active
/// universe. One ticker's failure never aborts the run; a failed batch fetch
/// degrades to "no data" for its tickers. The watermark is overwritten on
/// completion even if some tickers failed.
pub async fn update_prices(
    pool: &PgPool,
    source: &dyn QuoteSource,
    watermark: &dyn WatermarkStore,
    settings: &Settings,
    force: bool,
) -> Result<UpdateSummary, AppError> {
    let stocks = stock_queries::fetch_active(pool).await?;
    if stocks.is_empty() {
        info!("no active stocks, nothing to update");
        return Ok(UpdateSummary::default());
    }

    if !force && within_cooldown(watermark, settings.update_cooldown_secs, Utc::now()) {
        info!(
            "last update within cooldown ({}s), skipping {} tickers",
            settings.update_cooldown_secs,
            stocks.len()
        );
        return Ok(UpdateSummary {
            updated: 0,
            skipped: stocks.len() as u32,
            failed: 0,
        });
    }

    info!("starting price update for {} stocks", stocks.len());

    let mut summaries: HashMap<Uuid, TickerSummary> = stocks
        .iter()
        .map(|s| (s.id, TickerSummary::from(s)))
        .collect();
    let started_at: HashMap<Uuid, Option<DateTime<Utc>>> = summaries
        .iter()
        .map(|(id, s)| (*id, s.last_price_at))
        .collect();
    let mut failed: HashSet<Uuid> = HashSet::new();

    // Phase 1: fill missing purchase prices, one narrow window per distinct
    // purchase date.
    let mut missing_by_date: BTreeMap<NaiveDate, Vec<&Stock>> = BTreeMap::new();
    for stock in stocks.iter().filter(|s| s.purchase_price.is_none()) {
        missing_by_date.entry(stock.purchase_date).or_default().push(stock);
    }

    for (purchase_date, group) in &missing_by_date {
        let tickers: Vec<String> = group.iter().map(|s| s.ticker.clone()).collect();
        let window_end = *purchase_date + ChronoDuration::days(PURCHASE_WINDOW_DAYS);

        match source
            .fetch_range(&tickers, *purchase_date, window_end, Resolution::Daily)
            .await
        {
            Ok(map) => {
                for stock in group {
                    let Some(quotes) = map.get(&stock.ticker) else {
                        continue;
                    };
                    let Some(summary) = summaries.get(&stock.id).cloned() else {
                        continue;
                    };
                    match process_ticker(pool, stock.id, &summary, quotes).await {
                        Ok(outcome) => {
                            summaries.insert(stock.id, outcome.summary);
                        }
                        Err(e) => {
                            error!("{}: purchase-price fill failed: {}", stock.ticker, e);
                            failed.insert(stock.id);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    "purchase-price batch fetch for {} failed, treating {} tickers as no-data: {}",
                    purchase_date,
                    group.len(),
                    e
                );
            }
        }
    }

    // Phase 2: latest price for every active ticker.
    let tickers: Vec<String> = stocks.iter().map(|s| s.ticker.clone()).collect();
    let latest = match source.fetch_latest(&tickers).await {
        Ok(map) => map,
        Err(e) => {
            warn!("latest-price batch fetch failed, treating as no-data: {}", e);
            HashMap::new()
        }
    };

    for stock in &stocks {
        if failed.contains(&stock.id) {
            continue;
        }
        let Some(quote) = latest.get(&stock.ticker) else {
            continue;
        };
        let Some(summary) = summaries.get(&stock.id).cloned() else {
            continue;
        };
        match process_ticker(pool, stock.id, &summary, std::slice::from_ref(quote)).await {
            Ok(outcome) => {
                summaries.insert(stock.id, outcome.summary);
            }
            Err(e) => {
                error!("{}: latest-price update failed: {}", stock.ticker, e);
                failed.insert(stock.id);
            }
        }
    }

    let mut counts = UpdateSummary::default();
    for stock in &stocks {
        let before = started_at.get(&stock.id).copied().flatten();
        let after = summaries.get(&stock.id).and_then(|s| s.last_price_at);
        let status = classify(failed.contains(&stock.id), before, after);
        if status == TickerStatus::Updated {
            if let Some(summary) = summaries.get(&stock.id) {
                info!(
                    "{}: last price now {:?} at {:?}",
                    stock.ticker, summary.last_price, summary.last_price_at
                );
            }
        }
        counts.record(status);
    }

    if let Err(e) = watermark.mark(Utc::now()) {
        warn!("failed to persist update watermark: {}", e);
    }

    info!(
        "price update done: {} updated, {} skipped, {} failed",
        counts.updated, counts.skipped, counts.failed
    );
    Ok(counts)
}

/// Reconcile and persist one ticker's fetched observations. The insert and
/// the summary update share one transaction.
pub(crate) async fn process_ticker(
    pool: &PgPool,
    stock_id: Uuid,
    summary: &TickerSummary,
    quotes: &[Quote],
) -> Result<ReconcileOutcome, AppError> {
    let known = price_queries::fetch_observed_at(pool, stock_id).await?;
    let outcome = reconciler::reconcile(&known, summary, quotes);

    if !outcome.new_points.is_empty() || outcome.summary_changed {
        price_queries::apply_outcome(pool, stock_id, &outcome).await?;
    }

    Ok(outcome)
}
