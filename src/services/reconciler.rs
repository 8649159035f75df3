use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Timelike, Utc};

use crate::external::quote_source::Quote;
use crate::models::Stock;

/// Canonical form of an observation timestamp: UTC, whole seconds.
///
/// This is the dedup key; nothing is compared or stored without going
/// through here first.
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// The cached summary columns of a stock, detached from the row so the
/// reconciler stays free of I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSummary {
    pub purchase_date: NaiveDate,
    pub purchase_price: Option<f64>,
    pub purchase_currency: Option<String>,
    pub last_price: Option<f64>,
    pub last_currency: Option<String>,
    pub last_price_at: Option<DateTime<Utc>>,
}

impl From<&Stock> for TickerSummary {
    fn from(stock: &Stock) -> Self {
        Self {
            purchase_date: stock.purchase_date,
            purchase_price: stock.purchase_price,
            purchase_currency: stock.purchase_currency.clone(),
            last_price: stock.last_price,
            last_currency: stock.last_currency.clone(),
            last_price_at: stock.last_price_at.map(normalize),
        }
    }
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    /// Genuinely new observations, normalized and in chronological order.
    pub new_points: Vec<Quote>,
    pub summary: TickerSummary,
    pub summary_changed: bool,
}

/// Reconcile a batch of fetched observations against what is already known
/// for one ticker.
///
/// Input order does not matter: observations are normalized and sorted
/// before the rules run, so "earliest qualifying" and "most recent" resolve
/// deterministically in a single pass.
///
/// Rules, applied to new observations only:
/// - an observation whose normalized timestamp is already known is dropped;
/// - if the purchase price is unset, the earliest observation on/after the
///   purchase date fills it;
/// - the last price follows any observation at or after the cached
///   `last_price_at`, and never one strictly older.
pub fn reconcile(
    known: &HashSet<DateTime<Utc>>,
    summary: &TickerSummary,
    incoming: &[Quote],
) -> ReconcileOutcome {
    let mut batch: Vec<Quote> = incoming
        .iter()
        .map(|q| Quote {
            observed_at: normalize(q.observed_at),
            price: q.price,
            currency: q.currency.clone(),
        })
        .collect();
    batch.sort_by_key(|q| q.observed_at);

    let mut seen = known.clone();
    let mut updated = summary.clone();
    let mut new_points = Vec::new();

    for quote in batch {
        if !seen.insert(quote.observed_at) {
            continue;
        }

        if updated.purchase_price.is_none()
            && quote.observed_at.date_naive() >= updated.purchase_date
        {
            updated.purchase_price = Some(quote.price);
            updated.purchase_currency = quote.currency.clone();
        }

        if updated.last_price_at.map_or(true, |at| quote.observed_at >= at) {
            updated.last_price = Some(quote.price);
            updated.last_currency = quote.currency.clone();
            updated.last_price_at = Some(quote.observed_at);
        }

        new_points.push(quote);
    }

    let summary_changed = updated != *summary;
    ReconcileOutcome {
        new_points,
        summary: updated,
        summary_changed,
    }
}
