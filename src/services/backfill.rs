use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::db::stock_queries;
use crate::errors::AppError;
use crate::external::quote_source::{QuoteSource, Resolution};
use crate::services::reconciler::TickerSummary;
use crate::services::updater::process_ticker;

/// Summary of one backfill run. `inserted` counts observation rows;
/// `skipped` and `failed` count tickers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub inserted: u32,
    pub skipped: u32,
    pub failed: u32,
}

/// Fold one ticker's result into the run counts. `rows` is the number of
/// observations actually stored, `None` if the ticker errored. A ticker whose
/// candidates all deduplicated away contributes `Some(0)` and counts as
/// skipped, which is what makes a re-run report `inserted: 0`.
pub(crate) fn record_rows(counts: &mut BackfillSummary, rows: Option<u32>) {
    match rows {
        None => counts.failed += 1,
        Some(0) => counts.skipped += 1,
        Some(n) => counts.inserted += n,
    }
}

/// Populate full daily history for the tracked universe.
///
/// With `only_missing`, only tickers still lacking a purchase price or last
/// price are targeted. The range runs from `start` (or the earliest purchase
/// date across targets) through tomorrow, so today's bar is included.
///
/// Idempotent: over an already-stored range every candidate deduplicates and
/// the cached summaries stay untouched, reporting `inserted: 0`.
pub async fn backfill_history(
    pool: &PgPool,
    source: &dyn QuoteSource,
    only_missing: bool,
    start: Option<NaiveDate>,
) -> Result<BackfillSummary, AppError> {
    let stocks = if only_missing {
        stock_queries::fetch_active_missing_summary(pool).await?
    } else {
        stock_queries::fetch_active(pool).await?
    };
    if stocks.is_empty() {
        info!("no stocks to backfill (only_missing: {})", only_missing);
        return Ok(BackfillSummary::default());
    }

    let start = match start {
        Some(date) => date,
        None => stocks
            .iter()
            .map(|s| s.purchase_date)
            .min()
            .unwrap_or_else(|| Utc::now().date_naive()),
    };
    let end = Utc::now().date_naive() + ChronoDuration::days(1);

    info!(
        "backfilling {} stocks from {} to {}",
        stocks.len(),
        start,
        end
    );

    let tickers: Vec<String> = stocks.iter().map(|s| s.ticker.clone()).collect();
    let history = match source
        .fetch_range(&tickers, start, end, Resolution::Daily)
        .await
    {
        Ok(map) => map,
        Err(e) => {
            warn!("history batch fetch failed, treating as no-data: {}", e);
            HashMap::new()
        }
    };

    let mut counts = BackfillSummary::default();
    for stock in &stocks {
        let Some(quotes) = history.get(&stock.ticker) else {
            info!("{}: no history returned", stock.ticker);
            record_rows(&mut counts, Some(0));
            continue;
        };

        let summary = TickerSummary::from(stock);
        match process_ticker(pool, stock.id, &summary, quotes).await {
            // inserted counts actual rows; candidates the reconciler drops
            // as duplicates never reach the insert
            Ok(outcome) => {
                if outcome.new_points.is_empty() {
                    info!("{}: already fully stored", stock.ticker);
                } else {
                    info!("{}: +{} observations", stock.ticker, outcome.new_points.len());
                }
                record_rows(&mut counts, Some(outcome.new_points.len() as u32));
            }
            Err(e) => {
                error!("{}: backfill failed: {}", stock.ticker, e);
                record_rows(&mut counts, None);
            }
        }
    }

    info!(
        "backfill done: {} inserted, {} skipped, {} failed",
        counts.inserted, counts.skipped, counts.failed
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::quote_source::Quote;
    use crate::services::reconciler;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::HashSet;

    fn daily_close(day: u32, price: f64) -> Quote {
        Quote {
            observed_at: Utc.with_ymd_and_hms(2026, 1, day, 21, 0, 0).unwrap(),
            price,
            currency: None,
        }
    }

    fn bare_summary() -> TickerSummary {
        TickerSummary {
            purchase_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            purchase_price: None,
            purchase_currency: None,
            last_price: None,
            last_currency: None,
            last_price_at: None,
        }
    }

    // Run the reconcile-then-count chain twice over the same history: the
    // first pass inserts every row, the second deduplicates everything and
    // the run reports zero inserted with all tickers skipped.
    #[test]
    fn rerun_over_stored_history_reports_zero_inserted() {
        let history = vec![daily_close(2, 100.0), daily_close(3, 102.0), daily_close(4, 101.0)];

        let first = reconciler::reconcile(&HashSet::new(), &bare_summary(), &history);
        let mut first_counts = BackfillSummary::default();
        record_rows(&mut first_counts, Some(first.new_points.len() as u32));
        assert_eq!(
            first_counts,
            BackfillSummary {
                inserted: 3,
                skipped: 0,
                failed: 0
            }
        );

        let known: HashSet<_> = first.new_points.iter().map(|q| q.observed_at).collect();
        let second = reconciler::reconcile(&known, &first.summary, &history);
        assert!(!second.summary_changed);

        let mut second_counts = BackfillSummary::default();
        record_rows(&mut second_counts, Some(second.new_points.len() as u32));
        assert_eq!(
            second_counts,
            BackfillSummary {
                inserted: 0,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn counts_mix_rows_for_inserted_and_tickers_for_the_rest() {
        let mut counts = BackfillSummary::default();
        record_rows(&mut counts, Some(250));
        record_rows(&mut counts, Some(0));
        record_rows(&mut counts, None);
        record_rows(&mut counts, Some(3));

        assert_eq!(
            counts,
            BackfillSummary {
                inserted: 253,
                skipped: 1,
                failed: 1
            }
        );
    }
}
