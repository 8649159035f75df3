use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::models::PricePoint;
use crate::services::reconciler::ReconcileOutcome;

/// Every known (normalized) observation timestamp for one stock. This is the
/// reconciler's dedup input.
pub async fn fetch_observed_at(
    pool: &PgPool,
    stock_id: Uuid,
) -> Result<HashSet<DateTime<Utc>>, sqlx::Error> {
    let rows: Vec<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT observed_at FROM price_points WHERE stock_id = $1")
            .bind(stock_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn fetch_history(
    pool: &PgPool,
    stock_id: Uuid,
) -> Result<Vec<PricePoint>, sqlx::Error> {
    sqlx::query_as::<_, PricePoint>(
        "SELECT id, stock_id, observed_at, price, currency \
         FROM price_points WHERE stock_id = $1 ORDER BY observed_at ASC",
    )
    .bind(stock_id)
    .fetch_all(pool)
    .await
}

/// Persist a reconcile outcome for one stock: insert the new observations
/// and bring the cached summary columns along, in a single transaction so a
/// mid-ticker failure rolls both back together.
///
/// `ON CONFLICT DO NOTHING` on the `(stock_id, observed_at)` unique key is a
/// second line of defense behind the reconciler's dedup.
pub async fn apply_outcome(
    pool: &PgPool,
    stock_id: Uuid,
    outcome: &ReconcileOutcome,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for quote in &outcome.new_points {
        sqlx::query(
            "INSERT INTO price_points (id, stock_id, observed_at, price, currency) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (stock_id, observed_at) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(stock_id)
        .bind(quote.observed_at)
        .bind(quote.price)
        .bind(&quote.currency)
        .execute(&mut *tx)
        .await?;
    }

    if outcome.summary_changed {
        sqlx::query(
            "UPDATE stocks SET purchase_price = $2, purchase_currency = $3, \
             last_price = $4, last_currency = $5, last_price_at = $6 \
             WHERE id = $1",
        )
        .bind(stock_id)
        .bind(outcome.summary.purchase_price)
        .bind(&outcome.summary.purchase_currency)
        .bind(outcome.summary.last_price)
        .bind(&outcome.summary.last_currency)
        .bind(outcome.summary.last_price_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.map_err(|e| {
        error!("failed to commit observations for stock {}: {}", stock_id, e);
        e
    })?;

    Ok(())
}
