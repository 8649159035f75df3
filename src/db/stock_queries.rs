use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateStock, Stock};

const STOCK_COLUMNS: &str = "id, ticker, name, active, industry_id, purchase_date, \
     purchase_price, purchase_currency, last_price, last_currency, last_price_at";

pub async fn fetch_all(pool: &PgPool) -> Result<Vec<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks ORDER BY ticker"
    ))
    .fetch_all(pool)
    .await
}

/// The tracked universe: everything not soft-deactivated.
pub async fn fetch_active(pool: &PgPool) -> Result<Vec<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks WHERE active ORDER BY ticker"
    ))
    .fetch_all(pool)
    .await
}

/// Active stocks still missing a purchase price or a last price; the
/// `only_missing` backfill target set.
pub async fn fetch_active_missing_summary(pool: &PgPool) -> Result<Vec<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks \
         WHERE active AND (purchase_price IS NULL OR last_price IS NULL) \
         ORDER BY ticker"
    ))
    .fetch_all(pool)
    .await
}

pub async fn fetch_by_ticker(pool: &PgPool, ticker: &str) -> Result<Option<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks WHERE ticker = $1"
    ))
    .bind(ticker)
    .fetch_optional(pool)
    .await
}

pub async fn insert(pool: &PgPool, new: &CreateStock) -> Result<Stock, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "INSERT INTO stocks (id, ticker, name, active, industry_id, purchase_date) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {STOCK_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&new.ticker)
    .bind(&new.name)
    .bind(new.active)
    .bind(new.industry_id)
    .bind(new.purchase_date)
    .fetch_one(pool)
    .await
}
