use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One persisted price observation for a stock.
///
/// Observations are append-only; `(stock_id, observed_at)` is unique at the
/// database level, with `observed_at` normalized to whole-second UTC before
/// it ever reaches a query.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricePoint {
    pub id: Uuid,
    pub stock_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub currency: Option<String>,
}
