use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tracked instrument, identified by its exchange symbol.
///
/// `purchase_price` and the `last_*` columns are a cached summary maintained
/// by the update/backfill pipelines; they stay NULL until the first
/// successful fetch. `last_price_at` never moves backwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stock {
    pub id: Uuid,
    pub ticker: String,
    pub name: String,
    pub active: bool,
    pub industry_id: Uuid,

    pub purchase_date: NaiveDate,
    pub purchase_price: Option<f64>,
    pub purchase_currency: Option<String>,

    pub last_price: Option<f64>,
    pub last_currency: Option<String>,
    pub last_price_at: Option<DateTime<Utc>>,
}

impl Stock {
    /// Absolute return vs. the purchase price, if both prices are known.
    pub fn return_abs(&self) -> Option<f64> {
        Some(self.last_price? - self.purchase_price?)
    }

    /// Percentage return vs. the purchase price.
    pub fn return_pct(&self) -> Option<f64> {
        let purchase = self.purchase_price?;
        if purchase == 0.0 {
            return None;
        }
        Some((self.last_price? - purchase) / purchase * 100.0)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateStock {
    pub ticker: String,
    pub name: String,
    pub industry_id: Uuid,
    pub purchase_date: NaiveDate,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
