use std::cmp::Ordering;
use std::collections::HashMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::db::{industry_queries, stock_queries};
use crate::errors::AppError;
use crate::models::{CreateIndustry, Industry, Stock};
use crate::routes::stocks::StockView;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_industries))
        .route("/", post(create_industry))
        .route("/summary", get(industry_summary))
}

/// One industry with its stocks and aggregate performance, the shape the
/// dashboard renders.
#[derive(Debug, Serialize)]
pub(crate) struct IndustrySummary {
    #[serde(flatten)]
    industry: Industry,
    stock_count: usize,
    avg_return_pct: Option<f64>,
    stocks: Vec<StockView>,
}

async fn list_industries(State(state): State<AppState>) -> Result<Json<Vec<Industry>>, AppError> {
    let industries = industry_queries::fetch_all(&state.pool).await?;
    Ok(Json(industries))
}

async fn industry_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<IndustrySummary>>, AppError> {
    let industries = industry_queries::fetch_all(&state.pool).await?;
    let stocks = stock_queries::fetch_all(&state.pool).await?;
    Ok(Json(summarize(industries, stocks)))
}

/// Group stocks under their industries, best return first within each group.
///
/// The average is taken over the stocks whose percentage return is computable;
/// stocks still awaiting their first price count toward `stock_count` but not
/// the average. An industry with no computable returns averages to `None`.
fn summarize(industries: Vec<Industry>, stocks: Vec<Stock>) -> Vec<IndustrySummary> {
    let mut by_industry: HashMap<Uuid, Vec<StockView>> = HashMap::new();
    for stock in stocks {
        by_industry
            .entry(stock.industry_id)
            .or_default()
            .push(StockView::from(stock));
    }

    industries
        .into_iter()
        .map(|industry| {
            let mut group = by_industry.remove(&industry.id).unwrap_or_default();
            group.sort_by(|a, b| {
                b.return_pct
                    .partial_cmp(&a.return_pct)
                    .unwrap_or(Ordering::Equal)
            });

            let returns: Vec<f64> = group.iter().filter_map(|s| s.return_pct).collect();
            let avg_return_pct = if returns.is_empty() {
                None
            } else {
                Some(returns.iter().sum::<f64>() / returns.len() as f64)
            };

            IndustrySummary {
                stock_count: group.len(),
                avg_return_pct,
                stocks: group,
                industry,
            }
        })
        .collect()
}

async fn create_industry(
    State(state): State<AppState>,
    Json(payload): Json<CreateIndustry>,
) -> Result<Json<Industry>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("industry name must not be empty".into()));
    }
    let industry = industry_queries::insert(&state.pool, &payload).await?;
    info!("created industry {}", industry.name);
    Ok(Json(industry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn industry(name: &str) -> Industry {
        Industry {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    fn stock(ticker: &str, industry_id: Uuid, purchase: Option<f64>, last: Option<f64>) -> Stock {
        Stock {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            name: ticker.into(),
            active: true,
            industry_id,
            purchase_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            purchase_price: purchase,
            purchase_currency: None,
            last_price: last,
            last_currency: None,
            last_price_at: None,
        }
    }

    #[test]
    fn averages_over_computable_returns_only() {
        let tech = industry("Tech");
        let stocks = vec![
            stock("AAA", tech.id, Some(100.0), Some(110.0)), // +10%
            stock("BBB", tech.id, Some(200.0), Some(160.0)), // -20%
            stock("CCC", tech.id, None, None),               // no data yet
        ];

        let summary = summarize(vec![tech], stocks);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].stock_count, 3);
        assert!((summary[0].avg_return_pct.unwrap() + 5.0).abs() < 1e-9);
    }

    #[test]
    fn stocks_are_sorted_best_return_first() {
        let tech = industry("Tech");
        let stocks = vec![
            stock("LOW", tech.id, Some(100.0), Some(90.0)),
            stock("NONE", tech.id, None, None),
            stock("HIGH", tech.id, Some(100.0), Some(130.0)),
        ];

        let summary = summarize(vec![tech], stocks);
        let tickers: Vec<&str> = summary[0]
            .stocks
            .iter()
            .map(|s| s.stock.ticker.as_str())
            .collect();
        assert_eq!(tickers, vec!["HIGH", "LOW", "NONE"]);
    }

    #[test]
    fn empty_industry_has_no_average() {
        let tech = industry("Tech");
        let banks = industry("Banks");
        let stocks = vec![stock("AAA", tech.id, Some(100.0), Some(110.0))];

        let summary = summarize(vec![tech, banks], stocks);
        assert_eq!(summary[1].stock_count, 0);
        assert_eq!(summary[1].avg_return_pct, None);
        assert!(summary[1].stocks.is_empty());
    }
}
