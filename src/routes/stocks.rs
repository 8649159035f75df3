use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use crate::db::{price_queries, stock_queries};
use crate::errors::AppError;
use crate::models::{CreateStock, PricePoint, Stock};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stocks))
        .route("/", post(create_stock))
        .route("/:ticker/history", get(stock_history))
}

/// A stock plus its derived performance vs. the purchase date.
#[derive(Debug, Serialize)]
pub(crate) struct StockView {
    #[serde(flatten)]
    pub(crate) stock: Stock,
    pub(crate) return_abs: Option<f64>,
    pub(crate) return_pct: Option<f64>,
}

impl From<Stock> for StockView {
    fn from(stock: Stock) -> Self {
        let return_abs = stock.return_abs();
        let return_pct = stock.return_pct();
        Self {
            stock,
            return_abs,
            return_pct,
        }
    }
}

async fn list_stocks(State(state): State<AppState>) -> Result<Json<Vec<StockView>>, AppError> {
    let stocks = stock_queries::fetch_all(&state.pool).await?;
    Ok(Json(stocks.into_iter().map(StockView::from).collect()))
}

async fn create_stock(
    State(state): State<AppState>,
    Json(payload): Json<CreateStock>,
) -> Result<Json<StockView>, AppError> {
    if payload.ticker.trim().is_empty() {
        return Err(AppError::Validation("ticker must not be empty".into()));
    }
    let stock = stock_queries::insert(&state.pool, &payload).await?;
    info!("tracking new stock {}", stock.ticker);
    Ok(Json(StockView::from(stock)))
}

async fn stock_history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Vec<PricePoint>>, AppError> {
    let stock = stock_queries::fetch_by_ticker(&state.pool, &ticker)
        .await?
        .ok_or(AppError::NotFound)?;
    let history = price_queries::fetch_history(&state.pool, stock.id).await?;
    Ok(Json(history))
}
