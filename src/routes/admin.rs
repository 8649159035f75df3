use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::AppError;
use crate::services::{backfill, updater};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/update", post(trigger_update))
        .route("/backfill", post(trigger_backfill))
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct BackfillParams {
    #[serde(default)]
    only_missing: bool,
    start: Option<NaiveDate>,
}

/// Manual update trigger. `force=true` bypasses the debounce window; an
/// already-running pipeline is reported, not queued behind.
async fn trigger_update(
    State(state): State<AppState>,
    Query(params): Query<UpdateParams>,
) -> Result<Json<Value>, AppError> {
    info!("POST /admin/update (force: {})", params.force);

    let Ok(_guard) = state.run_guard.try_lock() else {
        return Ok(Json(json!({
            "status": "skipped",
            "reason": "update already in progress"
        })));
    };

    let summary = updater::update_prices(
        &state.pool,
        state.quote_source.as_ref(),
        state.watermark.as_ref(),
        &state.settings,
        params.force,
    )
    .await?;

    Ok(Json(json!(summary)))
}

async fn trigger_backfill(
    State(state): State<AppState>,
    Query(params): Query<BackfillParams>,
) -> Result<Json<Value>, AppError> {
    info!(
        "POST /admin/backfill (only_missing: {}, start: {:?})",
        params.only_missing, params.start
    );

    let Ok(_guard) = state.run_guard.try_lock() else {
        return Ok(Json(json!({
            "status": "skipped",
            "reason": "a pipeline run is already in progress"
        })));
    };

    let summary = backfill::backfill_history(
        &state.pool,
        state.quote_source.as_ref(),
        params.only_missing,
        params.start,
    )
    .await?;

    Ok(Json(json!(summary)))
}
