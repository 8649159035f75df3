use std::sync::Arc;

use sqlx::PgPool;
use tokio::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::Settings;
use crate::errors::AppError;
use crate::external::quote_source::QuoteSource;
use crate::services::updater;
use crate::services::watermark::WatermarkStore;

/// Everything a scheduled run needs; shared with the manual triggers so the
/// run guard covers both paths.
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub quote_source: Arc<dyn QuoteSource>,
    pub watermark: Arc<dyn WatermarkStore>,
    pub settings: Settings,
    pub run_guard: Arc<tokio::sync::Mutex<()>>,
}

/// Start the interval job that drives the update pipeline.
pub async fn start(ctx: JobContext) -> Result<JobScheduler, AppError> {
    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| AppError::External(format!("failed to create scheduler: {}", e)))?;

    let interval = Duration::from_secs(ctx.settings.update_interval_minutes * 60);
    info!(
        "scheduling price updates every {} minutes",
        ctx.settings.update_interval_minutes
    );

    let job = Job::new_repeated_async(interval, move |_id, _lock| {
        let ctx = ctx.clone();
        Box::pin(async move {
            run_scheduled_update(ctx).await;
        })
    })
    .map_err(|e| AppError::External(format!("failed to create update job: {}", e)))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| AppError::External(format!("failed to register update job: {}", e)))?;
    scheduler
        .start()
        .await
        .map_err(|e| AppError::External(format!("failed to start scheduler: {}", e)))?;

    Ok(scheduler)
}

async fn run_scheduled_update(ctx: JobContext) {
    // Coalesce: if a run is already in flight, this trigger is dropped, not
    // queued behind it.
    let Ok(_guard) = ctx.run_guard.try_lock() else {
        info!("update already in progress, skipping scheduled trigger");
        return;
    };

    match updater::update_prices(
        &ctx.pool,
        ctx.quote_source.as_ref(),
        ctx.watermark.as_ref(),
        &ctx.settings,
        false,
    )
    .await
    {
        Ok(summary) => info!(
            "scheduled update: {} updated, {} skipped, {} failed",
            summary.updated, summary.skipped, summary.failed
        ),
        Err(e) => error!("scheduled update failed: {}", e),
    }
}
