use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Settings;
use crate::external::quote_source::QuoteSource;
use crate::services::watermark::WatermarkStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub quote_source: Arc<dyn QuoteSource>,
    pub watermark: Arc<dyn WatermarkStore>,
    pub settings: Settings,
    /// Shared with the scheduler so manual and scheduled runs never overlap.
    pub run_guard: Arc<tokio::sync::Mutex<()>>,
}
