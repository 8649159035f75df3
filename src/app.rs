use axum::Router;

use crate::routes::{admin, health, industries, stocks};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/admin", admin::router())
        .nest("/api/industries", industries::router())
        .nest("/api/stocks", stocks::router())
        .with_state(state)
}
