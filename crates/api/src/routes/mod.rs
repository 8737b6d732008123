//! API route definitions.

use axum::Router;

use crate::AppState;

pub mod health;
pub mod rate_charts;

/// Creates the API router with all routes.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let max_upload_bytes = state.charts.policy().max_file_bytes;

    Router::new()
        .merge(health::routes())
        .merge(rate_charts::routes(max_upload_bytes))
}
