//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes for rate chart upload, assignment, removal, status, and downloads
//! - JSON error responses derived from [`ratechart_shared::AppError`]
//! - Shared application state

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use ratechart_core::ratechart::{RateChartService, UploadPolicy};
use ratechart_db::RateChartRepository;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Rate chart service over the database store.
    pub charts: Arc<RateChartService<RateChartRepository>>,
}

impl AppState {
    /// Builds state over a database connection.
    #[must_use]
    pub fn new(db: DatabaseConnection, policy: UploadPolicy) -> Self {
        let store = Arc::new(RateChartRepository::new(db));
        Self {
            charts: Arc::new(RateChartService::new(store, policy)),
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(&state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
