//! HTTP routing.

use axum::{extract::Extension, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::AppState;

/// Build the service router.
pub fn router(state: Arc<AppState>, prometheus_handle: PrometheusHandle) -> Router {
    Router::new()
        // Web Terrain Service
        .route("/wts", get(handlers::wts_handler))
        .route("/wts/", get(handlers::wts_handler))
        // DEM download
        .route("/dem", get(handlers::dem_handler))
        .route("/dem/", get(handlers::dem_handler))
        // Terrain profiles
        .route("/profile", get(handlers::profile_handler))
        .route("/profile/", get(handlers::profile_handler))
        // TK25 sheet numbers
        .route("/tk", get(handlers::sheet_handler))
        .route("/tk/", get(handlers::sheet_handler))
        // Health check
        .route("/health", get(handlers::health_handler))
        // Metrics
        .route("/metrics", get(handlers::metrics_handler))
        // Service status
        .route("/api/status", get(handlers::status_handler))
        .layer(Extension(state))
        .layer(Extension(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
