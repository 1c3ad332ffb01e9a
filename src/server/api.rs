//! API route definitions

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{handlers, state::AppState};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Visit /api/health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed. Check the API documentation for supported methods.",
        })),
    )
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload_size = state.config.max_upload_size;
    let api_routes = Router::new()
        // Uploads
        .route(
            "/upload/datasets",
            get(handlers::list_datasets).post(handlers::upload_dataset),
        )
        .route(
            "/upload/datasets/:dataset_id",
            axum::routing::delete(handlers::delete_dataset),
        )
        .route(
            "/upload/models",
            get(handlers::list_models).post(handlers::upload_model),
        )
        .route(
            "/upload/models/:model_id",
            axum::routing::delete(handlers::delete_model),
        )
        // Data drift
        .route("/drift/analyze", post(handlers::analyze_drift))
        .route("/drift/history", get(handlers::drift_history))
        .route("/drift/summary", get(handlers::drift_summary))
        // Model performance drift
        .route("/model-drift/evaluate", post(handlers::evaluate_model))
        .route("/model-drift/compare", post(handlers::compare_models))
        .route("/model-drift/history", get(handlers::model_drift_history))
        .route("/model-drift/baseline", post(handlers::set_baseline))
        // Alerts
        .route("/alerts", get(handlers::get_alerts))
        .route(
            "/alerts/:alert_id/acknowledge",
            post(handlers::acknowledge_alert),
        )
        // System
        .route("/health", get(handlers::health_check))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    let app = Router::new()
        .nest("/api", api_routes)
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state);

    // CORS configured via CORS_ORIGIN env var (default: allow all for local-first)
    let cors = match std::env::var("CORS_ORIGIN") {
        Ok(origin) if !origin.is_empty() && origin != "*" => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<axum::http::HeaderValue>()
                    .unwrap_or_else(|_| axum::http::HeaderValue::from_static("*")),
            )
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    app.layer(axum::extract::DefaultBodyLimit::max(max_upload_size))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
