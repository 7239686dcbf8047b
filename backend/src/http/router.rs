//! Router configuration for the HTTP API.
//!
//! Sets up all routes and middleware (CORS, compression, tracing) and
//! returns the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Permissive CORS; the API has no authentication.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/sessions/{session_id}", get(handlers::get_session))
        .route(
            "/sessions/{session_id}/reconcile-status",
            post(handlers::reconcile_status),
        )
        // Readings and phase transitions
        .route("/sessions/{session_id}/ocv", post(handlers::submit_ocv))
        .route("/sessions/{session_id}/ccv", post(handlers::submit_ccv))
        .route("/sessions/{session_id}/end-phase", post(handlers::end_phase))
        // Aggregated views
        .route("/sessions/{session_id}/cycles", get(handlers::get_cycle_tables))
        .route("/sessions/{session_id}/export", get(handlers::get_export))
        .route("/sessions/{session_id}/export.csv", get(handlers::get_export_csv));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
