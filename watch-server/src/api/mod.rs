//! API routes for watch-server

pub mod admin;
pub mod alerts;
pub mod dashboard;
pub mod heartbeat;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Store agents post here
    let ingest = Router::new()
        .route("/heartbeat", post(heartbeat::handle_live))
        .route("/heartbeat/buffered", post(heartbeat::handle_buffered));

    // Read-only views for the ops frontend
    let views = Router::new()
        .route("/dashboard", get(dashboard::dashboard))
        .route("/store/{id}", get(dashboard::store_detail))
        .route("/alerts", get(alerts::recent))
        .route("/alerts/{id}", get(alerts::for_store));

    // Operator endpoints
    let admin = Router::new()
        .route("/trigger-health-check", get(admin::trigger_health_check))
        .route("/test-email/{id}", get(admin::test_email))
        .route("/config/email", get(admin::email_config))
        .route("/config/reload", post(admin::reload_config));

    Router::new()
        .route("/health", get(admin::health))
        .merge(ingest)
        .merge(views)
        .merge(admin)
        .layer(cors_layer(state.config.frontend_url.as_deref()))
        .with_state(state)
}

/// CORS allow-list from `FRONTEND_URL` (comma-separated origins); permissive
/// when unset so local dashboards keep working out of the box.
fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    match frontend_url {
        Some(urls) => {
            let origins: Vec<HeaderValue> = urls
                .split(',')
                .filter_map(|u| u.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}
