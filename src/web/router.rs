//! Route table for the snapshot surface.

use super::handlers::{self, AppState};
use super::WebConfig;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the axum application.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/devices/:name/snapshot", get(handlers::device_snapshot))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if config.enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
