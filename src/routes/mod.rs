use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    build_event_cache, event_stats, health_check, list_venue_devices, offline_scan, pull_cache,
    register_device, revoke_device, scan,
};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/scan", post(scan))
        .route("/devices", post(register_device))
        .route("/devices/:device_id", delete(revoke_device))
        .route("/devices/:device_id/cache", get(pull_cache))
        .route("/devices/:device_id/offline-scan", post(offline_scan))
        .route("/venues/:venue_id/devices", get(list_venue_devices))
        .route("/events/:event_id/cache", post(build_event_cache))
        .route("/events/:event_id/stats", get(event_stats))
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
