use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::utils::response::success;

pub mod devices;
pub mod events;
pub mod scan;

pub use devices::{list_venue_devices, offline_scan, pull_cache, register_device, revoke_device};
pub use events::{build_event_cache, event_stats};
pub use scan::scan;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "turnstile-api",
    };

    success(payload, "Health check successful").into_response()
}
