use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::scan::ScanRequest;
use crate::state::AppState;
use crate::utils::response::success;

/// Online scan adjudication. Always a 200 with `{ allow, reason? }`; the
/// pipeline fails closed internally so the gate is never left without an
/// answer.
pub async fn scan(State(state): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let decision = state.pipeline.scan(&req).await;
    let message = if decision.allow {
        "Admission allowed"
    } else {
        "Admission denied"
    };
    success(decision, message).into_response()
}
