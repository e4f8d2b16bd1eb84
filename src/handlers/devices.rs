use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::devices::NewDevice;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn register_device(
    State(state): State<AppState>,
    Json(new): Json<NewDevice>,
) -> Result<Response, AppError> {
    let device = state.registry.register_device(new).await?;
    Ok(created(device, "Device registered").into_response())
}

#[derive(Deserialize)]
pub struct RevokeDeviceRequest {
    pub revoked_by: String,
    pub reason: String,
}

pub async fn revoke_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(body): Json<RevokeDeviceRequest>,
) -> Result<Response, AppError> {
    let device = state
        .registry
        .revoke_device(&device_id, &body.revoked_by, &body.reason)
        .await?;
    Ok(success(device, "Device revoked").into_response())
}

#[derive(Deserialize)]
pub struct ListDevicesQuery {
    pub active_only: Option<bool>,
}

pub async fn list_venue_devices(
    State(state): State<AppState>,
    Path(venue_id): Path<Uuid>,
    Query(query): Query<ListDevicesQuery>,
) -> Result<Response, AppError> {
    let devices = state
        .registry
        .list_venue_devices(venue_id, query.active_only.unwrap_or(true))
        .await?;
    Ok(success(devices, "Venue devices listed").into_response())
}

#[derive(Deserialize)]
pub struct CachePullQuery {
    pub event_id: Uuid,
}

pub async fn pull_cache(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<CachePullQuery>,
) -> Result<Response, AppError> {
    let pull = state.registry.pull_cache(&device_id, query.event_id).await?;
    Ok(success(pull, "Offline cache pulled").into_response())
}

#[derive(Deserialize)]
pub struct OfflineScanRequest {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub validation_hash: String,
}

/// Offline-scan reconciliation never errors to the device: the service
/// resolves internal failures to `valid: false`.
pub async fn offline_scan(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<OfflineScanRequest>,
) -> Response {
    let validation = state
        .registry
        .validate_offline_scan(req.ticket_id, req.event_id, &req.validation_hash, &device_id)
        .await;
    let message = if validation.valid {
        "Offline scan valid"
    } else {
        "Offline scan rejected"
    };
    success(validation, message).into_response()
}
