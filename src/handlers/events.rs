use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::services::stats::{self, StatsRange};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn build_event_cache(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let summary = state.cache_builder.generate_event_cache(event_id).await?;
    Ok(success(summary, "Offline cache generated").into_response())
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub range: String,
}

pub async fn event_stats(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, AppError> {
    let range = StatsRange::parse(&query.range).ok_or_else(|| {
        AppError::ValidationError(format!(
            "Unrecognized stats range '{}'; expected one of 1h, 6h, 24h, 7d, 30d",
            query.range
        ))
    })?;
    let stats = stats::event_scan_stats(&state.pool, event_id, range).await?;
    Ok(success(stats, "Event scan stats").into_response())
}
