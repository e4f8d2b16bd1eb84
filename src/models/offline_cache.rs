use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One precomputed validation row per (event, ticket) per cache build.
/// Rebuilds insert fresh rows and only sweep expired ones, so a device
/// holding an older snapshot keeps validating until its entries lapse.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OfflineCacheEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub validation_hash: String,
    pub ticket_data_snapshot: serde_json::Value,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}
