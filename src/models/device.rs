use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "device_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Handheld,
    Turnstile,
    Kiosk,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Handheld
    }
}

/// A provisioned physical scanner. Never deleted: revocation flips
/// `is_active` and stamps the audit fields, and that state is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScannerDevice {
    pub device_id: String,
    pub venue_id: Uuid,
    pub device_type: DeviceType,
    pub is_active: bool,
    pub can_scan_offline: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub revoked_reason: Option<String>,
}
