use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scan_result", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanResult {
    Allow,
    Deny,
}

/// Append-only audit record. Written on every adjudicated attempt, online
/// or offline-reconciled; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScanAttempt {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub device_id: String,
    pub result: ScanResult,
    pub reason: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

/// Why a scan was denied. Denials are decisions, not errors: the scanner
/// always gets a `{ allow: false, reason }` body, never a 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    QrExpired,
    QrAlreadyUsed,
    InvalidQr,
    DuplicateScan,
    WrongZone,
    NoReentry,
    ReentryDisabled,
    MaxReentriesReached,
    CooldownActive,
    TicketNotFound,
    TicketNotScannable,
    /// Fail-closed fallback: a store timed out or errored mid-decision.
    ValidationError,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::QrExpired => "QR_EXPIRED",
            DenyReason::QrAlreadyUsed => "QR_ALREADY_USED",
            DenyReason::InvalidQr => "INVALID_QR",
            DenyReason::DuplicateScan => "DUPLICATE_SCAN",
            DenyReason::WrongZone => "WRONG_ZONE",
            DenyReason::NoReentry => "NO_REENTRY",
            DenyReason::ReentryDisabled => "REENTRY_DISABLED",
            DenyReason::MaxReentriesReached => "MAX_REENTRIES_REACHED",
            DenyReason::CooldownActive => "COOLDOWN_ACTIVE",
            DenyReason::TicketNotFound => "TICKET_NOT_FOUND",
            DenyReason::TicketNotScannable => "TICKET_NOT_SCANNABLE",
            DenyReason::ValidationError => "VALIDATION_ERROR",
        }
    }
}
