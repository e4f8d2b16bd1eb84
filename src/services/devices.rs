//! Scanner-device registry and offline distribution.
//!
//! The pull gate is deliberately opaque: a missing device, an inactive
//! device, and a device without the offline grant all surface as the same
//! `DEVICE_NOT_AUTHORIZED`, so probing cannot map device state.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{DeviceType, OfflineCacheEntry, ScanResult, ScannerDevice};
use crate::utils::error::AppError;

const PG_UNIQUE_VIOLATION: &str = "23505";
const GENERATED_ID_LEN: usize = 10;

#[derive(Debug, Deserialize)]
pub struct NewDevice {
    pub device_id: Option<String>,
    pub venue_id: Uuid,
    pub device_type: Option<DeviceType>,
    pub can_scan_offline: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CachePull {
    pub entries: Vec<OfflineCacheEntry>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfflineReason {
    InvalidOfflineHash,
    ValidationError,
}

impl OfflineReason {
    pub fn as_str(self) -> &'static str {
        match self {
            OfflineReason::InvalidOfflineHash => "INVALID_OFFLINE_HASH",
            OfflineReason::ValidationError => "VALIDATION_ERROR",
        }
    }
}

/// Outcome of an offline-scan reconciliation. Never an error: a device in
/// the field needs a decision, so internal failures degrade to a denial.
#[derive(Debug, Serialize)]
pub struct OfflineValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<OfflineReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_data: Option<Value>,
}

pub struct DeviceRegistry {
    pool: PgPool,
}

impl DeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn register_device(&self, new: NewDevice) -> Result<ScannerDevice, AppError> {
        let device_id = new.device_id.unwrap_or_else(generate_device_id);
        let device_type = new.device_type.unwrap_or_default();
        let can_scan_offline = new.can_scan_offline.unwrap_or(false);

        let result = sqlx::query_as::<_, ScannerDevice>(
            "INSERT INTO scanner_devices (device_id, venue_id, device_type, can_scan_offline) \
             VALUES ($1, $2, $3, $4) \
             RETURNING *",
        )
        .bind(&device_id)
        .bind(new.venue_id)
        .bind(device_type)
        .bind(can_scan_offline)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(device) => {
                tracing::info!(device_id = %device.device_id, venue_id = %device.venue_id, "Device registered");
                Ok(device)
            }
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
                Err(AppError::DeviceIdExists(format!(
                    "Device id '{}' is already registered",
                    device_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Revocation is terminal: the row is kept for audit, never deleted,
    /// and the first revocation's stamp is never overwritten.
    pub async fn revoke_device(
        &self,
        device_id: &str,
        revoked_by: &str,
        reason: &str,
    ) -> Result<ScannerDevice, AppError> {
        let existing = sqlx::query_as::<_, ScannerDevice>(
            "SELECT * FROM scanner_devices WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::DeviceNotFound(format!("Device '{}' was not found", device_id)))?;

        if let Some(kept) = keep_existing_revocation(existing) {
            return Ok(kept);
        }

        // COALESCE keeps the original audit stamp even if two revokers
        // race past the check above.
        let device = sqlx::query_as::<_, ScannerDevice>(
            "UPDATE scanner_devices \
             SET is_active = false, \
                 revoked_at = COALESCE(revoked_at, now()), \
                 revoked_by = COALESCE(revoked_by, $2), \
                 revoked_reason = COALESCE(revoked_reason, $3) \
             WHERE device_id = $1 \
             RETURNING *",
        )
        .bind(device_id)
        .bind(revoked_by)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::DeviceNotFound(format!("Device '{}' was not found", device_id)))?;

        tracing::info!(device_id = %device.device_id, revoked_by = %revoked_by, "Device revoked");
        Ok(device)
    }

    pub async fn list_venue_devices(
        &self,
        venue_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<ScannerDevice>, AppError> {
        let devices = sqlx::query_as::<_, ScannerDevice>(
            "SELECT * FROM scanner_devices \
             WHERE venue_id = $1 AND (NOT $2 OR is_active) \
             ORDER BY registered_at",
        )
        .bind(venue_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(devices)
    }

    /// Hand the current offline snapshot to a device. Fail-closed gate:
    /// exists AND active AND offline-enabled, or nothing at all.
    pub async fn pull_cache(
        &self,
        device_id: &str,
        event_id: Uuid,
    ) -> Result<CachePull, AppError> {
        let device = sqlx::query_as::<_, ScannerDevice>(
            "SELECT * FROM scanner_devices WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        let authorized = matches!(
            &device,
            Some(d) if d.is_active && d.can_scan_offline
        );
        if !authorized {
            return Err(AppError::DeviceNotAuthorized);
        }

        let now = Utc::now();
        let entries = sqlx::query_as::<_, OfflineCacheEntry>(
            "SELECT * FROM offline_cache_entries \
             WHERE event_id = $1 AND valid_from <= $2 AND valid_until > $2",
        )
        .bind(event_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        sqlx::query("UPDATE scanner_devices SET last_sync_at = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        tracing::info!(device_id = %device_id, event_id = %event_id, entries = entries.len(), "Cache pulled");
        Ok(CachePull {
            entries,
            synced_at: now,
        })
    }

    /// Reconcile an offline scan a device performed against its snapshot.
    /// Infallible by contract: internal errors resolve to a denial.
    pub async fn validate_offline_scan(
        &self,
        ticket_id: Uuid,
        event_id: Uuid,
        validation_hash: &str,
        device_id: &str,
    ) -> OfflineValidation {
        let matched = self
            .lookup_offline_entry(ticket_id, event_id, validation_hash)
            .await;

        let validation = match matched {
            Ok(Some(snapshot)) => OfflineValidation {
                valid: true,
                reason: None,
                ticket_data: Some(snapshot),
            },
            Ok(None) => OfflineValidation {
                valid: false,
                reason: Some(OfflineReason::InvalidOfflineHash),
                ticket_data: None,
            },
            Err(e) => {
                tracing::error!(error = ?e, ticket_id = %ticket_id, "Offline validation failed closed");
                OfflineValidation {
                    valid: false,
                    reason: Some(OfflineReason::ValidationError),
                    ticket_data: None,
                }
            }
        };

        // Best-effort reconciliation record; the decision stands either way.
        let (result, reason) = if validation.valid {
            (ScanResult::Allow, None)
        } else {
            (ScanResult::Deny, validation.reason.map(OfflineReason::as_str))
        };
        let logged = sqlx::query(
            "INSERT INTO scan_attempts (ticket_id, device_id, result, reason) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(ticket_id)
        .bind(device_id)
        .bind(result)
        .bind(reason)
        .execute(&self.pool)
        .await;
        if let Err(e) = logged {
            tracing::warn!(error = ?e, ticket_id = %ticket_id, "Failed to log offline scan attempt");
        }

        validation
    }

    async fn lookup_offline_entry(
        &self,
        ticket_id: Uuid,
        event_id: Uuid,
        validation_hash: &str,
    ) -> Result<Option<Value>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT ticket_data_snapshot FROM offline_cache_entries \
             WHERE ticket_id = $1 AND event_id = $2 AND validation_hash = $3 \
               AND valid_from <= now() AND valid_until > now() \
             ORDER BY valid_until DESC \
             LIMIT 1",
        )
        .bind(ticket_id)
        .bind(event_id)
        .bind(validation_hash)
        .fetch_optional(&self.pool)
        .await
    }
}

/// A device that already carries a revocation stamp is returned as-is:
/// the stamp is terminal and must survive repeated revoke calls.
fn keep_existing_revocation(device: ScannerDevice) -> Option<ScannerDevice> {
    if device.revoked_at.is_some() {
        Some(device)
    } else {
        None
    }
}

fn generate_device_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect();
    format!("SCANNER-{}", suffix.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_device_id_format() {
        let id = generate_device_id();
        let suffix = id.strip_prefix("SCANNER-").expect("prefix");
        assert_eq!(suffix.len(), GENERATED_ID_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_device_ids_are_unique() {
        assert_ne!(generate_device_id(), generate_device_id());
    }

    fn device(revoked: bool) -> ScannerDevice {
        let now = Utc::now();
        ScannerDevice {
            device_id: "SCANNER-TEST".to_string(),
            venue_id: Uuid::new_v4(),
            device_type: DeviceType::Handheld,
            is_active: !revoked,
            can_scan_offline: false,
            last_sync_at: None,
            registered_at: now,
            revoked_at: revoked.then_some(now),
            revoked_by: revoked.then(|| "ops@venue".to_string()),
            revoked_reason: revoked.then(|| "lost".to_string()),
        }
    }

    #[test]
    fn test_first_revocation_proceeds_to_stamping() {
        assert!(keep_existing_revocation(device(false)).is_none());
    }

    #[test]
    fn test_repeat_revocation_preserves_original_stamp() {
        let original = device(true);
        let original_stamp = original.revoked_at;

        let kept = keep_existing_revocation(original).expect("terminal state must short-circuit");
        assert_eq!(kept.revoked_at, original_stamp);
        assert_eq!(kept.revoked_by.as_deref(), Some("ops@venue"));
        assert_eq!(kept.revoked_reason.as_deref(), Some("lost"));
        assert!(!kept.is_active);
    }

    #[test]
    fn test_offline_reason_wire_format() {
        let json = serde_json::to_string(&OfflineReason::InvalidOfflineHash).unwrap();
        assert_eq!(
            json,
            format!("\"{}\"", OfflineReason::InvalidOfflineHash.as_str())
        );
    }
}
