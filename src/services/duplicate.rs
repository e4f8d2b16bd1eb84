//! Duplicate-scan suppression: a fast redis cache over the durable
//! attempt log, keyed per ticket.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::utils::error::AppError;

const LAST_SCAN_KEY_PREFIX: &str = "scan:last:";

pub const MAX_WINDOW_MINUTES: i64 = 1440;

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<DateTime<Utc>>,
}

/// Caller-error guard: the window must be within [0, 1440] minutes. Runs
/// before any store I/O; out-of-range is never silently clamped.
pub fn validate_window(window_minutes: i64) -> Result<(), AppError> {
    if !(0..=MAX_WINDOW_MINUTES).contains(&window_minutes) {
        return Err(AppError::InvalidWindow(format!(
            "window_minutes must be within [0, {}], got {}",
            MAX_WINDOW_MINUTES, window_minutes
        )));
    }
    Ok(())
}

pub struct DuplicateScanDetector {
    redis: Arc<redis::Client>,
    pool: PgPool,
}

impl DuplicateScanDetector {
    pub fn new(redis: Arc<redis::Client>, pool: PgPool) -> Self {
        Self { redis, pool }
    }

    /// Was this ticket admitted within the last `window_minutes`?
    ///
    /// Consults the fast cache first; on a miss falls back to the durable
    /// attempt log and backfills the cache with the remaining window as
    /// TTL, so repeat checks inside the same window stay off the database.
    pub async fn is_duplicate(
        &self,
        ticket_id: Uuid,
        window_minutes: i64,
    ) -> Result<DuplicateCheck, AppError> {
        validate_window(window_minutes)?;
        if window_minutes == 0 {
            return Ok(DuplicateCheck {
                is_duplicate: false,
                last_scan: None,
            });
        }

        let now = Utc::now();
        let key = cache_key(ticket_id);
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let cached: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        if let Some(raw) = cached {
            if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
                let ts = ts.with_timezone(&Utc);
                if now - ts <= Duration::minutes(window_minutes) {
                    return Ok(DuplicateCheck {
                        is_duplicate: true,
                        last_scan: Some(ts),
                    });
                }
            }
        }

        let cutoff = now - Duration::minutes(window_minutes);
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT scanned_at FROM scan_attempts \
             WHERE ticket_id = $1 AND result = 'ALLOW' AND scanned_at > $2 \
             ORDER BY scanned_at DESC LIMIT 1",
        )
        .bind(ticket_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        match last {
            Some(ts) => {
                let remaining = (ts + Duration::minutes(window_minutes) - now).num_seconds();
                if remaining > 0 {
                    let _: () = redis::cmd("SET")
                        .arg(&key)
                        .arg(ts.to_rfc3339())
                        .arg("EX")
                        .arg(remaining as u64)
                        .query_async(&mut conn)
                        .await?;
                }
                Ok(DuplicateCheck {
                    is_duplicate: true,
                    last_scan: Some(ts),
                })
            }
            None => Ok(DuplicateCheck {
                is_duplicate: false,
                last_scan: None,
            }),
        }
    }

    /// Write-through on an admission so the next check within the window
    /// never needs the durable store.
    pub async fn record_admission(
        &self,
        ticket_id: Uuid,
        scanned_at: DateTime<Utc>,
        window_minutes: i64,
    ) -> Result<(), AppError> {
        if window_minutes <= 0 {
            return Ok(());
        }
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(cache_key(ticket_id))
            .arg(scanned_at.to_rfc3339())
            .arg("EX")
            .arg((window_minutes * 60) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

fn cache_key(ticket_id: Uuid) -> String {
    format!("{}{}", LAST_SCAN_KEY_PREFIX, ticket_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        assert!(validate_window(0).is_ok());
        assert!(validate_window(15).is_ok());
        assert!(validate_window(1440).is_ok());
        assert!(matches!(
            validate_window(-1),
            Err(AppError::InvalidWindow(_))
        ));
        assert!(matches!(
            validate_window(1441),
            Err(AppError::InvalidWindow(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_window_rejected_before_store_access() {
        // An unreachable redis and an unconnected pool: the guard must
        // fire before either is touched.
        let redis = Arc::new(redis::Client::open("redis://127.0.0.1:1").unwrap());
        let pool = PgPool::connect_lazy("postgres://127.0.0.1:1/none").unwrap();
        let detector = DuplicateScanDetector::new(redis, pool);

        let err = detector
            .is_duplicate(Uuid::new_v4(), 2000)
            .await
            .expect_err("out-of-range window must error");
        assert!(matches!(err, AppError::InvalidWindow(_)));
    }
}
