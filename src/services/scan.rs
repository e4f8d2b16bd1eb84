//! The online admission pipeline: token → duplicate/re-entry → zone,
//! each gate short-circuiting, every attempt logged.
//!
//! Fail-closed throughout: any store error or timeout on this path
//! becomes a denial with reason `VALIDATION_ERROR`, never an exception to
//! the scanning device.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{DenyReason, ReentryPolicy, ScanResult, Ticket, Zone};
use crate::services::duplicate::DuplicateScanDetector;
use crate::services::reentry;
use crate::services::token::TokenValidator;
use crate::services::zone;
use crate::utils::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub ticket_id: Uuid,
    pub timestamp: i64,
    pub nonce: String,
    pub signature: String,
    pub device_id: String,
    pub scan_point_zone: Zone,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScanDecision {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_remaining: Option<i64>,
}

impl ScanDecision {
    fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
            minutes_remaining: None,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allow: false,
            reason: Some(reason),
            minutes_remaining: None,
        }
    }
}

pub struct ScanPipeline {
    pool: PgPool,
    config: Arc<Config>,
    token: TokenValidator,
    duplicates: DuplicateScanDetector,
}

impl ScanPipeline {
    pub fn new(
        pool: PgPool,
        config: Arc<Config>,
        token: TokenValidator,
        duplicates: DuplicateScanDetector,
    ) -> Self {
        Self {
            pool,
            config,
            token,
            duplicates,
        }
    }

    /// Adjudicate one scan. Always returns a decision; the attempt is
    /// appended to the audit log whether admitted or denied.
    pub async fn scan(&self, req: &ScanRequest) -> ScanDecision {
        let decision = match self.evaluate(req).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(
                    error = ?e,
                    ticket_id = %req.ticket_id,
                    device_id = %req.device_id,
                    "Scan pipeline failed closed"
                );
                ScanDecision::deny(DenyReason::ValidationError)
            }
        };

        // The post-decision writes carry the same time budget as every
        // other store call on this path; a hung store must not hold the
        // gate open once the decision stands.
        if decision.allow {
            let recorded = self
                .bounded(self.duplicates.record_admission(
                    req.ticket_id,
                    Utc::now(),
                    self.config.duplicate_window_minutes,
                ))
                .await;
            if let Err(e) = recorded {
                tracing::warn!(error = ?e, ticket_id = %req.ticket_id, "Admission write-through failed");
            }
        }

        if let Err(e) = self.bounded(self.log_attempt(req, &decision)).await {
            tracing::error!(error = ?e, ticket_id = %req.ticket_id, "Failed to log scan attempt");
        }

        decision
    }

    async fn evaluate(&self, req: &ScanRequest) -> Result<ScanDecision, AppError> {
        let token = self
            .bounded(
                self.token
                    .validate(req.ticket_id, req.timestamp, &req.nonce, &req.signature),
            )
            .await?;
        if let Some(reason) = token.reason {
            return Ok(ScanDecision::deny(reason));
        }

        let ticket: Option<Ticket> = self
            .bounded(async {
                sqlx::query_as("SELECT * FROM tickets WHERE id = $1")
                    .bind(req.ticket_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(AppError::from)
            })
            .await?;
        let Some(ticket) = ticket else {
            return Ok(ScanDecision::deny(DenyReason::TicketNotFound));
        };
        if !ticket.status.is_scannable() {
            return Ok(ScanDecision::deny(DenyReason::TicketNotScannable));
        }

        let (scan_count, last_admitted): (i64, Option<DateTime<Utc>>) = self
            .bounded(async {
                sqlx::query_as(
                    "SELECT COUNT(*), MAX(scanned_at) FROM scan_attempts \
                     WHERE ticket_id = $1 AND result = 'ALLOW'",
                )
                .bind(ticket.id)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::from)
            })
            .await?;

        if scan_count > 0 {
            let dup = self
                .bounded(
                    self.duplicates
                        .is_duplicate(ticket.id, self.config.duplicate_window_minutes),
                )
                .await?;
            if dup.is_duplicate {
                return Ok(ScanDecision::deny(DenyReason::DuplicateScan));
            }

            let policy: Option<ReentryPolicy> = self
                .bounded(async {
                    sqlx::query_as("SELECT * FROM reentry_policies WHERE event_id = $1")
                        .bind(ticket.event_id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(AppError::from)
                })
                .await?;
            let verdict =
                reentry::check_reentry(policy.as_ref(), scan_count, last_admitted, Utc::now());
            if !verdict.allowed {
                return Ok(ScanDecision {
                    allow: false,
                    reason: verdict.reason,
                    minutes_remaining: verdict.minutes_remaining,
                });
            }
        }

        let zone_verdict = zone::check_zone(ticket.zone_entitlement, req.scan_point_zone);
        if !zone_verdict.allowed {
            return Ok(ScanDecision::deny(DenyReason::WrongZone));
        }

        Ok(ScanDecision::allow())
    }

    /// Budget every store call; a gate that cannot answer in time denies.
    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match timeout(Duration::from_millis(self.config.store_timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::InternalServerError(
                "Store call exceeded its time budget".to_string(),
            )),
        }
    }

    async fn log_attempt(
        &self,
        req: &ScanRequest,
        decision: &ScanDecision,
    ) -> Result<(), AppError> {
        let result = if decision.allow {
            ScanResult::Allow
        } else {
            ScanResult::Deny
        };
        sqlx::query(
            "INSERT INTO scan_attempts (ticket_id, device_id, result, reason) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(req.ticket_id)
        .bind(&req.device_id)
        .bind(result)
        .bind(decision.reason.map(DenyReason::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::token::compute_signature;

    fn test_pipeline(store_timeout_ms: u64) -> ScanPipeline {
        // Stores pointing at a closed port: connections fail fast, and
        // nothing on the scan path may wait past the budget regardless.
        let redis = Arc::new(redis::Client::open("redis://127.0.0.1:1").unwrap());
        let pool = PgPool::connect_lazy("postgres://127.0.0.1:1/none").unwrap();
        let config = Arc::new(Config {
            database_url: "postgres://127.0.0.1:1/none".to_string(),
            redis_url: "redis://127.0.0.1:1".to_string(),
            qr_secret: "test-signing-secret".to_string(),
            qr_freshness_secs: 30,
            duplicate_window_minutes: 15,
            cache_duration_minutes: 30,
            store_timeout_ms,
            port: 0,
        });
        let token = TokenValidator::new(
            config.qr_secret.clone(),
            config.qr_freshness_secs,
            Arc::clone(&redis),
        );
        let duplicates = DuplicateScanDetector::new(redis, pool.clone());
        ScanPipeline::new(pool, config, token, duplicates)
    }

    #[tokio::test]
    async fn test_bounded_cuts_off_hung_store_calls() {
        let pipeline = test_pipeline(50);
        let result: Result<(), AppError> = pipeline.bounded(std::future::pending()).await;
        assert!(matches!(result, Err(AppError::InternalServerError(_))));
    }

    #[tokio::test]
    async fn test_scan_fails_closed_and_returns_when_stores_are_down() {
        let pipeline = test_pipeline(200);
        let ticket_id = Uuid::new_v4();
        let timestamp = Utc::now().timestamp();
        let req = ScanRequest {
            ticket_id,
            timestamp,
            nonce: "nonce-1".to_string(),
            signature: compute_signature("test-signing-secret", ticket_id, timestamp, "nonce-1"),
            device_id: "SCANNER-TEST".to_string(),
            scan_point_zone: Zone::Ga,
        };

        // Both the evaluation and the attempt-log write hit dead stores;
        // the call must still complete with a denial, not hang or panic.
        let decision = pipeline.scan(&req).await;
        assert!(!decision.allow);
        assert_eq!(decision.reason, Some(DenyReason::ValidationError));
    }

    #[test]
    fn test_decision_constructors() {
        let allow = ScanDecision::allow();
        assert!(allow.allow);
        assert!(allow.reason.is_none());

        let deny = ScanDecision::deny(DenyReason::WrongZone);
        assert!(!deny.allow);
        assert_eq!(deny.reason, Some(DenyReason::WrongZone));
    }

    #[test]
    fn test_denial_serializes_reason_code() {
        let deny = ScanDecision::deny(DenyReason::QrExpired);
        let json = serde_json::to_value(deny).unwrap();
        assert_eq!(json["allow"], false);
        assert_eq!(json["reason"], "QR_EXPIRED");
        assert!(json.get("minutes_remaining").is_none());
    }
}
