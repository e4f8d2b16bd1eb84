//! Offline validation cache: per-event, a signed snapshot of every
//! cache-eligible ticket that an authorized device can evaluate with no
//! connectivity.
//!
//! A build is one transaction, serialized per event with an advisory
//! lock. Signing secrets are generated lazily inside that transaction, so
//! concurrent rebuild triggers cannot mint two secrets for one ticket.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use serde_json::json;
use sha2::Sha256;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::Zone;
use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct CacheBuildSummary {
    pub event_id: Uuid,
    pub ticket_count: u64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct EligibleTicket {
    id: Uuid,
    zone_entitlement: Zone,
    seat: Option<String>,
    signing_secret: Option<String>,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
}

pub struct OfflineCacheBuilder {
    pool: PgPool,
    cache_duration_minutes: i64,
}

impl OfflineCacheBuilder {
    pub fn new(pool: PgPool, cache_duration_minutes: i64) -> Self {
        Self {
            pool,
            cache_duration_minutes,
        }
    }

    /// Build the snapshot for one event. All-or-nothing: any failure rolls
    /// the whole build back, leaving prior entries untouched. An event
    /// with zero eligible tickets is a successful empty build.
    pub async fn generate_event_cache(
        &self,
        event_id: Uuid,
    ) -> Result<CacheBuildSummary, AppError> {
        let valid_from = Utc::now();
        let valid_until = valid_from + Duration::minutes(self.cache_duration_minutes);

        let mut tx = self.pool.begin().await?;

        // One build at a time per event; released on commit or rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(event_id))
            .execute(&mut *tx)
            .await?;

        let tickets: Vec<EligibleTicket> = sqlx::query_as(
            "SELECT t.id, t.zone_entitlement, t.seat, t.signing_secret, \
                    e.starts_at, e.ends_at \
             FROM tickets t \
             JOIN events e ON e.id = t.event_id \
             WHERE t.event_id = $1 AND t.status IN ('SOLD', 'TRANSFERRED')",
        )
        .bind(event_id)
        .fetch_all(&mut *tx)
        .await?;

        // Stale sweep only: entries still within validity from a prior
        // build stay, so devices holding that snapshot keep working.
        sqlx::query("DELETE FROM offline_cache_entries WHERE event_id = $1 AND valid_until < $2")
            .bind(event_id)
            .bind(valid_from)
            .execute(&mut *tx)
            .await?;

        for ticket in &tickets {
            let secret = match &ticket.signing_secret {
                Some(secret) => secret.clone(),
                None => {
                    let secret = generate_signing_secret();
                    sqlx::query(
                        "UPDATE tickets SET signing_secret = $1, updated_at = now() WHERE id = $2",
                    )
                    .bind(&secret)
                    .bind(ticket.id)
                    .execute(&mut *tx)
                    .await?;
                    secret
                }
            };

            let validation_hash = compute_validation_hash(
                &secret,
                ticket.id,
                event_id,
                ticket.zone_entitlement,
                ticket.seat.as_deref(),
                ticket.starts_at,
                ticket.ends_at,
            );

            let snapshot = json!({
                "ticket_id": ticket.id,
                "event_id": event_id,
                "zone_entitlement": ticket.zone_entitlement,
                "seat": ticket.seat,
                "event_starts_at": ticket.starts_at,
                "event_ends_at": ticket.ends_at,
            });

            sqlx::query(
                "INSERT INTO offline_cache_entries \
                 (ticket_id, event_id, validation_hash, ticket_data_snapshot, valid_from, valid_until) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(ticket.id)
            .bind(event_id)
            .bind(&validation_hash)
            .bind(&snapshot)
            .bind(valid_from)
            .bind(valid_until)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            event_id = %event_id,
            ticket_count = tickets.len(),
            "Offline cache built"
        );

        Ok(CacheBuildSummary {
            event_id,
            ticket_count: tickets.len() as u64,
            valid_from,
            valid_until,
        })
    }
}

/// Hash binding a ticket's identity and scan-relevant snapshot to its
/// signing secret. A device recomputes nothing: it matches this value
/// byte-for-byte, so any drift in the underlying ticket invalidates the
/// cached entry at the next build.
pub fn compute_validation_hash(
    secret: &str,
    ticket_id: Uuid,
    event_id: Uuid,
    zone: Zone,
    seat: Option<&str>,
    event_starts_at: DateTime<Utc>,
    event_ends_at: Option<DateTime<Utc>>,
) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any length");
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}",
        ticket_id,
        event_id,
        zone.as_str(),
        seat.unwrap_or(""),
        event_starts_at.timestamp(),
        event_ends_at.map(|t| t.timestamp()).unwrap_or(0),
    );
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn generate_signing_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn advisory_key(event_id: Uuid) -> i64 {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&event_id.as_bytes()[..8]);
    i64::from_be_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_hash_is_deterministic() {
        let ticket_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        let starts = Utc::now();

        let a = compute_validation_hash("s", ticket_id, event_id, Zone::Vip, Some("A1"), starts, None);
        let b = compute_validation_hash("s", ticket_id, event_id, Zone::Vip, Some("A1"), starts, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_validation_hash_is_sensitive_to_every_field() {
        let ticket_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        let starts = Utc::now();
        let ends = Some(starts + Duration::hours(4));

        let base =
            compute_validation_hash("s", ticket_id, event_id, Zone::Vip, Some("A1"), starts, ends);

        let variants = [
            compute_validation_hash("t", ticket_id, event_id, Zone::Vip, Some("A1"), starts, ends),
            compute_validation_hash("s", Uuid::new_v4(), event_id, Zone::Vip, Some("A1"), starts, ends),
            compute_validation_hash("s", ticket_id, Uuid::new_v4(), Zone::Vip, Some("A1"), starts, ends),
            compute_validation_hash("s", ticket_id, event_id, Zone::Ga, Some("A1"), starts, ends),
            compute_validation_hash("s", ticket_id, event_id, Zone::Vip, Some("A2"), starts, ends),
            compute_validation_hash("s", ticket_id, event_id, Zone::Vip, None, starts, ends),
            compute_validation_hash(
                "s",
                ticket_id,
                event_id,
                Zone::Vip,
                Some("A1"),
                starts + Duration::minutes(1),
                ends,
            ),
            compute_validation_hash("s", ticket_id, event_id, Zone::Vip, Some("A1"), starts, None),
        ];

        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn test_generated_secrets_are_unique_hex() {
        let a = generate_signing_secret();
        let b = generate_signing_secret();
        assert_eq!(a.len(), 64);
        assert!(hex::decode(&a).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_advisory_key_is_stable_per_event() {
        let event_id = Uuid::new_v4();
        assert_eq!(advisory_key(event_id), advisory_key(event_id));
        assert_ne!(advisory_key(event_id), advisory_key(Uuid::new_v4()));
    }
}
