//! Ephemeral QR-token validation: freshness, replay protection, signature.
//!
//! A token is `HMAC-SHA256(secret, "{ticket_id}:{timestamp}:{nonce}")`
//! under the process-wide QR signing secret, hex-encoded. The nonce is
//! single-use within the freshness window; consumption is an atomic
//! `SET NX EX` in redis so two concurrent replays of the same nonce can
//! never both pass.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::models::DenyReason;
use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_KEY_PREFIX: &str = "qr:nonce:";

/// How far into the future a token's timestamp may sit before it is
/// rejected. Bounds the nonce marker's lifetime: without this cap a
/// far-future timestamp would stay "fresh" long after its marker expired,
/// reopening the replay window.
const MAX_CLOCK_SKEW_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenDecision {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl TokenDecision {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

pub struct TokenValidator {
    secret: String,
    freshness_secs: i64,
    redis: Arc<redis::Client>,
}

impl TokenValidator {
    pub fn new(secret: String, freshness_secs: i64, redis: Arc<redis::Client>) -> Self {
        Self {
            secret,
            freshness_secs,
            redis,
        }
    }

    /// Adjudicate a single token. Checks short-circuit in strict order:
    /// freshness, replay, signature, then the atomic nonce consume.
    pub async fn validate(
        &self,
        ticket_id: Uuid,
        timestamp: i64,
        nonce: &str,
        signature: &str,
    ) -> Result<TokenDecision, AppError> {
        let now = Utc::now().timestamp();
        if !is_fresh(timestamp, now, self.freshness_secs) {
            return Ok(TokenDecision::deny(DenyReason::QrExpired));
        }

        let key = format!("{}{}", NONCE_KEY_PREFIX, nonce);
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // Early-out only; the SET NX below is the authoritative gate.
        let seen: bool = redis::cmd("EXISTS")
            .arg(&key)
            .query_async(&mut conn)
            .await?;
        if seen {
            return Ok(TokenDecision::deny(DenyReason::QrAlreadyUsed));
        }

        if !verify_signature(&self.secret, ticket_id, timestamp, nonce, signature) {
            return Ok(TokenDecision::deny(DenyReason::InvalidQr));
        }

        // Atomic consume: set-if-absent, TTL covering the token's whole
        // remaining freshness so the marker cannot lapse while the token
        // could still pass the freshness gate. Of two racers carrying the
        // same nonce, exactly one observes true here.
        let consumed: bool = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(nonce_ttl_secs(timestamp, now, self.freshness_secs))
            .query_async(&mut conn)
            .await?;
        if !consumed {
            return Ok(TokenDecision::deny(DenyReason::QrAlreadyUsed));
        }

        Ok(TokenDecision::valid())
    }
}

pub fn is_fresh(timestamp: i64, now: i64, freshness_secs: i64) -> bool {
    if timestamp - now > MAX_CLOCK_SKEW_SECS {
        return false;
    }
    now - timestamp <= freshness_secs
}

/// TTL for a consumed nonce marker: the freshness window, extended when
/// the timestamp is ahead of us so the marker outlives the token.
fn nonce_ttl_secs(timestamp: i64, now: i64, freshness_secs: i64) -> u64 {
    let remaining = (timestamp + freshness_secs) - now;
    remaining.max(freshness_secs).max(1) as u64
}

/// Compute the hex signature a legitimate issuer would embed in the QR.
pub fn compute_signature(secret: &str, ticket_id: Uuid, timestamp: i64, nonce: &str) -> String {
    hex::encode(signature_tag(secret, ticket_id, timestamp, nonce))
}

/// Constant-time verification of a supplied hex signature.
pub fn verify_signature(
    secret: &str,
    ticket_id: Uuid,
    timestamp: i64,
    nonce: &str,
    supplied: &str,
) -> bool {
    let Ok(supplied_bytes) = hex::decode(supplied) else {
        return false;
    };
    let mut mac = new_mac(secret);
    mac.update(message(ticket_id, timestamp, nonce).as_bytes());
    mac.verify_slice(&supplied_bytes).is_ok()
}

fn signature_tag(secret: &str, ticket_id: Uuid, timestamp: i64, nonce: &str) -> Vec<u8> {
    let mut mac = new_mac(secret);
    mac.update(message(ticket_id, timestamp, nonce).as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn message(ticket_id: Uuid, timestamp: i64, nonce: &str) -> String {
    format!("{}:{}:{}", ticket_id, timestamp, nonce)
}

fn new_mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length.
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any length")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret";

    #[test]
    fn test_correct_signature_verifies() {
        let ticket_id = Uuid::new_v4();
        let ts = Utc::now().timestamp();
        let sig = compute_signature(SECRET, ticket_id, ts, "nonce-1");
        assert!(verify_signature(SECRET, ticket_id, ts, "nonce-1", &sig));
    }

    #[test]
    fn test_tampering_any_field_breaks_signature() {
        let ticket_id = Uuid::new_v4();
        let ts = Utc::now().timestamp();
        let sig = compute_signature(SECRET, ticket_id, ts, "nonce-1");

        assert!(!verify_signature(SECRET, Uuid::new_v4(), ts, "nonce-1", &sig));
        assert!(!verify_signature(SECRET, ticket_id, ts + 1, "nonce-1", &sig));
        assert!(!verify_signature(SECRET, ticket_id, ts, "nonce-2", &sig));
        assert!(!verify_signature("other-secret", ticket_id, ts, "nonce-1", &sig));
    }

    #[test]
    fn test_non_hex_signature_is_rejected() {
        let ticket_id = Uuid::new_v4();
        assert!(!verify_signature(SECRET, ticket_id, 0, "n", "not hex!!"));
        assert!(!verify_signature(SECRET, ticket_id, 0, "n", ""));
    }

    #[test]
    fn test_freshness_window() {
        let now = 1_700_000_000;
        assert!(is_fresh(now, now, 30));
        assert!(is_fresh(now - 30, now, 30));
        assert!(!is_fresh(now - 31, now, 30));
    }

    #[test]
    fn test_future_timestamps_beyond_skew_allowance_are_stale() {
        let now = 1_700_000_000;
        assert!(is_fresh(now + MAX_CLOCK_SKEW_SECS, now, 30));
        assert!(!is_fresh(now + MAX_CLOCK_SKEW_SECS + 1, now, 30));
        assert!(!is_fresh(now + 120, now, 30));
    }

    #[test]
    fn test_nonce_marker_outlives_token_freshness() {
        // For every timestamp the freshness gate accepts, the marker's TTL
        // must reach past the moment the token itself goes stale: a marker
        // that lapses first would let the same tuple validate twice.
        let now = 1_700_000_000;
        let window = 30;
        for offset in [-window, -10, 0, MAX_CLOCK_SKEW_SECS] {
            let timestamp = now + offset;
            assert!(is_fresh(timestamp, now, window));
            let ttl = nonce_ttl_secs(timestamp, now, window) as i64;
            assert!(
                now + ttl >= timestamp + window,
                "marker for offset {} lapses while token is still fresh",
                offset
            );
        }
    }

    #[tokio::test]
    async fn test_expired_token_denied_before_any_store_access() {
        // Freshness is checked first: an unreachable redis must not matter.
        let redis = Arc::new(redis::Client::open("redis://127.0.0.1:1").unwrap());
        let validator = TokenValidator::new(SECRET.to_string(), 30, redis);

        let ticket_id = Uuid::new_v4();
        let stale = Utc::now().timestamp() - 120;
        let sig = compute_signature(SECRET, ticket_id, stale, "n");

        let decision = validator.validate(ticket_id, stale, "n", &sig).await.unwrap();
        assert!(!decision.valid);
        assert_eq!(decision.reason, Some(DenyReason::QrExpired));
    }
}
