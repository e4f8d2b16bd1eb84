//! Re-entry policy evaluation. Pure: the decision is a function of the
//! event's policy and the ticket's admission history, nothing else.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{DenyReason, ReentryPolicy};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReentryDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_remaining: Option<i64>,
}

impl ReentryDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            minutes_remaining: None,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            minutes_remaining: None,
        }
    }
}

/// Deny-by-default: an event without a policy row does not admit anyone a
/// second time.
pub fn check_reentry(
    policy: Option<&ReentryPolicy>,
    scan_count: i64,
    last_scanned_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ReentryDecision {
    let Some(policy) = policy else {
        return ReentryDecision::deny(DenyReason::NoReentry);
    };

    if !policy.enabled {
        return ReentryDecision::deny(DenyReason::ReentryDisabled);
    }

    if scan_count >= i64::from(policy.max_reentries) {
        return ReentryDecision::deny(DenyReason::MaxReentriesReached);
    }

    if let Some(last) = last_scanned_at {
        let elapsed_minutes = (now - last).num_minutes();
        let cooldown = i64::from(policy.cooldown_minutes);
        if elapsed_minutes < cooldown {
            return ReentryDecision {
                allowed: false,
                reason: Some(DenyReason::CooldownActive),
                minutes_remaining: Some(cooldown - elapsed_minutes),
            };
        }
    }

    ReentryDecision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn policy(enabled: bool, max_reentries: i32, cooldown_minutes: i32) -> ReentryPolicy {
        let now = Utc::now();
        ReentryPolicy {
            event_id: Uuid::new_v4(),
            enabled,
            max_reentries,
            cooldown_minutes,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_missing_policy_denies() {
        let d = check_reentry(None, 1, None, Utc::now());
        assert!(!d.allowed);
        assert_eq!(d.reason, Some(DenyReason::NoReentry));
    }

    #[test]
    fn test_disabled_policy_denies() {
        let p = policy(false, 10, 10);
        let d = check_reentry(Some(&p), 1, None, Utc::now());
        assert_eq!(d.reason, Some(DenyReason::ReentryDisabled));
    }

    #[test]
    fn test_max_reentries_reached() {
        let p = policy(true, 3, 0);
        let d = check_reentry(Some(&p), 3, None, Utc::now());
        assert_eq!(d.reason, Some(DenyReason::MaxReentriesReached));
    }

    #[test]
    fn test_outside_cooldown_allows() {
        let p = policy(true, 10, 10);
        let now = Utc::now();
        let d = check_reentry(Some(&p), 2, Some(now - Duration::minutes(20)), now);
        assert!(d.allowed);
        assert!(d.reason.is_none());
    }

    #[test]
    fn test_inside_cooldown_reports_minutes_remaining() {
        let p = policy(true, 10, 10);
        let now = Utc::now();
        let d = check_reentry(Some(&p), 2, Some(now - Duration::minutes(5)), now);
        assert!(!d.allowed);
        assert_eq!(d.reason, Some(DenyReason::CooldownActive));
        assert_eq!(d.minutes_remaining, Some(5));
    }

    #[test]
    fn test_cooldown_minutes_remaining_is_positive() {
        let p = policy(true, 10, 10);
        let now = Utc::now();
        // 9m30s elapsed rounds down to 9 whole minutes: still cooling.
        let d = check_reentry(Some(&p), 1, Some(now - Duration::seconds(570)), now);
        assert_eq!(d.reason, Some(DenyReason::CooldownActive));
        assert!(d.minutes_remaining.unwrap() > 0);
    }
}
