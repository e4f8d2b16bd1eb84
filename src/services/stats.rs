//! Per-event scan aggregates over a closed set of time ranges.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::utils::error::AppError;

/// The only ranges the stats endpoint accepts. Anything else is a caller
/// error, not a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsRange {
    OneHour,
    SixHours,
    Day,
    Week,
    Month,
}

impl StatsRange {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "1h" => Some(StatsRange::OneHour),
            "6h" => Some(StatsRange::SixHours),
            "24h" => Some(StatsRange::Day),
            "7d" => Some(StatsRange::Week),
            "30d" => Some(StatsRange::Month),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatsRange::OneHour => "1h",
            StatsRange::SixHours => "6h",
            StatsRange::Day => "24h",
            StatsRange::Week => "7d",
            StatsRange::Month => "30d",
        }
    }

    fn duration(self) -> Duration {
        match self {
            StatsRange::OneHour => Duration::hours(1),
            StatsRange::SixHours => Duration::hours(6),
            StatsRange::Day => Duration::hours(24),
            StatsRange::Week => Duration::days(7),
            StatsRange::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventScanStats {
    pub event_id: Uuid,
    pub range: &'static str,
    pub total: i64,
    pub allowed: i64,
    pub denied: i64,
    pub duplicates: i64,
    pub wrong_zone: i64,
    pub reentry_denied: i64,
}

pub async fn event_scan_stats(
    pool: &PgPool,
    event_id: Uuid,
    range: StatsRange,
) -> Result<EventScanStats, AppError> {
    let since = Utc::now() - range.duration();

    let (total, allowed, denied, duplicates, wrong_zone, reentry_denied): (
        i64,
        i64,
        i64,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE sa.result = 'ALLOW'), \
                COUNT(*) FILTER (WHERE sa.result = 'DENY'), \
                COUNT(*) FILTER (WHERE sa.reason = 'DUPLICATE_SCAN'), \
                COUNT(*) FILTER (WHERE sa.reason = 'WRONG_ZONE'), \
                COUNT(*) FILTER (WHERE sa.reason IN \
                    ('NO_REENTRY', 'REENTRY_DISABLED', 'MAX_REENTRIES_REACHED', 'COOLDOWN_ACTIVE')) \
         FROM scan_attempts sa \
         JOIN tickets t ON t.id = sa.ticket_id \
         WHERE t.event_id = $1 AND sa.scanned_at > $2",
    )
    .bind(event_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(EventScanStats {
        event_id,
        range: range.as_str(),
        total,
        allowed,
        denied,
        duplicates,
        wrong_zone,
        reentry_denied,
    })
}
