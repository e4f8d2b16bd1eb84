use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-event re-entry configuration, owned by event organizers. Read-only
/// to the admission engine; an event with no row denies re-entry outright.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReentryPolicy {
    pub event_id: Uuid,
    pub enabled: bool,
    pub max_reentries: i32,
    pub cooldown_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
