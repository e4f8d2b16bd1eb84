use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Access-zone entitlement. Doubles as the zone of a scanning point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "zone_entitlement", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Zone {
    Ga,
    Vip,
    Backstage,
    All,
}

impl Zone {
    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Ga => "GA",
            Zone::Vip => "VIP",
            Zone::Backstage => "BACKSTAGE",
            Zone::All => "ALL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Sold,
    Transferred,
    Used,
    Cancelled,
    Refunded,
}

impl TicketStatus {
    /// Only SOLD and TRANSFERRED tickets may be admitted or included in an
    /// offline validation snapshot.
    pub fn is_scannable(self) -> bool {
        matches!(self, TicketStatus::Sold | TicketStatus::Transferred)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub zone_entitlement: Zone,
    pub seat: Option<String>,
    pub status: TicketStatus,
    /// Generated lazily on the first offline cache build that includes this
    /// ticket, then stable for the ticket's lifetime. Never serialized out.
    #[serde(skip_serializing, default)]
    pub signing_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
