//! Access-zone authorization. Zones form a partial order of admission
//! capability; the match below is the entire policy. Extending the `Zone`
//! enum forces this table to be revisited at compile time — there is no
//! default-allow arm.

use serde::Serialize;

use crate::models::{DenyReason, Zone};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ZoneDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

pub fn check_zone(ticket_zone: Zone, scan_point_zone: Zone) -> ZoneDecision {
    let allowed = match (ticket_zone, scan_point_zone) {
        (Zone::All, _) => true,
        (Zone::Backstage, Zone::Backstage) => true,
        (Zone::Vip, Zone::Vip | Zone::Ga) => true,
        (Zone::Ga, Zone::Ga) => true,
        (Zone::Backstage | Zone::Vip | Zone::Ga, _) => false,
    };

    ZoneDecision {
        allowed,
        reason: if allowed {
            None
        } else {
            Some(DenyReason::WrongZone)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_zone_matrix() {
        use Zone::*;
        // (ticket zone, scan point zone, expected admission) — all 16 pairs.
        let table = [
            (Ga, Ga, true),
            (Ga, Vip, false),
            (Ga, Backstage, false),
            (Ga, All, false),
            (Vip, Ga, true),
            (Vip, Vip, true),
            (Vip, Backstage, false),
            (Vip, All, false),
            (Backstage, Ga, false),
            (Backstage, Vip, false),
            (Backstage, Backstage, true),
            (Backstage, All, false),
            (All, Ga, true),
            (All, Vip, true),
            (All, Backstage, true),
            (All, All, true),
        ];

        for (ticket, point, expected) in table {
            let decision = check_zone(ticket, point);
            assert_eq!(
                decision.allowed, expected,
                "ticket {:?} at {:?} gate",
                ticket, point
            );
            if expected {
                assert!(decision.reason.is_none());
            } else {
                assert_eq!(decision.reason, Some(DenyReason::WrongZone));
            }
        }
    }
}
