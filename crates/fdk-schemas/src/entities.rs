//! Persisted entities.
//!
//! Cyclic relations (shipment ↔ round ↔ vendor ↔ car) are modeled as id
//! references; loaders attach related rows explicitly and nothing here holds
//! an object graph.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::{CarStatus, DocStat, Grade, Role, RoundStatus};

// ---------------------------------------------------------------------------
// Master data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    pub code: String,
    pub name: String,
    pub active: bool,
}

/// Catalog entry of canonical round times (table `mbooking_round`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterRound {
    pub id: i64,
    pub round_time: NaiveTime,
    pub round_name: Option<String>,
    pub active: bool,
}

/// Route lead time (table `mleadtime`). A truck is blocked for
/// `leadtime_days − 1` days past the appointment date, inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadTime {
    pub route: String,
    pub routedes: Option<String>,
    pub leadtime_days: i64,
}

// ---------------------------------------------------------------------------
// Vendors and cars
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub vencode: String,
    pub venname: String,
    pub grade: Grade,
    /// Fairness tie-break for the allocator; bumped on every assignment.
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Car {
    pub carlicense: String,
    /// Owning vendor.
    pub vencode: String,
    pub cartype: String,
    pub status: CarStatus,
    /// Set when an assignment is committed; the truck is considered busy
    /// until this date (inclusive).
    pub will_be_available_at: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// System account (table `system_users`). Credentials live with the external
/// auth service; this row carries role routing and the push token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub display_name: Option<String>,
    pub active: bool,
    /// Present for vendor accounts.
    pub vencode_ref: Option<String>,
    pub fcm_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Shipments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub shipid: String,
    pub customer_name: Option<String>,
    /// Warehouse code the shipment departs from.
    pub shippoint: String,
    pub route: Option<String>,
    pub cartype: String,
    pub volume_cbm: Option<f64>,
    /// Appointment timestamp.
    pub apmdate: DateTime<Utc>,
    pub crdate: DateTime<Utc>,
    pub chuser: Option<String>,
    pub chdate: Option<DateTime<Utc>>,
    pub booking_round_id: Option<i64>,
    pub docstat: DocStat,
    pub is_on_hold: bool,
    /// Pre-hold state, restored on unhold.
    pub docstat_before_hold: Option<DocStat>,
    /// Assigned or confirming vendor.
    pub vencode: Option<String>,
    pub carlicense: Option<String>,
    pub carnote: Option<String>,
    /// The grade currently offered the shipment (`02` only).
    pub current_grade_to_assign: Option<Grade>,
    pub confirmed_by_grade: Option<Grade>,
    /// Timestamp of the last transition into a timed state.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Vendors that actively rejected or timed out in this booking cycle.
    /// Set semantics; persisted as a JSONB array.
    #[serde(default)]
    pub rejected_by_vencodes: Vec<String>,
}

impl Shipment {
    pub fn rejected_contains(&self, vencode: &str) -> bool {
        self.rejected_by_vencodes.iter().any(|v| v == vencode)
    }
}

/// Shipment line detail (table `doh`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentDetail {
    pub doid: String,
    pub shipid: String,
    pub dlvdate: NaiveDate,
    pub cusid: String,
    pub cusname: String,
    pub route: String,
    pub province: String,
    pub volume_cbm: Option<f64>,
}

// ---------------------------------------------------------------------------
// Booking rounds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRound {
    pub id: i64,
    pub round_name: String,
    pub round_date: NaiveDate,
    pub round_time: NaiveTime,
    pub warehouse_code: String,
    pub total_volume_cbm: Option<f64>,
    pub status: RoundStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A round with its shipments eagerly attached, shipid ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundWithShipments {
    #[serde(flatten)]
    pub round: BookingRound,
    pub shipments: Vec<Shipment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejected_contains_is_exact_match() {
        let s = Shipment {
            shipid: "SH001".into(),
            customer_name: None,
            shippoint: "WH7".into(),
            route: None,
            cartype: "10".into(),
            volume_cbm: None,
            apmdate: Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
            crdate: Utc.with_ymd_and_hms(2025, 1, 9, 0, 0, 0).unwrap(),
            chuser: None,
            chdate: None,
            booking_round_id: None,
            docstat: DocStat::WaitingRound,
            is_on_hold: false,
            docstat_before_hold: None,
            vencode: None,
            carlicense: None,
            carnote: None,
            current_grade_to_assign: None,
            confirmed_by_grade: None,
            assigned_at: None,
            rejected_by_vencodes: vec!["V001".into()],
        };
        assert!(s.rejected_contains("V001"));
        assert!(!s.rejected_contains("V00"));
        assert!(!s.rejected_contains("V0011"));
    }
}
