//! Request and response DTOs for the HTTP surface.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use fdk_schemas::{Shipment, ShipmentDetail};

use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ShipmentWithDetails {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub details: Vec<ShipmentDetail>,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UnassignedQuery {
    pub apmdate: Option<NaiveDate>,
    pub shippoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeldQuery {
    pub shippoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShipmentsQuery {
    pub docstat: Option<String>,
    pub vencode: Option<String>,
    pub apmdate_from: Option<DateTime<Utc>>,
    pub apmdate_to: Option<DateTime<Utc>>,
    pub is_on_hold: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RoundsQuery {
    pub round_date: NaiveDate,
    pub warehouse_code: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignAllQuery {
    pub crdate: NaiveDate,
    pub shippoint: String,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ShipmentActionBody {
    pub shipid: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub shipid: String,
    pub carlicense: String,
    pub carnote: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub shipid: String,
    pub rejection_reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualAssignBody {
    pub shipid: String,
    pub vencode: String,
}

#[derive(Debug, Deserialize)]
pub struct HoldBody {
    pub hold: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoundBody {
    pub round_name: String,
    pub round_date: NaiveDate,
    /// `"HH:MM"`, as the dispatcher UI sends it.
    pub round_time: String,
    pub warehouse_code: String,
    pub total_volume_cbm: Option<f64>,
    #[serde(default)]
    pub shipment_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveDayBody {
    pub round_date: NaiveDate,
    pub warehouse_code: String,
    pub round_times: Vec<String>,
}

/// Parse a `"HH:MM"` (or `"HH:MM:SS"`) clock string.
pub fn parse_round_time(s: &str) -> Result<NaiveTime, ApiError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ApiError::invalid(format!("malformed round time '{s}', expected HH:MM")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_time_accepts_hh_mm() {
        assert_eq!(
            parse_round_time("08:30").unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
        assert_eq!(
            parse_round_time("23:59:59").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap()
        );
    }

    #[test]
    fn round_time_rejects_garbage() {
        for bad in ["", "8am", "25:00", "12:60", "noon"] {
            assert!(parse_round_time(bad).is_err(), "'{bad}' should be rejected");
        }
    }
}
