//! Entity constructors with scenario-friendly defaults.
//!
//! The defaults line up so a shipment built by [`shipment`] can run the full
//! booking cycle against vendors from [`vendor`] and cars from [`car`]
//! without further setup: warehouse `WH7`, route `R01` (2-day lead time),
//! cartype `10`, appointment 2025-01-10 08:00 UTC.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use fdk_schemas::{
    Car, CarStatus, DocStat, Grade, LeadTime, MasterRound, Role, Shipment, User, Vendor,
    Warehouse,
};

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn vendor(vencode: &str, grade: Grade) -> Vendor {
    Vendor {
        vencode: vencode.into(),
        venname: format!("Vendor {vencode}"),
        grade,
        last_assigned_at: None,
        active: true,
    }
}

pub fn car(carlicense: &str, owner: &str, cartype: &str) -> Car {
    Car {
        carlicense: carlicense.into(),
        vencode: owner.into(),
        cartype: cartype.into(),
        status: CarStatus::Active,
        will_be_available_at: None,
    }
}

pub fn warehouse(code: &str) -> Warehouse {
    Warehouse {
        code: code.into(),
        name: format!("Warehouse {code}"),
        active: true,
    }
}

pub fn lead_time(route: &str, days: i64) -> LeadTime {
    LeadTime {
        route: route.into(),
        routedes: None,
        leadtime_days: days,
    }
}

pub fn master_round(id: i64, h: u32, m: u32) -> MasterRound {
    MasterRound {
        id,
        round_time: time(h, m),
        round_name: Some(format!("Round {id}")),
        active: true,
    }
}

pub fn shipment(shipid: &str) -> Shipment {
    Shipment {
        shipid: shipid.into(),
        customer_name: None,
        shippoint: "WH7".into(),
        route: Some("R01".into()),
        cartype: "10".into(),
        volume_cbm: None,
        apmdate: utc(2025, 1, 10, 8, 0),
        crdate: utc(2025, 1, 9, 0, 0),
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
        rejected_by_vencodes: Vec::new(),
    }
}

/// Vendor account with a push token of the form `tok-<vencode>`.
pub fn vendor_user(id: i64, vencode: &str) -> User {
    User {
        id,
        username: format!("user-{vencode}"),
        role: Role::Vendor,
        display_name: None,
        active: true,
        vencode_ref: Some(vencode.into()),
        fcm_token: Some(format!("tok-{vencode}")),
    }
}

/// Dispatcher account with a push token of the form `tok-<username>`.
pub fn dispatcher_user(id: i64, username: &str) -> User {
    User {
        id,
        username: username.into(),
        role: Role::Dispatcher,
        display_name: None,
        active: true,
        vencode_ref: None,
        fcm_token: Some(format!("tok-{username}")),
    }
}
