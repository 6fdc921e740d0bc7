//! Truck availability bookkeeping (pure, no IO).
//!
//! Both store implementations route every reservation decision through
//! [`try_reserve`] and every lead-time computation through
//! [`available_date`], so the availability rules exist in exactly one place.
//!
//! Reservation is a two-step protocol:
//!
//! 1. At vendor confirmation the car is only *validated* (`try_reserve`);
//!    nothing on the car row changes yet.
//! 2. At dispatcher round confirmation the store *commits*: the car goes
//!    `inactive` and `will_be_available_at` is set to
//!    `apmdate.date + (leadtime_days − 1)`. Committing the same
//!    `(shipment, car)` pair again writes identical values, so re-running a
//!    confirmation is harmless.
//!
//! Cancellation does not release the car; the blocked date simply ages out.

use chrono::{DateTime, Days, NaiveDate, Utc};

use fdk_schemas::{Car, CarStatus};

// ---------------------------------------------------------------------------
// ReserveError
// ---------------------------------------------------------------------------

/// Why a car cannot be reserved for a shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveError {
    /// No car with that license exists.
    NotFound { carlicense: String },
    /// The car belongs to a different vendor than the confirming one.
    WrongOwner { carlicense: String, owner: String },
    /// The car is inactive or still blocked past the required date.
    Busy { carlicense: String },
}

impl std::fmt::Display for ReserveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReserveError::NotFound { carlicense } => {
                write!(f, "car {} not found", carlicense)
            }
            ReserveError::WrongOwner { carlicense, owner } => {
                write!(f, "car {} is owned by vendor {}", carlicense, owner)
            }
            ReserveError::Busy { carlicense } => {
                write!(f, "car {} is not available", carlicense)
            }
        }
    }
}

impl std::error::Error for ReserveError {}

// ---------------------------------------------------------------------------
// Availability rules
// ---------------------------------------------------------------------------

/// A car is usable on `required_date` when it is active and either has no
/// blocked-until date or that date is on or before the required date.
pub fn is_usable(car: &Car, required_date: NaiveDate) -> bool {
    car.status == CarStatus::Active
        && car
            .will_be_available_at
            .map(|d| d <= required_date)
            .unwrap_or(true)
}

/// Validate that `car` can be reserved by `owner_vencode` for
/// `required_date`. Pass `None` when the lookup for `carlicense` found
/// nothing.
pub fn try_reserve(
    car: Option<&Car>,
    carlicense: &str,
    owner_vencode: &str,
    required_date: NaiveDate,
) -> Result<(), ReserveError> {
    let car = match car {
        Some(c) => c,
        None => {
            return Err(ReserveError::NotFound {
                carlicense: carlicense.to_string(),
            })
        }
    };
    if car.vencode != owner_vencode {
        return Err(ReserveError::WrongOwner {
            carlicense: car.carlicense.clone(),
            owner: car.vencode.clone(),
        });
    }
    if !is_usable(car, required_date) {
        return Err(ReserveError::Busy {
            carlicense: car.carlicense.clone(),
        });
    }
    Ok(())
}

/// The date a truck becomes free again: appointment date plus
/// `leadtime_days − 1` (a one-day route blocks the truck for the
/// appointment day only).
pub fn available_date(apmdate: DateTime<Utc>, leadtime_days: i64) -> NaiveDate {
    let blocked = leadtime_days.saturating_sub(1).max(0) as u64;
    apmdate
        .date_naive()
        .checked_add_days(Days::new(blocked))
        .unwrap_or_else(|| apmdate.date_naive())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn car(license: &str, owner: &str) -> Car {
        Car {
            carlicense: license.into(),
            vencode: owner.into(),
            cartype: "10".into(),
            status: CarStatus::Active,
            will_be_available_at: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn two_day_route_blocks_until_next_day() {
        let apm = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
        assert_eq!(available_date(apm, 2), date(2025, 1, 11));
    }

    #[test]
    fn one_day_route_frees_the_truck_same_day() {
        let apm = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
        assert_eq!(available_date(apm, 1), date(2025, 1, 10));
    }

    #[test]
    fn long_route_date_math() {
        let apm = Utc.with_ymd_and_hms(2025, 1, 30, 8, 0, 0).unwrap();
        assert_eq!(available_date(apm, 5), date(2025, 2, 3));
    }

    #[test]
    fn fresh_car_is_reservable() {
        let c = car("XX-111", "V_A_1");
        assert!(try_reserve(Some(&c), "XX-111", "V_A_1", date(2025, 1, 10)).is_ok());
    }

    #[test]
    fn missing_car_is_not_found() {
        assert!(matches!(
            try_reserve(None, "XX-404", "V_A_1", date(2025, 1, 10)),
            Err(ReserveError::NotFound { .. })
        ));
    }

    #[test]
    fn foreign_car_is_wrong_owner() {
        let c = car("XX-111", "V_A_1");
        let err = try_reserve(Some(&c), "XX-111", "V_B_1", date(2025, 1, 10)).unwrap_err();
        assert_eq!(
            err,
            ReserveError::WrongOwner {
                carlicense: "XX-111".into(),
                owner: "V_A_1".into(),
            }
        );
    }

    #[test]
    fn inactive_car_is_busy() {
        let mut c = car("XX-111", "V_A_1");
        c.status = CarStatus::Inactive;
        assert!(matches!(
            try_reserve(Some(&c), "XX-111", "V_A_1", date(2025, 1, 10)),
            Err(ReserveError::Busy { .. })
        ));
    }

    #[test]
    fn blocked_date_boundary_is_inclusive() {
        let mut c = car("XX-111", "V_A_1");
        c.will_be_available_at = Some(date(2025, 1, 10));
        // Free exactly on the required date: usable.
        assert!(try_reserve(Some(&c), "XX-111", "V_A_1", date(2025, 1, 10)).is_ok());
        // Free one day after the required date: busy.
        c.will_be_available_at = Some(date(2025, 1, 11));
        assert!(matches!(
            try_reserve(Some(&c), "XX-111", "V_A_1", date(2025, 1, 10)),
            Err(ReserveError::Busy { .. })
        ));
    }
}
