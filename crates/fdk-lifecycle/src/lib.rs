//! Shipment lifecycle state machine.
//!
//! # Design
//!
//! One pure function, [`apply`], owns every `docstat` transition in the
//! system. Handlers, the allocator and the timeout worker only decide which
//! [`Event`] to dispatch; they never mutate lifecycle fields themselves.
//! Store implementations re-run `apply` under the row lock, so a transition
//! that lost a race fails here with [`TransitionError`] instead of silently
//! overwriting fresher state.
//!
//! # State diagram (main line)
//!
//! ```text
//!              RequestBooking / round entry           VendorConfirm
//!   01 ──────────────────────────────────────► 02 ─────────────────► 03
//!   ▲                                           │                     │
//!   │ (round entry also clears the              │ VendorReject        │ DispatcherConfirm
//!   │  rejected set — new booking cycle)        │ Timeout02           ▼
//!   │                                           ▼                    04 (terminal)
//!   └── Cancel ◄── 03 | 04                     BC ── VendorConfirm ──► 03
//!       (→ 06, terminal)                        │
//!                                               │ TimeoutBroadcast
//!                                               ▼
//!                                              HD  (parked for dispatcher attention)
//! ```
//!
//! `Hold`/`Unhold` swap any unrounded shipment in and out of `HD`,
//! preserving the prior state in `docstat_before_hold`. A shipment parked by
//! the allocator or the broadcast timeout is also `HD` but with
//! `is_on_hold = false` and no saved prior state.

use chrono::{DateTime, Utc};

use fdk_schemas::{DocStat, Grade, Shipment};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Events that drive shipment lifecycle transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Dispatcher re-offers an unrounded shipment straight to grade A.
    RequestBooking { dispatcher: String },
    /// The round allocator offers the shipment to a specific vendor/grade.
    AllocatorAssign { vencode: String, grade: Grade },
    /// The round allocator found no eligible vendor (or all grades at
    /// quota) and parks the shipment for dispatcher attention.
    AllocatorPark,
    /// A vendor claims the shipment with a specific truck.
    VendorConfirm {
        vencode: String,
        grade: Grade,
        carlicense: String,
        carnote: Option<String>,
    },
    /// The offered vendor declines; the shipment opens to everyone else.
    VendorReject { vencode: String, grade: Grade },
    /// The offered grade did not answer within the response timeout.
    Timeout02 { blamed_vencode: String },
    /// The open broadcast expired unclaimed.
    TimeoutBroadcast,
    /// Dispatcher parks an unrounded shipment.
    Hold { dispatcher: String },
    /// Dispatcher releases a held shipment back to its prior state.
    Unhold { dispatcher: String },
    /// Dispatcher finalizes a vendor-confirmed shipment.
    DispatcherConfirm { dispatcher: String },
    /// Dispatcher cancels a confirmed/assigned shipment before the
    /// appointment.
    Cancel { dispatcher: String },
    /// Dispatcher hands the shipment to a specific vendor directly.
    ManualAssign {
        vencode: String,
        grade: Grade,
        dispatcher: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RequestBooking { .. } => "request_booking",
            Event::AllocatorAssign { .. } => "allocator_assign",
            Event::AllocatorPark => "allocator_park",
            Event::VendorConfirm { .. } => "vendor_confirm",
            Event::VendorReject { .. } => "vendor_reject",
            Event::Timeout02 { .. } => "timeout_waiting_vendor",
            Event::TimeoutBroadcast => "timeout_broadcast",
            Event::Hold { .. } => "hold",
            Event::Unhold { .. } => "unhold",
            Event::DispatcherConfirm { .. } => "dispatcher_confirm",
            Event::Cancel { .. } => "cancel",
            Event::ManualAssign { .. } => "manual_assign",
        }
    }

    /// The principal recorded in `chuser` for this event.
    fn actor(&self) -> &str {
        match self {
            Event::RequestBooking { dispatcher }
            | Event::Hold { dispatcher }
            | Event::Unhold { dispatcher }
            | Event::DispatcherConfirm { dispatcher }
            | Event::Cancel { dispatcher }
            | Event::ManualAssign { dispatcher, .. } => dispatcher,
            Event::VendorConfirm { vencode, .. } | Event::VendorReject { vencode, .. } => vencode,
            Event::AllocatorAssign { .. } | Event::AllocatorPark => "allocator",
            Event::Timeout02 { .. } | Event::TimeoutBroadcast => "timeout-worker",
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event cannot legally be applied to the shipment's
/// current state. Callers surface this as a state conflict; it is the
/// expected outcome of losing a confirm race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The `(docstat, event)` pair is not a legal transition.
    Illegal { from: DocStat, event: &'static str },
    /// A grade-scoped event arrived from the wrong grade.
    GradeMismatch {
        expected: Option<Grade>,
        got: Grade,
    },
    /// A vendor that already rejected the shipment tried to claim the
    /// broadcast.
    AlreadyRejected { vencode: String },
    /// The shipment is on hold and the event requires it not to be.
    OnHold,
    /// Unhold on a shipment that is not held.
    NotOnHold,
    /// Hold on a shipment that is already assigned to a booking round.
    InRound,
    /// Cancel after the appointment time has passed.
    AppointmentPassed,
    /// `is_on_hold` without a saved prior state; data corruption guard.
    MissingHoldState,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::Illegal { from, event } => {
                write!(f, "illegal transition: {} + {}", from.as_str(), event)
            }
            TransitionError::GradeMismatch { expected, got } => match expected {
                Some(g) => write!(f, "shipment is offered to grade {}, not {}", g, got),
                None => write!(f, "shipment has no offered grade (got {})", got),
            },
            TransitionError::AlreadyRejected { vencode } => {
                write!(f, "vendor {} already rejected this shipment", vencode)
            }
            TransitionError::OnHold => write!(f, "shipment is on hold"),
            TransitionError::NotOnHold => write!(f, "shipment is not on hold"),
            TransitionError::InRound => {
                write!(f, "shipment is already assigned to a booking round")
            }
            TransitionError::AppointmentPassed => {
                write!(f, "appointment time has already passed")
            }
            TransitionError::MissingHoldState => {
                write!(f, "held shipment has no saved prior state")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

fn illegal(s: &Shipment, event: &Event) -> TransitionError {
    TransitionError::Illegal {
        from: s.docstat,
        event: event.name(),
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Apply `event` to `shipment` at time `now`, returning the next shipment
/// value. The input is never mutated; on error the caller's row is
/// untouched.
pub fn apply(
    shipment: &Shipment,
    event: &Event,
    now: DateTime<Utc>,
) -> Result<Shipment, TransitionError> {
    use DocStat::*;

    let mut next = shipment.clone();

    match event {
        Event::RequestBooking { .. } => {
            if shipment.is_on_hold {
                return Err(TransitionError::OnHold);
            }
            if !matches!(shipment.docstat, WaitingRound | Canceled | RejectedAll) {
                return Err(illegal(shipment, event));
            }
            next.docstat = WaitingVendor;
            next.current_grade_to_assign = Some(Grade::A);
            next.assigned_at = Some(now);
            next.vencode = None;
            next.carlicense = None;
            next.carnote = None;
            next.confirmed_by_grade = None;
            // New booking cycle: prior rejections no longer apply.
            next.rejected_by_vencodes.clear();
        }

        Event::AllocatorAssign { vencode, grade } => {
            if shipment.is_on_hold {
                return Err(TransitionError::OnHold);
            }
            if shipment.docstat != WaitingRound || shipment.booking_round_id.is_none() {
                return Err(illegal(shipment, event));
            }
            next.docstat = WaitingVendor;
            next.vencode = Some(vencode.clone());
            next.current_grade_to_assign = Some(*grade);
            next.assigned_at = Some(now);
        }

        Event::AllocatorPark => {
            if shipment.is_on_hold {
                return Err(TransitionError::OnHold);
            }
            if shipment.docstat != WaitingRound || shipment.booking_round_id.is_none() {
                return Err(illegal(shipment, event));
            }
            next.docstat = OnHold;
            next.current_grade_to_assign = None;
            next.assigned_at = None;
            next.vencode = None;
        }

        Event::VendorConfirm {
            vencode,
            grade,
            carlicense,
            carnote,
        } => {
            match shipment.docstat {
                WaitingVendor => {
                    if shipment.current_grade_to_assign != Some(*grade) {
                        return Err(TransitionError::GradeMismatch {
                            expected: shipment.current_grade_to_assign,
                            got: *grade,
                        });
                    }
                }
                Broadcast => {
                    if shipment.rejected_contains(vencode) {
                        return Err(TransitionError::AlreadyRejected {
                            vencode: vencode.clone(),
                        });
                    }
                }
                _ => return Err(illegal(shipment, event)),
            }
            next.docstat = VendorConfirmed;
            next.vencode = Some(vencode.clone());
            next.carlicense = Some(carlicense.clone());
            next.carnote = carnote.clone();
            next.confirmed_by_grade = Some(*grade);
            next.current_grade_to_assign = None;
            next.assigned_at = None;
        }

        Event::VendorReject { vencode, grade } => {
            if shipment.docstat != WaitingVendor {
                return Err(illegal(shipment, event));
            }
            if shipment.current_grade_to_assign != Some(*grade) {
                return Err(TransitionError::GradeMismatch {
                    expected: shipment.current_grade_to_assign,
                    got: *grade,
                });
            }
            if !next.rejected_contains(vencode) {
                next.rejected_by_vencodes.push(vencode.clone());
            }
            next.docstat = Broadcast;
            next.current_grade_to_assign = None;
            next.assigned_at = Some(now);
            // An open offer has no owning vendor.
            next.vencode = None;
        }

        Event::Timeout02 { blamed_vencode } => {
            if shipment.docstat != WaitingVendor {
                return Err(illegal(shipment, event));
            }
            if !next.rejected_contains(blamed_vencode) {
                next.rejected_by_vencodes.push(blamed_vencode.clone());
            }
            next.docstat = Broadcast;
            next.current_grade_to_assign = None;
            next.assigned_at = Some(now);
            next.vencode = None;
        }

        Event::TimeoutBroadcast => {
            if shipment.docstat != Broadcast {
                return Err(illegal(shipment, event));
            }
            next.docstat = OnHold;
            next.assigned_at = None;
        }

        Event::Hold { .. } => {
            if shipment.is_on_hold {
                return Err(TransitionError::OnHold);
            }
            if shipment.booking_round_id.is_some() {
                return Err(TransitionError::InRound);
            }
            next.docstat_before_hold = Some(shipment.docstat);
            next.docstat = OnHold;
            next.is_on_hold = true;
        }

        Event::Unhold { .. } => {
            if !shipment.is_on_hold {
                return Err(TransitionError::NotOnHold);
            }
            let prior = shipment
                .docstat_before_hold
                .ok_or(TransitionError::MissingHoldState)?;
            next.docstat = prior;
            next.docstat_before_hold = None;
            next.is_on_hold = false;
        }

        Event::DispatcherConfirm { .. } => {
            if shipment.docstat != VendorConfirmed {
                return Err(illegal(shipment, event));
            }
            next.docstat = DispatcherAssigned;
        }

        Event::Cancel { .. } => {
            if !matches!(shipment.docstat, VendorConfirmed | DispatcherAssigned) {
                return Err(illegal(shipment, event));
            }
            if now >= shipment.apmdate {
                return Err(TransitionError::AppointmentPassed);
            }
            next.docstat = Canceled;
            next.vencode = None;
            next.carlicense = None;
            next.carnote = None;
            next.confirmed_by_grade = None;
            next.rejected_by_vencodes.clear();
        }

        Event::ManualAssign { vencode, grade, .. } => {
            if !matches!(shipment.docstat, RejectedAll | WaitingRound) {
                return Err(illegal(shipment, event));
            }
            next.docstat = WaitingVendor;
            next.vencode = Some(vencode.clone());
            next.current_grade_to_assign = Some(*grade);
            next.assigned_at = Some(now);
        }
    }

    next.chuser = Some(event.actor().to_string());
    next.chdate = Some(now);

    Ok(next)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
