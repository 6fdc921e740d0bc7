//! End-to-end booking cycle against the in-memory store: request-booking,
//! vendor confirmation with a specific truck, dispatcher round
//! confirmation, and cancellation windows.

use std::sync::Arc;

use fdk_db::{DispatchStore, NewRound};
use fdk_dispatch::{DispatchError, DispatchService, RoundService};
use fdk_notify::Notifier;
use fdk_schemas::{CarStatus, DocStat, Grade};
use fdk_testkit::{fixtures as fx, CapturingNotifier, MemStore};

struct Harness {
    store: Arc<MemStore>,
    notifier: Arc<CapturingNotifier>,
    dispatch: DispatchService<MemStore>,
    rounds: RoundService<MemStore>,
}

fn harness() -> Harness {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    let sink: Arc<dyn Notifier> = Arc::clone(&notifier) as Arc<dyn Notifier>;
    Harness {
        dispatch: DispatchService::new(Arc::clone(&store), Arc::clone(&sink)),
        rounds: RoundService::new(Arc::clone(&store), sink),
        store,
        notifier,
    }
}

/// Warehouse, 2-day route, one grade-A vendor with one matching truck, one
/// dispatcher.
async fn seed_basics(h: &Harness) {
    h.store.seed_warehouse(fx::warehouse("WH7")).await;
    h.store.seed_lead_time(fx::lead_time("R01", 2)).await;
    h.store.seed_vendor(fx::vendor("V_A_1", Grade::A)).await;
    h.store.seed_car(fx::car("XX-111", "V_A_1", "10")).await;
    h.store.seed_user(fx::vendor_user(1, "V_A_1")).await;
    h.store.seed_user(fx::dispatcher_user(2, "disp1")).await;
}

fn new_round() -> NewRound {
    NewRound {
        round_name: "Morning round".into(),
        round_date: fx::date(2025, 1, 10),
        round_time: fx::time(8, 0),
        warehouse_code: "WH7".into(),
        total_volume_cbm: None,
        created_by: "disp1".into(),
    }
}

#[tokio::test]
async fn request_confirm_and_round_confirmation() {
    let h = harness();
    seed_basics(&h).await;
    h.store.seed_shipment(fx::shipment("SH001")).await;

    let t0 = fx::utc(2025, 1, 9, 8, 0);
    let round = h
        .rounds
        .create_round(new_round(), &["SH001".to_string()], t0)
        .await
        .unwrap();

    // Dispatcher re-offers straight to grade A.
    let s = h
        .dispatch
        .request_booking("SH001", "disp1", fx::utc(2025, 1, 9, 9, 0))
        .await
        .unwrap();
    assert_eq!(s.docstat, DocStat::WaitingVendor);
    assert_eq!(s.current_grade_to_assign, Some(Grade::A));
    assert_eq!(s.booking_round_id, Some(round.round.id));
    // Grade-A vendors were invited.
    assert_eq!(h.notifier.tokens_for("New booking request"), vec!["tok-V_A_1"]);

    // Vendor claims it with a specific truck.
    let s = h
        .dispatch
        .vendor_confirm("V_A_1", "SH001", "XX-111", None, fx::utc(2025, 1, 9, 9, 10))
        .await
        .unwrap();
    assert_eq!(s.docstat, DocStat::VendorConfirmed);
    assert_eq!(s.vencode.as_deref(), Some("V_A_1"));
    assert_eq!(s.carlicense.as_deref(), Some("XX-111"));
    assert_eq!(s.confirmed_by_grade, Some(Grade::A));
    assert_eq!(h.notifier.tokens_for("Shipment confirmed"), vec!["tok-disp1"]);

    // The truck is only validated at this point, not yet blocked.
    let car = h.store.get_car("XX-111").await.unwrap().unwrap();
    assert_eq!(car.status, CarStatus::Active);
    assert!(car.will_be_available_at.is_none());

    // Dispatcher finalizes the round: 03 → 04 and the truck is committed
    // for the 2-day lead time (blocked through the day after the
    // appointment).
    let confirmed = h
        .rounds
        .confirm_round(round.round.id, "disp1", fx::utc(2025, 1, 9, 10, 0))
        .await
        .unwrap();
    let s = &confirmed.shipments[0];
    assert_eq!(s.docstat, DocStat::DispatcherAssigned);

    let car = h.store.get_car("XX-111").await.unwrap().unwrap();
    assert_eq!(car.status, CarStatus::Inactive);
    assert_eq!(car.will_be_available_at, Some(fx::date(2025, 1, 11)));
    assert_eq!(
        h.notifier.tokens_for("Shipment assignment finalized"),
        vec!["tok-V_A_1"]
    );
}

#[tokio::test]
async fn round_confirmation_is_idempotent_per_car() {
    let h = harness();
    seed_basics(&h).await;
    h.store.seed_shipment(fx::shipment("SH001")).await;

    let t0 = fx::utc(2025, 1, 9, 8, 0);
    let round = h
        .rounds
        .create_round(new_round(), &["SH001".to_string()], t0)
        .await
        .unwrap();
    h.dispatch
        .request_booking("SH001", "disp1", t0)
        .await
        .unwrap();
    h.dispatch
        .vendor_confirm("V_A_1", "SH001", "XX-111", None, t0)
        .await
        .unwrap();

    h.rounds.confirm_round(round.round.id, "disp1", t0).await.unwrap();
    let first = h.store.get_car("XX-111").await.unwrap().unwrap();

    // Re-confirming finds no shipment left in `03` and rewrites nothing.
    h.rounds.confirm_round(round.round.id, "disp1", t0).await.unwrap();
    let second = h.store.get_car("XX-111").await.unwrap().unwrap();
    assert_eq!(first.status, second.status);
    assert_eq!(first.will_be_available_at, second.will_be_available_at);
}

#[tokio::test]
async fn confirm_refuses_foreign_busy_and_missing_cars() {
    let h = harness();
    seed_basics(&h).await;
    h.store.seed_vendor(fx::vendor("V_B_1", Grade::B)).await;
    h.store.seed_car(fx::car("YY-222", "V_B_1", "10")).await;

    let mut s = fx::shipment("SH001");
    s.docstat = DocStat::WaitingVendor;
    s.current_grade_to_assign = Some(Grade::A);
    s.assigned_at = Some(fx::utc(2025, 1, 9, 8, 0));
    h.store.seed_shipment(s).await;

    let now = fx::utc(2025, 1, 9, 9, 0);

    // Another vendor's truck.
    let err = h
        .dispatch
        .vendor_confirm("V_A_1", "SH001", "YY-222", None, now)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    // Unknown truck.
    let err = h
        .dispatch
        .vendor_confirm("V_A_1", "SH001", "XX-404", None, now)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    // Truck still blocked past the appointment date.
    h.store
        .seed_car({
            let mut c = fx::car("XX-111", "V_A_1", "10");
            c.will_be_available_at = Some(fx::date(2025, 1, 11));
            c
        })
        .await;
    let err = h
        .dispatch
        .vendor_confirm("V_A_1", "SH001", "XX-111", None, now)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    // The shipment never left its offered state.
    let s = h.store.get_shipment("SH001").await.unwrap().unwrap();
    assert_eq!(s.docstat, DocStat::WaitingVendor);
}

#[tokio::test]
async fn cancel_only_before_appointment_and_keeps_car_blocked() {
    let h = harness();
    seed_basics(&h).await;

    let mut s = fx::shipment("SH001");
    s.docstat = DocStat::VendorConfirmed;
    s.vencode = Some("V_A_1".into());
    s.carlicense = Some("XX-111".into());
    s.confirmed_by_grade = Some(Grade::A);
    h.store.seed_shipment(s).await;
    // Simulate an earlier committed reservation.
    h.store
        .seed_car({
            let mut c = fx::car("XX-111", "V_A_1", "10");
            c.status = CarStatus::Inactive;
            c.will_be_available_at = Some(fx::date(2025, 1, 11));
            c
        })
        .await;

    // After the appointment: refused.
    let err = h
        .dispatch
        .cancel("SH001", "disp1", fx::utc(2025, 1, 10, 8, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::StateConflict(_)));

    // Before the appointment: canceled and the vendor is told.
    let s = h
        .dispatch
        .cancel("SH001", "disp1", fx::utc(2025, 1, 9, 12, 0))
        .await
        .unwrap();
    assert_eq!(s.docstat, DocStat::Canceled);
    assert!(s.vencode.is_none());
    assert!(s.carlicense.is_none());
    assert_eq!(h.notifier.tokens_for("Shipment canceled"), vec!["tok-V_A_1"]);

    // The truck stays blocked; cancellation does not release it.
    let car = h.store.get_car("XX-111").await.unwrap().unwrap();
    assert_eq!(car.status, CarStatus::Inactive);
    assert_eq!(car.will_be_available_at, Some(fx::date(2025, 1, 11)));
}

#[tokio::test]
async fn manual_assign_offers_to_chosen_vendor() {
    let h = harness();
    seed_basics(&h).await;
    h.store.seed_vendor(fx::vendor("V_C_1", Grade::C)).await;
    h.store.seed_user(fx::vendor_user(3, "V_C_1")).await;

    let mut s = fx::shipment("SH001");
    s.docstat = DocStat::RejectedAll;
    h.store.seed_shipment(s).await;

    let s = h
        .dispatch
        .manual_assign("SH001", "V_C_1", "disp1", fx::utc(2025, 1, 9, 9, 0))
        .await
        .unwrap();
    assert_eq!(s.docstat, DocStat::WaitingVendor);
    assert_eq!(s.current_grade_to_assign, Some(Grade::C));
    assert_eq!(s.vencode.as_deref(), Some("V_C_1"));
    assert_eq!(
        h.notifier.tokens_for("Shipment assigned to you"),
        vec!["tok-V_C_1"]
    );
}

#[tokio::test]
async fn hold_toggle_round_trips_and_is_idempotent() {
    let h = harness();
    seed_basics(&h).await;
    h.store.seed_shipment(fx::shipment("SH001")).await;

    let now = fx::utc(2025, 1, 9, 9, 0);

    let held = h.dispatch.set_hold("SH001", true, "disp1", now).await.unwrap();
    assert_eq!(held.docstat, DocStat::OnHold);
    assert!(held.is_on_hold);
    assert_eq!(held.docstat_before_hold, Some(DocStat::WaitingRound));

    // Same request again: no-op, state unchanged.
    let again = h.dispatch.set_hold("SH001", true, "disp1", now).await.unwrap();
    assert_eq!(again.docstat, DocStat::OnHold);
    assert_eq!(again.docstat_before_hold, Some(DocStat::WaitingRound));

    let back = h.dispatch.set_hold("SH001", false, "disp1", now).await.unwrap();
    assert_eq!(back.docstat, DocStat::WaitingRound);
    assert!(!back.is_on_hold);
    assert!(back.docstat_before_hold.is_none());

    let back_again = h.dispatch.set_hold("SH001", false, "disp1", now).await.unwrap();
    assert_eq!(back_again.docstat, DocStat::WaitingRound);
}

#[tokio::test]
async fn held_shipments_cannot_be_request_booked() {
    let h = harness();
    seed_basics(&h).await;
    h.store.seed_shipment(fx::shipment("SH001")).await;

    let now = fx::utc(2025, 1, 9, 9, 0);
    h.dispatch.set_hold("SH001", true, "disp1", now).await.unwrap();

    let err = h
        .dispatch
        .request_booking("SH001", "disp1", now)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "state_conflict");
}
