//! Round lifecycle against the in-memory store: creation with selective
//! shipment pull-in, the documented global un-hold side effect, day
//! synchronization, assign-all, and quota allocation.

use std::sync::Arc;

use fdk_db::{DispatchStore, NewRound};
use fdk_dispatch::{DispatchService, RoundService};
use fdk_notify::Notifier;
use fdk_schemas::{DocStat, Grade, QuotaShares, RoundStatus};
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

fn new_round(name: &str) -> NewRound {
    NewRound {
        round_name: name.into(),
        round_date: fx::date(2025, 1, 10),
        round_time: fx::time(8, 0),
        warehouse_code: "WH7".into(),
        total_volume_cbm: None,
        created_by: "disp1".into(),
    }
}

/// The S4 vendor pool: three grade-A vendors with two trucks each, one
/// vendor per remaining grade.
async fn seed_full_pool(h: &Harness) {
    h.store.seed_warehouse(fx::warehouse("WH7")).await;
    h.store.seed_lead_time(fx::lead_time("R01", 2)).await;
    for (i, vencode) in ["V_A_1", "V_A_2", "V_A_3"].iter().enumerate() {
        h.store.seed_vendor(fx::vendor(vencode, Grade::A)).await;
        h.store
            .seed_car(fx::car(&format!("AA-{}1", i), vencode, "10"))
            .await;
        h.store
            .seed_car(fx::car(&format!("AA-{}2", i), vencode, "10"))
            .await;
        h.store.seed_user(fx::vendor_user(i as i64 + 1, vencode)).await;
    }
    for (i, (vencode, grade)) in [("V_B_1", Grade::B), ("V_C_1", Grade::C), ("V_D_1", Grade::D)]
        .iter()
        .enumerate()
    {
        h.store.seed_vendor(fx::vendor(vencode, *grade)).await;
        h.store
            .seed_car(fx::car(&format!("ZZ-{}1", i), vencode, "10"))
            .await;
        h.store.seed_user(fx::vendor_user(i as i64 + 10, vencode)).await;
    }
    h.store.seed_user(fx::dispatcher_user(99, "disp1")).await;
}

#[tokio::test]
async fn create_round_pulls_in_only_free_shipments() {
    let h = harness();
    seed_full_pool(&h).await;

    h.store.seed_shipment(fx::shipment("SH001")).await;
    // Already in another round.
    let other = h
        .rounds
        .create_round(new_round("Earlier"), &["SH001".to_string()], fx::utc(2025, 1, 9, 7, 0))
        .await
        .unwrap();
    assert_eq!(other.shipments.len(), 1);

    // Held.
    h.store.seed_shipment(fx::shipment("SH002")).await;
    h.dispatch
        .set_hold("SH002", true, "disp1", fx::utc(2025, 1, 9, 7, 30))
        .await
        .unwrap();

    // Free.
    h.store.seed_shipment(fx::shipment("SH003")).await;

    let round = h
        .rounds
        .create_round(
            new_round("Morning"),
            &["SH001".to_string(), "SH002".to_string(), "SH003".to_string()],
            fx::utc(2025, 1, 9, 8, 0),
        )
        .await
        .unwrap();

    // Only the free shipment joined; the round member kept its old round.
    let ids: Vec<&str> = round.shipments.iter().map(|s| s.shipid.as_str()).collect();
    assert_eq!(ids, vec!["SH003"]);
    assert_eq!(round.shipments[0].docstat, DocStat::WaitingRound);

    let sh001 = h.store.get_shipment("SH001").await.unwrap().unwrap();
    assert_eq!(sh001.booking_round_id, Some(other.round.id));
}

#[tokio::test]
async fn create_round_unholds_globally() {
    // Documented source behavior: creating a round releases every held
    // shipment, even in other warehouses.
    let h = harness();
    seed_full_pool(&h).await;
    h.store.seed_warehouse(fx::warehouse("SW")).await;

    let mut far_away = fx::shipment("SH900");
    far_away.shippoint = "SW".into();
    h.store.seed_shipment(far_away).await;
    h.dispatch
        .set_hold("SH900", true, "disp1", fx::utc(2025, 1, 9, 7, 0))
        .await
        .unwrap();

    h.rounds
        .create_round(new_round("Morning"), &[], fx::utc(2025, 1, 9, 8, 0))
        .await
        .unwrap();

    let s = h.store.get_shipment("SH900").await.unwrap().unwrap();
    assert!(!s.is_on_hold, "hold released by unrelated round creation");
    assert_eq!(s.docstat, DocStat::WaitingRound);
}

#[tokio::test]
async fn assign_all_ready_moves_matching_shipments() {
    let h = harness();
    seed_full_pool(&h).await;

    let round = h
        .rounds
        .create_round(new_round("Morning"), &[], fx::utc(2025, 1, 9, 8, 0))
        .await
        .unwrap();

    // Two ready shipments created on the 9th at WH7, one elsewhere, one on
    // another day.
    h.store.seed_shipment(fx::shipment("SH010")).await;
    h.store.seed_shipment(fx::shipment("SH011")).await;
    h.store.seed_warehouse(fx::warehouse("SW")).await;
    let mut elsewhere = fx::shipment("SH012");
    elsewhere.shippoint = "SW".into();
    h.store.seed_shipment(elsewhere).await;
    let mut other_day = fx::shipment("SH013");
    other_day.crdate = fx::utc(2025, 1, 8, 0, 0);
    h.store.seed_shipment(other_day).await;

    let updated = h
        .rounds
        .assign_all_ready(round.round.id, fx::date(2025, 1, 9), "WH7", fx::utc(2025, 1, 9, 8, 30))
        .await
        .unwrap();

    let ids: Vec<&str> = updated.shipments.iter().map(|s| s.shipid.as_str()).collect();
    assert_eq!(ids, vec!["SH010", "SH011"]);
    assert!(updated
        .shipments
        .iter()
        .all(|s| s.docstat == DocStat::WaitingRound));
}

#[tokio::test]
async fn save_day_replaces_rounds_and_detaches_shipments() {
    let h = harness();
    seed_full_pool(&h).await;

    h.store.seed_shipment(fx::shipment("SH001")).await;
    let old = h
        .rounds
        .create_round(new_round("Old"), &["SH001".to_string()], fx::utc(2025, 1, 9, 7, 0))
        .await
        .unwrap();

    let times = vec![fx::time(8, 0), fx::time(13, 30)];
    let created = h
        .rounds
        .save_day(
            fx::date(2025, 1, 10),
            "WH7",
            &times,
            "disp1",
            fx::utc(2025, 1, 9, 8, 0),
        )
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(created[0].round_name, "Round 1");
    assert_eq!(created[1].round_time, fx::time(13, 30));

    // The old round is gone and its shipment detached with docstat intact.
    assert!(h.rounds.get_round(old.round.id).await.is_err());
    let s = h.store.get_shipment("SH001").await.unwrap().unwrap();
    assert!(s.booking_round_id.is_none());
    assert_eq!(s.docstat, DocStat::WaitingRound);
}

#[tokio::test]
async fn allocation_fills_grade_quotas_round_robin() {
    let h = harness();
    seed_full_pool(&h).await;

    let ids: Vec<String> = (1..=10).map(|i| format!("SH{:03}", i)).collect();
    for id in &ids {
        h.store.seed_shipment(fx::shipment(id)).await;
    }
    let round = h
        .rounds
        .create_round(new_round("Morning"), &ids, fx::utc(2025, 1, 9, 8, 0))
        .await
        .unwrap();
    assert_eq!(round.shipments.len(), 10);

    let now = fx::utc(2025, 1, 9, 9, 0);
    let allocated = h
        .rounds
        .allocate(round.round.id, &QuotaShares::default(), now)
        .await
        .unwrap();
    assert_eq!(allocated.round.status, RoundStatus::Allocated);

    // Quotas (4, 3, 2, 1): every shipment got a vendor, none parked.
    assert!(allocated
        .shipments
        .iter()
        .all(|s| s.docstat == DocStat::WaitingVendor));
    let count_for = |vencode: &str| {
        allocated
            .shipments
            .iter()
            .filter(|s| s.vencode.as_deref() == Some(vencode))
            .count()
    };
    // Grade A round-robins its three vendors over four slots.
    assert_eq!(count_for("V_A_1") + count_for("V_A_2") + count_for("V_A_3"), 4);
    assert!(count_for("V_A_1") >= 1 && count_for("V_A_2") >= 1 && count_for("V_A_3") >= 1);
    assert_eq!(count_for("V_B_1"), 3);
    assert_eq!(count_for("V_C_1"), 2);
    assert_eq!(count_for("V_D_1"), 1);

    // Fairness bookkeeping and vendor notification.
    let vendor = h.store.get_vendor("V_A_1").await.unwrap().unwrap();
    assert_eq!(vendor.last_assigned_at, Some(now));
    assert_eq!(h.notifier.tokens_for("New shipment assigned").len(), 10);
}

#[tokio::test]
async fn allocation_parks_uncoverable_shipments() {
    let h = harness();
    // Only V_A_1 can haul cartype 10; everyone else owns cartype 20 trucks.
    h.store.seed_warehouse(fx::warehouse("WH7")).await;
    h.store.seed_lead_time(fx::lead_time("R01", 2)).await;
    h.store.seed_vendor(fx::vendor("V_A_1", Grade::A)).await;
    h.store.seed_car(fx::car("AA-01", "V_A_1", "10")).await;
    h.store.seed_user(fx::vendor_user(1, "V_A_1")).await;
    for (i, (vencode, grade)) in [
        ("V_A_2", Grade::A),
        ("V_A_3", Grade::A),
        ("V_B_1", Grade::B),
        ("V_C_1", Grade::C),
        ("V_D_1", Grade::D),
    ]
    .iter()
    .enumerate()
    {
        h.store.seed_vendor(fx::vendor(vencode, *grade)).await;
        h.store
            .seed_car(fx::car(&format!("BB-{}1", i), vencode, "20"))
            .await;
        h.store.seed_user(fx::vendor_user(i as i64 + 2, vencode)).await;
    }

    let ids: Vec<String> = (1..=10).map(|i| format!("SH{:03}", i)).collect();
    for id in &ids {
        h.store.seed_shipment(fx::shipment(id)).await;
    }
    let round = h
        .rounds
        .create_round(new_round("Morning"), &ids, fx::utc(2025, 1, 9, 8, 0))
        .await
        .unwrap();

    let allocated = h
        .rounds
        .allocate(round.round.id, &QuotaShares::default(), fx::utc(2025, 1, 9, 9, 0))
        .await
        .unwrap();

    let assigned: Vec<&fdk_schemas::Shipment> = allocated
        .shipments
        .iter()
        .filter(|s| s.docstat == DocStat::WaitingVendor)
        .collect();
    let parked: Vec<&fdk_schemas::Shipment> = allocated
        .shipments
        .iter()
        .filter(|s| s.docstat == DocStat::OnHold)
        .collect();

    // Grade A's quota caps the only capable vendor at 4; the remaining 6
    // park for dispatcher attention without becoming dispatcher holds.
    assert_eq!(assigned.len(), 4);
    assert!(assigned.iter().all(|s| s.vencode.as_deref() == Some("V_A_1")));
    assert_eq!(parked.len(), 6);
    assert!(parked.iter().all(|s| !s.is_on_hold));
}

#[tokio::test]
async fn pending_confirmation_lists_rounds_with_confirmed_shipments() {
    let h = harness();
    seed_full_pool(&h).await;

    h.store.seed_shipment(fx::shipment("SH001")).await;
    let round = h
        .rounds
        .create_round(new_round("Morning"), &["SH001".to_string()], fx::utc(2025, 1, 9, 8, 0))
        .await
        .unwrap();

    assert!(h.rounds.pending_confirmation().await.unwrap().is_empty());

    h.dispatch
        .request_booking("SH001", "disp1", fx::utc(2025, 1, 9, 8, 30))
        .await
        .unwrap();
    h.dispatch
        .vendor_confirm("V_A_1", "SH001", "AA-01", None, fx::utc(2025, 1, 9, 8, 40))
        .await
        .unwrap();

    let pending = h.rounds.pending_confirmation().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].round.id, round.round.id);
}
