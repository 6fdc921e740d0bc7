//! Timeout worker scans with a deterministic clock: boundary exactness,
//! escalation to broadcast, parking expired broadcasts, and resilience to
//! rows it cannot escalate.

use std::sync::Arc;

use fdk_db::DispatchStore;
use fdk_lifecycle::Event;
use fdk_notify::Notifier;
use fdk_schemas::{DocStat, Grade};
use fdk_testkit::{fixtures as fx, CapturingNotifier, MemStore};
use fdk_worker::{TimeoutWorker, WorkerConfig};

fn worker(
    store: &Arc<MemStore>,
    notifier: &Arc<CapturingNotifier>,
) -> TimeoutWorker<MemStore> {
    TimeoutWorker::new(
        Arc::clone(store),
        Arc::clone(notifier) as Arc<dyn Notifier>,
        WorkerConfig::default(), // 30-minute response timeout
    )
}

async fn seed_pool(store: &MemStore) {
    store.seed_vendor(fx::vendor("V_A_1", Grade::A)).await;
    store.seed_user(fx::vendor_user(1, "V_A_1")).await;
    store.seed_vendor(fx::vendor("V_B_1", Grade::B)).await;
    store.seed_car(fx::car("BB-111", "V_B_1", "10")).await;
    store.seed_user(fx::vendor_user(2, "V_B_1")).await;
    store.seed_user(fx::dispatcher_user(3, "disp1")).await;
}

/// Shipment offered to grade A at `assigned_at`.
fn offered(shipid: &str, assigned_at: chrono::DateTime<chrono::Utc>) -> fdk_schemas::Shipment {
    let mut s = fx::shipment(shipid);
    s.docstat = DocStat::WaitingVendor;
    s.current_grade_to_assign = Some(Grade::A);
    s.vencode = Some("V_A_1".into());
    s.assigned_at = Some(assigned_at);
    s
}

#[tokio::test]
async fn expiry_boundary_is_exact() {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    seed_pool(&store).await;

    let now = fx::utc(2025, 1, 9, 9, 0);
    // Exactly T_resp old: expired.
    store.seed_shipment(offered("SH001", fx::utc(2025, 1, 9, 8, 30))).await;
    // One second fresher: not expired.
    let mut fresh = offered("SH002", fx::utc(2025, 1, 9, 8, 30));
    fresh.assigned_at = Some(fx::utc(2025, 1, 9, 8, 30) + chrono::Duration::seconds(1));
    store.seed_shipment(fresh).await;

    let report = worker(&store, &notifier).run_tick(now).await;
    assert_eq!(report.escalated, 1);
    assert_eq!(report.failures, 0);

    let s1 = store.get_shipment("SH001").await.unwrap().unwrap();
    assert_eq!(s1.docstat, DocStat::Broadcast);
    let s2 = store.get_shipment("SH002").await.unwrap().unwrap();
    assert_eq!(s2.docstat, DocStat::WaitingVendor);
}

#[tokio::test]
async fn expired_offer_broadcasts_and_blames_the_grade() {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    seed_pool(&store).await;

    store.seed_shipment(offered("SH002", fx::utc(2025, 1, 9, 8, 0))).await;

    let now = fx::utc(2025, 1, 9, 8, 30);
    let report = worker(&store, &notifier).run_tick(now).await;
    assert_eq!(report.escalated, 1);

    let s = store.get_shipment("SH002").await.unwrap().unwrap();
    assert_eq!(s.docstat, DocStat::Broadcast);
    assert_eq!(s.assigned_at, Some(now), "broadcast window restarts");
    // The blamed vendor belongs to the timed-out grade.
    let grade_a: Vec<String> = vec!["V_A_1".into()];
    assert!(s.rejected_by_vencodes.iter().all(|v| grade_a.contains(v)));
    assert!(!s.rejected_by_vencodes.is_empty());

    // Only vendors outside grade A hear about the open offer.
    assert_eq!(
        notifier.tokens_for("Shipment open for booking"),
        vec!["tok-V_B_1"]
    );

    // A grade-B vendor may now claim it within the broadcast window.
    store
        .apply_event(
            "SH002",
            &Event::VendorConfirm {
                vencode: "V_B_1".into(),
                grade: Grade::B,
                carlicense: "BB-111".into(),
                carnote: None,
            },
            now + chrono::Duration::minutes(5),
        )
        .await
        .unwrap();
    let s = store.get_shipment("SH002").await.unwrap().unwrap();
    assert_eq!(s.docstat, DocStat::VendorConfirmed);
    assert_eq!(s.confirmed_by_grade, Some(Grade::B));
}

#[tokio::test]
async fn expired_broadcast_parks_and_alerts_dispatchers() {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    seed_pool(&store).await;

    let mut s = fx::shipment("SH003");
    s.docstat = DocStat::Broadcast;
    s.assigned_at = Some(fx::utc(2025, 1, 9, 8, 0));
    s.rejected_by_vencodes = vec!["V_A_1".into()];
    store.seed_shipment(s).await;

    let report = worker(&store, &notifier).run_tick(fx::utc(2025, 1, 9, 8, 30)).await;
    assert_eq!(report.parked, 1);

    let s = store.get_shipment("SH003").await.unwrap().unwrap();
    assert_eq!(s.docstat, DocStat::OnHold);
    assert!(!s.is_on_hold, "parked, not a dispatcher hold");
    assert!(s.assigned_at.is_none());
    assert_eq!(
        notifier.tokens_for("Shipment needs attention"),
        vec!["tok-disp1"]
    );
}

#[tokio::test]
async fn rescanning_is_idempotent() {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    seed_pool(&store).await;

    store.seed_shipment(offered("SH002", fx::utc(2025, 1, 9, 8, 0))).await;

    let w = worker(&store, &notifier);
    let now = fx::utc(2025, 1, 9, 8, 30);
    let first = w.run_tick(now).await;
    assert_eq!(first.escalated, 1);

    // Same instant again: the broadcast window just restarted, so nothing
    // is eligible and nothing changes.
    let second = w.run_tick(now).await;
    assert_eq!(second.escalated, 0);
    assert_eq!(second.parked, 0);
    assert_eq!(second.failures, 0);

    // A full response window later the broadcast itself expires.
    let third = w.run_tick(now + chrono::Duration::minutes(30)).await;
    assert_eq!(third.parked, 1);
}

#[tokio::test]
async fn unblamable_rows_are_skipped_not_fatal() {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    // No grade-D vendor exists anywhere.
    seed_pool(&store).await;

    let mut stuck = fx::shipment("SH001");
    stuck.docstat = DocStat::WaitingVendor;
    stuck.current_grade_to_assign = Some(Grade::D);
    stuck.vencode = None;
    stuck.assigned_at = Some(fx::utc(2025, 1, 9, 8, 0));
    store.seed_shipment(stuck).await;

    store.seed_shipment(offered("SH002", fx::utc(2025, 1, 9, 8, 0))).await;

    let report = worker(&store, &notifier).run_tick(fx::utc(2025, 1, 9, 8, 30)).await;
    assert_eq!(report.failures, 1, "no vendor to blame for SH001");
    assert_eq!(report.escalated, 1, "SH002 still escalated");

    let s = store.get_shipment("SH002").await.unwrap().unwrap();
    assert_eq!(s.docstat, DocStat::Broadcast);
}

#[tokio::test]
async fn spawned_worker_escalates_and_stops() {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    seed_pool(&store).await;

    // Already long expired relative to the real clock the spawned loop
    // uses.
    store.seed_shipment(offered("SH002", fx::utc(2025, 1, 9, 8, 0))).await;

    let handle = TimeoutWorker::new(
        Arc::clone(&store),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        WorkerConfig {
            response_timeout: chrono::Duration::minutes(30),
            tick: std::time::Duration::from_millis(10),
        },
    )
    .spawn();

    // Give the loop a few ticks, then stop it.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    handle.stop().await;

    let s = store.get_shipment("SH002").await.unwrap().unwrap();
    assert_eq!(s.docstat, DocStat::Broadcast);
}
