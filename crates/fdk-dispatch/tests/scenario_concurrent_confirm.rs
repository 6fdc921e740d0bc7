//! Two vendors race to confirm the same broadcast shipment: exactly one
//! wins, the loser gets a state conflict, and the winner's truck is the one
//! recorded.

use std::sync::Arc;

use fdk_db::DispatchStore;
use fdk_dispatch::DispatchService;
use fdk_notify::Notifier;
use fdk_schemas::{DocStat, Grade};
use fdk_testkit::{fixtures as fx, CapturingNotifier, MemStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_have_exactly_one_winner() {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(CapturingNotifier::new());
    let dispatch = Arc::new(DispatchService::new(
        Arc::clone(&store),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    ));

    store.seed_vendor(fx::vendor("V_B_1", Grade::B)).await;
    store.seed_car(fx::car("BB-111", "V_B_1", "10")).await;
    store.seed_vendor(fx::vendor("V_C_1", Grade::C)).await;
    store.seed_car(fx::car("CC-111", "V_C_1", "10")).await;
    store.seed_user(fx::dispatcher_user(1, "disp1")).await;

    let mut s = fx::shipment("SH001");
    s.docstat = DocStat::Broadcast;
    s.assigned_at = Some(fx::utc(2025, 1, 9, 8, 0));
    s.rejected_by_vencodes = vec!["V_A_1".into()];
    store.seed_shipment(s).await;

    let now = fx::utc(2025, 1, 9, 8, 30);

    let d1 = Arc::clone(&dispatch);
    let t1 = tokio::spawn(async move {
        d1.vendor_confirm("V_B_1", "SH001", "BB-111", None, now).await
    });
    let d2 = Arc::clone(&dispatch);
    let t2 = tokio::spawn(async move {
        d2.vendor_confirm("V_C_1", "SH001", "CC-111", None, now).await
    });

    let r1 = t1.await.unwrap();
    let r2 = t2.await.unwrap();

    let (winner, loser) = match (&r1, &r2) {
        (Ok(_), Err(_)) => (r1.unwrap(), r2.unwrap_err()),
        (Err(_), Ok(_)) => (r2.unwrap(), r1.unwrap_err()),
        (Ok(_), Ok(_)) => panic!("both confirms succeeded"),
        (Err(_), Err(_)) => panic!("both confirms failed"),
    };

    assert_eq!(loser.kind(), "state_conflict");

    // The stored shipment matches the winner exactly.
    let stored = store.get_shipment("SH001").await.unwrap().unwrap();
    assert_eq!(stored.docstat, DocStat::VendorConfirmed);
    assert_eq!(stored.vencode, winner.vencode);
    assert_eq!(stored.carlicense, winner.carlicense);
    match stored.vencode.as_deref() {
        Some("V_B_1") => assert_eq!(stored.carlicense.as_deref(), Some("BB-111")),
        Some("V_C_1") => assert_eq!(stored.carlicense.as_deref(), Some("CC-111")),
        other => panic!("unexpected winner {:?}", other),
    }
}
