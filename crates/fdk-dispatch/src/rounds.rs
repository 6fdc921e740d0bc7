//! Booking-round operations: CRUD, day synchronization, allocation and
//! dispatcher confirmation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::info;

use fdk_allocate::{plan, QuotaVector, ShipmentReq, VendorSnapshot};
use fdk_db::{DispatchStore, NewRound};
use fdk_notify::{push_all, Notification, Notifier};
use fdk_schemas::{BookingRound, DocStat, QuotaShares, RoundWithShipments};

use crate::DispatchError;

pub struct RoundService<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: DispatchStore> RoundService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn get_rounds(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
    ) -> Result<Vec<RoundWithShipments>, DispatchError> {
        Ok(self.store.list_rounds(round_date, warehouse_code).await?)
    }

    pub async fn get_round(&self, round_id: i64) -> Result<RoundWithShipments, DispatchError> {
        self.store
            .get_round(round_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("booking round {} not found", round_id)))
    }

    pub async fn pending_confirmation(&self) -> Result<Vec<RoundWithShipments>, DispatchError> {
        Ok(self.store.list_rounds_pending_confirmation().await?)
    }

    /// Create a round and pull the listed shipments into it. Shipments that
    /// are held or already belong to a round are skipped silently.
    pub async fn create_round(
        &self,
        new: NewRound,
        shipment_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, DispatchError> {
        if new.round_name.trim().is_empty() {
            return Err(DispatchError::InvalidInput(
                "round_name must not be empty".to_string(),
            ));
        }
        let round = self.store.create_round(new, shipment_ids, now).await?;
        info!(
            round_id = round.round.id,
            shipments = round.shipments.len(),
            "booking round created"
        );
        Ok(round)
    }

    /// Replace a day's rounds for a warehouse with the given times.
    pub async fn save_day(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
        round_times: &[NaiveTime],
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingRound>, DispatchError> {
        let rounds = self
            .store
            .sync_day_rounds(round_date, warehouse_code, round_times, created_by, now)
            .await?;
        info!(%round_date, warehouse_code, count = rounds.len(), "day rounds synced");
        Ok(rounds)
    }

    /// Move every ready shipment for `(crdate, shippoint)` into the round.
    pub async fn assign_all_ready(
        &self,
        round_id: i64,
        crdate: NaiveDate,
        shippoint: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, DispatchError> {
        let round = self
            .store
            .assign_all_ready(round_id, crdate, shippoint, now)
            .await?;
        info!(round_id, shipments = round.shipments.len(), "assigned all ready");
        Ok(round)
    }

    /// Run the allocator over the round's waiting shipments and apply the
    /// resulting plan. Each assigned vendor is notified of its new work.
    pub async fn allocate(
        &self,
        round_id: i64,
        shares: &QuotaShares,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, DispatchError> {
        let current = self.get_round(round_id).await?;

        // Shipments arrive shipid-ascending from the store; the plan is
        // deterministic for that order.
        let ready: Vec<ShipmentReq> = current
            .shipments
            .iter()
            .filter(|s| s.docstat == DocStat::WaitingRound && !s.is_on_hold)
            .map(|s| ShipmentReq {
                shipid: s.shipid.clone(),
                cartype: s.cartype.clone(),
            })
            .collect();

        let snapshots: Vec<VendorSnapshot> = self
            .store
            .list_vendors_with_cars()
            .await?
            .iter()
            .map(|(v, cars)| VendorSnapshot::new(v, cars))
            .collect();

        let quota = QuotaVector::split(ready.len(), shares);
        let allocation = plan(&ready, &snapshots, quota);

        let round = self
            .store
            .apply_allocation(round_id, &allocation, now)
            .await?;
        info!(
            round_id,
            assigned = allocation.assignments.len(),
            parked = allocation.parked.len(),
            "round allocated"
        );

        for pa in &allocation.assignments {
            if let Some(token) = self.store.token_for_vencode(&pa.vencode).await? {
                push_all(
                    self.notifier.as_ref(),
                    &[token],
                    &Notification::new(
                        "New shipment assigned",
                        format!("Shipment {} is waiting for your confirmation", pa.shipid),
                    )
                    .with_data("shipid", pa.shipid.as_str()),
                )
                .await;
            }
        }

        Ok(round)
    }

    /// Finalize every vendor-confirmed shipment in the round and commit the
    /// car reservations. Each affected vendor is notified.
    pub async fn confirm_round(
        &self,
        round_id: i64,
        dispatcher: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, DispatchError> {
        let round = self.store.confirm_round(round_id, dispatcher, now).await?;
        info!(round_id, dispatcher, "round confirmed");

        for s in &round.shipments {
            if s.docstat != DocStat::DispatcherAssigned {
                continue;
            }
            let Some(vencode) = s.vencode.as_deref() else {
                continue;
            };
            if let Some(token) = self.store.token_for_vencode(vencode).await? {
                push_all(
                    self.notifier.as_ref(),
                    &[token],
                    &Notification::new(
                        "Shipment assignment finalized",
                        format!("Shipment {} is confirmed for you", s.shipid),
                    )
                    .with_data("shipid", s.shipid.as_str()),
                )
                .await;
            }
        }

        Ok(round)
    }
}
