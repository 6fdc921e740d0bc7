//! The `DispatchStore` trait: every read and transactional mutator the
//! dispatch system needs from its persistence layer.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use fdk_allocate::AllocationPlan;
use fdk_lifecycle::Event;
use fdk_schemas::{
    BookingRound, Car, Grade, LeadTime, MasterRound, RoundWithShipments, Shipment,
    ShipmentDetail, Vendor, Warehouse,
};

use crate::{NewRound, NewShipment, ShipmentFilter, StoreError};

#[async_trait]
pub trait DispatchStore: Send + Sync {
    // ── Shipments: reads ─────────────────────────────────────────────────

    async fn get_shipment(&self, shipid: &str) -> Result<Option<Shipment>, StoreError>;

    /// Unrounded, not-held shipments, optionally narrowed to an appointment
    /// date and a warehouse; shipid ascending.
    async fn list_unassigned(
        &self,
        apmdate: Option<NaiveDate>,
        shippoint: Option<&str>,
    ) -> Result<Vec<Shipment>, StoreError>;

    async fn list_held(&self, shippoint: Option<&str>) -> Result<Vec<Shipment>, StoreError>;

    /// Dispatcher listing; apmdate descending.
    async fn list_shipments(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, StoreError>;

    /// What a vendor of `grade` may act on: shipments offered to that grade
    /// (`02`) plus open broadcasts the vendor has not rejected.
    async fn list_for_vendor(
        &self,
        grade: Grade,
        vencode: &str,
    ) -> Result<Vec<Shipment>, StoreError>;

    /// In-progress work (`03`/`04`), optionally per vendor; apmdate
    /// ascending.
    async fn list_ongoing(&self, vencode: Option<&str>) -> Result<Vec<Shipment>, StoreError>;

    /// Finished work (`06`/`RJ`), optionally per vendor; most recently
    /// touched first, capped at 200 rows.
    async fn list_history(&self, vencode: Option<&str>) -> Result<Vec<Shipment>, StoreError>;

    async fn list_details(&self, shipid: &str) -> Result<Vec<ShipmentDetail>, StoreError>;

    /// `02` shipments whose offer expired at or before `cutoff`.
    async fn list_expired_waiting(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Shipment>, StoreError>;

    /// `BC` shipments whose broadcast expired at or before `cutoff`.
    async fn list_expired_broadcast(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Shipment>, StoreError>;

    // ── Shipments: mutations ─────────────────────────────────────────────

    async fn insert_shipment(
        &self,
        new: NewShipment,
        now: DateTime<Utc>,
    ) -> Result<Shipment, StoreError>;

    /// Apply one lifecycle event under the shipment row lock. For
    /// `VendorConfirm` the car row is locked after the shipment row and the
    /// reservation predicate is checked in the same transaction.
    async fn apply_event(
        &self,
        shipid: &str,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<Shipment, StoreError>;

    // ── Vendors / cars / master data ─────────────────────────────────────

    async fn get_vendor(&self, vencode: &str) -> Result<Option<Vendor>, StoreError>;

    /// Deterministic representative of a grade: the active vendor with the
    /// smallest vencode.
    async fn first_vendor_by_grade(&self, grade: Grade) -> Result<Option<Vendor>, StoreError>;

    /// All vendors with their cars attached, vencode ascending.
    async fn list_vendors_with_cars(&self) -> Result<Vec<(Vendor, Vec<Car>)>, StoreError>;

    async fn get_car(&self, carlicense: &str) -> Result<Option<Car>, StoreError>;

    async fn get_lead_time(&self, route: &str) -> Result<Option<LeadTime>, StoreError>;

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError>;

    async fn list_master_rounds(&self) -> Result<Vec<MasterRound>, StoreError>;

    // ── Booking rounds ───────────────────────────────────────────────────

    async fn get_round(&self, round_id: i64) -> Result<Option<RoundWithShipments>, StoreError>;

    /// A day's rounds for a warehouse, round_time ascending, shipments
    /// attached.
    async fn list_rounds(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
    ) -> Result<Vec<RoundWithShipments>, StoreError>;

    /// Rounds containing at least one vendor-confirmed (`03`) shipment.
    async fn list_rounds_pending_confirmation(
        &self,
    ) -> Result<Vec<RoundWithShipments>, StoreError>;

    /// Insert a round and atomically move the listed unrounded, not-held
    /// shipments into it with `docstat := 01`; other listed shipments are
    /// silently skipped. Side effect preserved from the source system:
    /// every held shipment anywhere is released back to its pre-hold state.
    async fn create_round(
        &self,
        new: NewRound,
        shipment_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError>;

    /// Replace a day's rounds for a warehouse: detach shipments from the
    /// old rounds (docstat untouched), delete them, insert the new times.
    async fn sync_day_rounds(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
        round_times: &[NaiveTime],
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingRound>, StoreError>;

    /// Move every ready shipment (unrounded, not held, matching shippoint
    /// and creation date) into the round. Same global un-hold side effect
    /// as `create_round`.
    async fn assign_all_ready(
        &self,
        round_id: i64,
        crdate: NaiveDate,
        shippoint: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError>;

    /// Apply an allocation plan: every planned shipment is re-verified to
    /// still be `01` under its row lock; assigned vendors get
    /// `last_assigned_at := now`; the round is marked allocated. Any error
    /// rolls the whole allocation back.
    async fn apply_allocation(
        &self,
        round_id: i64,
        plan: &AllocationPlan,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError>;

    /// Finalize every `03` shipment in the round (`docstat := 04`) and
    /// commit its car reservation (inactive + blocked-until date). All or
    /// nothing; re-running writes identical values.
    async fn confirm_round(
        &self,
        round_id: i64,
        confirmed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError>;

    // ── Notification recipients ──────────────────────────────────────────

    async fn vendor_tokens_by_grade(&self, grade: Grade) -> Result<Vec<String>, StoreError>;

    async fn vendor_tokens_except(&self, vencode: &str) -> Result<Vec<String>, StoreError>;

    async fn vendor_tokens_not_of_grade(&self, grade: Grade) -> Result<Vec<String>, StoreError>;

    async fn dispatcher_tokens(&self) -> Result<Vec<String>, StoreError>;

    async fn token_for_vencode(&self, vencode: &str) -> Result<Option<String>, StoreError>;
}
