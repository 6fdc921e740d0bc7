//! In-memory [`DispatchStore`] with the same observable semantics as the
//! Postgres implementation.
//!
//! One async mutex guards all state and every mutator holds it for its
//! whole critical section — the mutex plays the role of the row locks, so
//! concurrent confirms serialize here exactly as they do on the database,
//! and the loser fails the re-checked lifecycle guard.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;

use fdk_allocate::AllocationPlan;
use fdk_db::{DispatchStore, NewRound, NewShipment, ShipmentFilter, StoreError};
use fdk_lifecycle::Event;
use fdk_schemas::{
    BookingRound, Car, CarStatus, DocStat, Grade, LeadTime, MasterRound, Role, RoundStatus,
    RoundWithShipments, Shipment, ShipmentDetail, User, Vendor, Warehouse,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct Inner {
    shipments: BTreeMap<String, Shipment>,
    details: BTreeMap<String, Vec<ShipmentDetail>>,
    vendors: BTreeMap<String, Vendor>,
    cars: BTreeMap<String, Car>,
    users: Vec<User>,
    lead_times: BTreeMap<String, LeadTime>,
    warehouses: BTreeMap<String, Warehouse>,
    master_rounds: Vec<MasterRound>,
    rounds: BTreeMap<i64, BookingRound>,
    next_round_id: i64,
}

pub struct MemStore {
    inner: Mutex<Inner>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                shipments: BTreeMap::new(),
                details: BTreeMap::new(),
                vendors: BTreeMap::new(),
                cars: BTreeMap::new(),
                users: Vec::new(),
                lead_times: BTreeMap::new(),
                warehouses: BTreeMap::new(),
                master_rounds: Vec::new(),
                rounds: BTreeMap::new(),
                next_round_id: 1,
            }),
        }
    }

    // ── Seeding (insert-or-replace) ──────────────────────────────────────

    pub async fn seed_shipment(&self, s: Shipment) {
        self.inner.lock().await.shipments.insert(s.shipid.clone(), s);
    }

    pub async fn seed_detail(&self, d: ShipmentDetail) {
        self.inner
            .lock()
            .await
            .details
            .entry(d.shipid.clone())
            .or_default()
            .push(d);
    }

    pub async fn seed_vendor(&self, v: Vendor) {
        self.inner.lock().await.vendors.insert(v.vencode.clone(), v);
    }

    pub async fn seed_car(&self, c: Car) {
        self.inner.lock().await.cars.insert(c.carlicense.clone(), c);
    }

    pub async fn seed_user(&self, u: User) {
        self.inner.lock().await.users.push(u);
    }

    pub async fn seed_lead_time(&self, lt: LeadTime) {
        self.inner.lock().await.lead_times.insert(lt.route.clone(), lt);
    }

    pub async fn seed_warehouse(&self, w: Warehouse) {
        self.inner.lock().await.warehouses.insert(w.code.clone(), w);
    }

    pub async fn seed_master_round(&self, m: MasterRound) {
        self.inner.lock().await.master_rounds.push(m);
    }

    /// Mutate a seeded shipment in place (e.g. age `assigned_at` to push it
    /// past the response timeout).
    pub async fn with_shipment_mut(&self, shipid: &str, f: impl FnOnce(&mut Shipment)) {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.shipments.get_mut(shipid) {
            f(s);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn by_apmdate_desc(a: &Shipment, b: &Shipment) -> std::cmp::Ordering {
    b.apmdate.cmp(&a.apmdate).then_with(|| a.shipid.cmp(&b.shipid))
}

fn round_with_shipments(inner: &Inner, round_id: i64) -> Option<RoundWithShipments> {
    let round = inner.rounds.get(&round_id)?.clone();
    let shipments = shipments_in_round(inner, round_id);
    Some(RoundWithShipments { round, shipments })
}

fn shipments_in_round(inner: &Inner, round_id: i64) -> Vec<Shipment> {
    // BTreeMap iteration is shipid-ascending already.
    inner
        .shipments
        .values()
        .filter(|s| s.booking_round_id == Some(round_id))
        .cloned()
        .collect()
}

fn unhold_all(inner: &mut Inner, actor: &str, now: DateTime<Utc>) {
    for s in inner.shipments.values_mut() {
        if s.is_on_hold {
            if let Some(prior) = s.docstat_before_hold.take() {
                s.docstat = prior;
                s.is_on_hold = false;
                s.chuser = Some(actor.to_string());
                s.chdate = Some(now);
            }
        }
    }
}

fn vendor_grade(inner: &Inner, vencode: &str) -> Option<Grade> {
    inner.vendors.get(vencode).map(|v| v.grade)
}

fn active_vendor_token(user: &User) -> Option<String> {
    if user.role == Role::Vendor && user.active {
        user.fcm_token.clone()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// DispatchStore implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl DispatchStore for MemStore {
    async fn get_shipment(&self, shipid: &str) -> Result<Option<Shipment>, StoreError> {
        Ok(self.inner.lock().await.shipments.get(shipid).cloned())
    }

    async fn list_unassigned(
        &self,
        apmdate: Option<NaiveDate>,
        shippoint: Option<&str>,
    ) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .shipments
            .values()
            .filter(|s| s.booking_round_id.is_none() && !s.is_on_hold)
            .filter(|s| shippoint.map(|w| s.shippoint == w).unwrap_or(true))
            .filter(|s| apmdate.map(|d| s.apmdate.date_naive() == d).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn list_held(&self, shippoint: Option<&str>) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .shipments
            .values()
            .filter(|s| s.is_on_hold)
            .filter(|s| shippoint.map(|w| s.shippoint == w).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn list_shipments(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Shipment> = inner
            .shipments
            .values()
            .filter(|s| filter.docstat.map(|d| s.docstat == d).unwrap_or(true))
            .filter(|s| {
                filter
                    .vencode
                    .as_deref()
                    .map(|v| s.vencode.as_deref() == Some(v))
                    .unwrap_or(true)
            })
            .filter(|s| filter.apmdate_from.map(|t| s.apmdate >= t).unwrap_or(true))
            .filter(|s| filter.apmdate_to.map(|t| s.apmdate <= t).unwrap_or(true))
            .filter(|s| filter.is_on_hold.map(|h| s.is_on_hold == h).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(by_apmdate_desc);
        Ok(out)
    }

    async fn list_for_vendor(
        &self,
        grade: Grade,
        vencode: &str,
    ) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Shipment> = inner
            .shipments
            .values()
            .filter(|s| match s.docstat {
                DocStat::WaitingVendor => s.current_grade_to_assign == Some(grade),
                DocStat::Broadcast => !s.rejected_contains(vencode),
                _ => false,
            })
            .cloned()
            .collect();
        out.sort_by(by_apmdate_desc);
        Ok(out)
    }

    async fn list_ongoing(&self, vencode: Option<&str>) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Shipment> = inner
            .shipments
            .values()
            .filter(|s| {
                matches!(
                    s.docstat,
                    DocStat::VendorConfirmed | DocStat::DispatcherAssigned
                )
            })
            .filter(|s| {
                vencode
                    .map(|v| s.vencode.as_deref() == Some(v))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.apmdate.cmp(&b.apmdate).then_with(|| a.shipid.cmp(&b.shipid)));
        Ok(out)
    }

    async fn list_history(&self, vencode: Option<&str>) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Shipment> = inner
            .shipments
            .values()
            .filter(|s| matches!(s.docstat, DocStat::Canceled | DocStat::RejectedAll))
            .filter(|s| {
                vencode
                    .map(|v| s.vencode.as_deref() == Some(v))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        // Most recently touched first; untouched rows sink to the end.
        out.sort_by(|a, b| match (b.chdate, a.chdate) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.shipid.cmp(&b.shipid)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.shipid.cmp(&b.shipid),
        });
        out.truncate(200);
        Ok(out)
    }

    async fn list_details(&self, shipid: &str) -> Result<Vec<ShipmentDetail>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out = inner.details.get(shipid).cloned().unwrap_or_default();
        out.sort_by(|a, b| a.doid.cmp(&b.doid));
        Ok(out)
    }

    async fn list_expired_waiting(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .shipments
            .values()
            .filter(|s| {
                s.docstat == DocStat::WaitingVendor
                    && s.assigned_at.map(|t| t <= cutoff).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_expired_broadcast(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Shipment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .shipments
            .values()
            .filter(|s| {
                s.docstat == DocStat::Broadcast
                    && s.assigned_at.map(|t| t <= cutoff).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn insert_shipment(
        &self,
        new: NewShipment,
        now: DateTime<Utc>,
    ) -> Result<Shipment, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.shipments.contains_key(&new.shipid) {
            return Err(StoreError::Conflict(format!(
                "shipment {} already exists",
                new.shipid
            )));
        }
        let s = Shipment {
            shipid: new.shipid.clone(),
            customer_name: new.customer_name,
            shippoint: new.shippoint,
            route: new.route,
            cartype: new.cartype,
            volume_cbm: new.volume_cbm,
            apmdate: new.apmdate,
            crdate: now,
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
        };
        inner.shipments.insert(new.shipid, s.clone());
        Ok(s)
    }

    async fn apply_event(
        &self,
        shipid: &str,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<Shipment, StoreError> {
        // Lock held for the whole read-transition-write cycle.
        let mut inner = self.inner.lock().await;
        let current = inner
            .shipments
            .get(shipid)
            .cloned()
            .ok_or_else(|| StoreError::not_found("shipment", shipid))?;

        let next = fdk_lifecycle::apply(&current, event, now)?;

        if let Event::VendorConfirm {
            vencode, carlicense, ..
        } = event
        {
            let car = inner.cars.get(carlicense.as_str());
            fdk_carbook::try_reserve(car, carlicense, vencode, next.apmdate.date_naive())?;
        }

        inner.shipments.insert(shipid.to_string(), next.clone());
        Ok(next)
    }

    async fn get_vendor(&self, vencode: &str) -> Result<Option<Vendor>, StoreError> {
        Ok(self.inner.lock().await.vendors.get(vencode).cloned())
    }

    async fn first_vendor_by_grade(&self, grade: Grade) -> Result<Option<Vendor>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .vendors
            .values()
            .find(|v| v.grade == grade && v.active)
            .cloned())
    }

    async fn list_vendors_with_cars(&self) -> Result<Vec<(Vendor, Vec<Car>)>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .vendors
            .values()
            .map(|v| {
                let cars: Vec<Car> = inner
                    .cars
                    .values()
                    .filter(|c| c.vencode == v.vencode)
                    .cloned()
                    .collect();
                (v.clone(), cars)
            })
            .collect())
    }

    async fn get_car(&self, carlicense: &str) -> Result<Option<Car>, StoreError> {
        Ok(self.inner.lock().await.cars.get(carlicense).cloned())
    }

    async fn get_lead_time(&self, route: &str) -> Result<Option<LeadTime>, StoreError> {
        Ok(self.inner.lock().await.lead_times.get(route).cloned())
    }

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.warehouses.values().filter(|w| w.active).cloned().collect())
    }

    async fn list_master_rounds(&self) -> Result<Vec<MasterRound>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<MasterRound> =
            inner.master_rounds.iter().filter(|m| m.active).cloned().collect();
        out.sort_by_key(|m| m.round_time);
        Ok(out)
    }

    async fn get_round(&self, round_id: i64) -> Result<Option<RoundWithShipments>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(round_with_shipments(&inner, round_id))
    }

    async fn list_rounds(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
    ) -> Result<Vec<RoundWithShipments>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rounds: Vec<&BookingRound> = inner
            .rounds
            .values()
            .filter(|r| r.round_date == round_date && r.warehouse_code == warehouse_code)
            .collect();
        rounds.sort_by(|a, b| a.round_time.cmp(&b.round_time).then(a.id.cmp(&b.id)));
        Ok(rounds
            .into_iter()
            .filter_map(|r| round_with_shipments(&inner, r.id))
            .collect())
    }

    async fn list_rounds_pending_confirmation(
        &self,
    ) -> Result<Vec<RoundWithShipments>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rounds: Vec<&BookingRound> = inner
            .rounds
            .values()
            .filter(|r| {
                inner.shipments.values().any(|s| {
                    s.booking_round_id == Some(r.id) && s.docstat == DocStat::VendorConfirmed
                })
            })
            .collect();
        rounds.sort_by(|a, b| {
            a.round_date
                .cmp(&b.round_date)
                .then(a.round_time.cmp(&b.round_time))
                .then(a.id.cmp(&b.id))
        });
        Ok(rounds
            .into_iter()
            .filter_map(|r| round_with_shipments(&inner, r.id))
            .collect())
    }

    async fn create_round(
        &self,
        new: NewRound,
        shipment_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_round_id;
        inner.next_round_id += 1;

        let round = BookingRound {
            id,
            round_name: new.round_name,
            round_date: new.round_date,
            round_time: new.round_time,
            warehouse_code: new.warehouse_code,
            total_volume_cbm: new.total_volume_cbm,
            status: RoundStatus::Pending,
            created_by: new.created_by.clone(),
            created_at: now,
        };
        inner.rounds.insert(id, round);

        for shipid in shipment_ids {
            if let Some(s) = inner.shipments.get_mut(shipid) {
                // Already-rounded or held shipments are silently skipped.
                if s.booking_round_id.is_some() || s.is_on_hold {
                    continue;
                }
                s.booking_round_id = Some(id);
                s.docstat = DocStat::WaitingRound;
                s.vencode = None;
                s.carlicense = None;
                s.carnote = None;
                s.confirmed_by_grade = None;
                s.current_grade_to_assign = None;
                s.assigned_at = None;
                s.rejected_by_vencodes.clear();
                s.chuser = Some(new.created_by.clone());
                s.chdate = Some(now);
            }
        }

        unhold_all(&mut inner, &new.created_by, now);

        Ok(round_with_shipments(&inner, id).expect("round just inserted"))
    }

    async fn sync_day_rounds(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
        round_times: &[NaiveTime],
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingRound>, StoreError> {
        let mut inner = self.inner.lock().await;

        let old_ids: Vec<i64> = inner
            .rounds
            .values()
            .filter(|r| r.round_date == round_date && r.warehouse_code == warehouse_code)
            .map(|r| r.id)
            .collect();

        for s in inner.shipments.values_mut() {
            if let Some(rid) = s.booking_round_id {
                if old_ids.contains(&rid) {
                    s.booking_round_id = None;
                }
            }
        }
        for rid in &old_ids {
            inner.rounds.remove(rid);
        }

        let mut created = Vec::with_capacity(round_times.len());
        for (i, t) in round_times.iter().enumerate() {
            let id = inner.next_round_id;
            inner.next_round_id += 1;
            let round = BookingRound {
                id,
                round_name: format!("Round {}", i + 1),
                round_date,
                round_time: *t,
                warehouse_code: warehouse_code.to_string(),
                total_volume_cbm: None,
                status: RoundStatus::Pending,
                created_by: created_by.to_string(),
                created_at: now,
            };
            inner.rounds.insert(id, round.clone());
            created.push(round);
        }

        Ok(created)
    }

    async fn assign_all_ready(
        &self,
        round_id: i64,
        crdate: NaiveDate,
        shippoint: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut inner = self.inner.lock().await;
        let created_by = inner
            .rounds
            .get(&round_id)
            .map(|r| r.created_by.clone())
            .ok_or_else(|| StoreError::not_found("booking round", round_id.to_string()))?;

        for s in inner.shipments.values_mut() {
            if s.booking_round_id.is_none()
                && !s.is_on_hold
                && s.shippoint == shippoint
                && s.crdate.date_naive() == crdate
            {
                s.booking_round_id = Some(round_id);
                s.docstat = DocStat::WaitingRound;
                s.vencode = None;
                s.carlicense = None;
                s.carnote = None;
                s.confirmed_by_grade = None;
                s.current_grade_to_assign = None;
                s.assigned_at = None;
                s.rejected_by_vencodes.clear();
                s.chuser = Some(created_by.clone());
                s.chdate = Some(now);
            }
        }

        unhold_all(&mut inner, &created_by, now);

        Ok(round_with_shipments(&inner, round_id).expect("round exists"))
    }

    async fn apply_allocation(
        &self,
        round_id: i64,
        plan: &AllocationPlan,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.rounds.contains_key(&round_id) {
            return Err(StoreError::not_found("booking round", round_id.to_string()));
        }

        // Stage every transition first so a late failure leaves no partial
        // allocation behind (all-or-nothing, like the database transaction).
        let mut staged: Vec<Shipment> = Vec::new();
        for pa in &plan.assignments {
            let current = inner
                .shipments
                .get(&pa.shipid)
                .filter(|s| s.booking_round_id == Some(round_id))
                .ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "shipment {} left round {} during allocation",
                        pa.shipid, round_id
                    ))
                })?;
            staged.push(fdk_lifecycle::apply(
                current,
                &Event::AllocatorAssign {
                    vencode: pa.vencode.clone(),
                    grade: pa.grade,
                },
                now,
            )?);
        }
        for shipid in &plan.parked {
            let current = inner
                .shipments
                .get(shipid)
                .filter(|s| s.booking_round_id == Some(round_id))
                .ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "shipment {} left round {} during allocation",
                        shipid, round_id
                    ))
                })?;
            staged.push(fdk_lifecycle::apply(current, &Event::AllocatorPark, now)?);
        }

        for s in staged {
            inner.shipments.insert(s.shipid.clone(), s);
        }
        for pa in &plan.assignments {
            if let Some(v) = inner.vendors.get_mut(&pa.vencode) {
                v.last_assigned_at = Some(now);
            }
        }
        if let Some(r) = inner.rounds.get_mut(&round_id) {
            r.status = RoundStatus::Allocated;
        }

        Ok(round_with_shipments(&inner, round_id).expect("round exists"))
    }

    async fn confirm_round(
        &self,
        round_id: i64,
        confirmed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.rounds.contains_key(&round_id) {
            return Err(StoreError::not_found("booking round", round_id.to_string()));
        }

        let to_confirm: Vec<Shipment> = shipments_in_round(&inner, round_id)
            .into_iter()
            .filter(|s| s.docstat == DocStat::VendorConfirmed)
            .collect();

        // Stage everything before mutating: all-or-nothing.
        let mut staged_cars: Vec<(String, NaiveDate)> = Vec::new();
        let mut staged_shipments: Vec<Shipment> = Vec::new();
        for s in &to_confirm {
            let lic = s.carlicense.clone().ok_or_else(|| {
                StoreError::Conflict(format!("shipment {} has no reserved car", s.shipid))
            })?;
            if !inner.cars.contains_key(&lic) {
                return Err(StoreError::not_found("car", lic));
            }
            let route = s.route.as_deref().ok_or_else(|| {
                StoreError::Conflict(format!("shipment {} has no route", s.shipid))
            })?;
            let lt = inner.lead_times.get(route).ok_or_else(|| {
                StoreError::Conflict(format!("no lead time configured for route {}", route))
            })?;
            staged_cars.push((lic, fdk_carbook::available_date(s.apmdate, lt.leadtime_days)));
            staged_shipments.push(fdk_lifecycle::apply(
                s,
                &Event::DispatcherConfirm {
                    dispatcher: confirmed_by.to_string(),
                },
                now,
            )?);
        }

        for (lic, available) in staged_cars {
            if let Some(car) = inner.cars.get_mut(&lic) {
                car.status = CarStatus::Inactive;
                car.will_be_available_at = Some(available);
            }
        }
        for s in staged_shipments {
            inner.shipments.insert(s.shipid.clone(), s);
        }
        if let Some(r) = inner.rounds.get_mut(&round_id) {
            r.status = RoundStatus::Confirmed;
        }

        Ok(round_with_shipments(&inner, round_id).expect("round exists"))
    }

    async fn vendor_tokens_by_grade(&self, grade: Grade) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .filter_map(|u| {
                let token = active_vendor_token(u)?;
                let vencode = u.vencode_ref.as_deref()?;
                let v = inner.vendors.get(vencode)?;
                (v.active && v.grade == grade).then_some(token)
            })
            .collect())
    }

    async fn vendor_tokens_except(&self, vencode: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .filter(|u| u.vencode_ref.as_deref() != Some(vencode))
            .filter_map(active_vendor_token)
            .collect())
    }

    async fn vendor_tokens_not_of_grade(&self, grade: Grade) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .filter_map(|u| {
                let token = active_vendor_token(u)?;
                let g = vendor_grade(&inner, u.vencode_ref.as_deref()?)?;
                (g != grade).then_some(token)
            })
            .collect())
    }

    async fn dispatcher_tokens(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .filter(|u| u.active && u.role.is_dispatcher())
            .filter_map(|u| u.fcm_token.clone())
            .collect())
    }

    async fn token_for_vencode(&self, vencode: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .filter(|u| u.active && u.vencode_ref.as_deref() == Some(vencode))
            .find_map(|u| u.fcm_token.clone()))
    }
}
