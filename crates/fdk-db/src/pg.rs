//! PostgreSQL implementation of [`DispatchStore`].
//!
//! Queries are runtime `sqlx::query` calls with manual row mapping; no
//! compile-time checked macros, so the crate builds without a live
//! database. Optional filters are expressed as `($n IS NULL OR col = $n)`
//! so every statement stays static.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use fdk_allocate::AllocationPlan;
use fdk_lifecycle::Event;
use fdk_schemas::{
    BookingRound, Car, CarStatus, DocStat, Grade, LeadTime, MasterRound, RoundStatus,
    RoundWithShipments, Shipment, ShipmentDetail, Vendor, Warehouse,
};

use crate::store::DispatchStore;
use crate::{NewRound, NewShipment, ShipmentFilter, StoreError};

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const SHIPMENT_COLS: &str = "shipid, customer_name, shippoint, route, cartype, volume_cbm, \
     apmdate, crdate, chuser, chdate, booking_round_id, docstat, is_on_hold, \
     docstat_before_hold, vencode, carlicense, carnote, current_grade_to_assign, \
     confirmed_by_grade, assigned_at, rejected_by_vencodes";

fn shipment_from_row(row: &PgRow) -> Result<Shipment, anyhow::Error> {
    let docstat: String = row.try_get("docstat")?;
    let before: Option<String> = row.try_get("docstat_before_hold")?;
    let current_grade: Option<String> = row.try_get("current_grade_to_assign")?;
    let confirmed_grade: Option<String> = row.try_get("confirmed_by_grade")?;
    let rejected: Option<sqlx::types::Json<Vec<String>>> = row.try_get("rejected_by_vencodes")?;

    Ok(Shipment {
        shipid: row.try_get("shipid")?,
        customer_name: row.try_get("customer_name")?,
        shippoint: row.try_get("shippoint")?,
        route: row.try_get("route")?,
        cartype: row.try_get("cartype")?,
        volume_cbm: row.try_get("volume_cbm")?,
        apmdate: row.try_get("apmdate")?,
        crdate: row.try_get("crdate")?,
        chuser: row.try_get("chuser")?,
        chdate: row.try_get("chdate")?,
        booking_round_id: row.try_get("booking_round_id")?,
        docstat: DocStat::parse(&docstat)?,
        is_on_hold: row.try_get("is_on_hold")?,
        docstat_before_hold: before.as_deref().map(DocStat::parse).transpose()?,
        vencode: row.try_get("vencode")?,
        carlicense: row.try_get("carlicense")?,
        carnote: row.try_get("carnote")?,
        current_grade_to_assign: current_grade.as_deref().map(Grade::parse).transpose()?,
        confirmed_by_grade: confirmed_grade.as_deref().map(Grade::parse).transpose()?,
        assigned_at: row.try_get("assigned_at")?,
        rejected_by_vencodes: rejected.map(|j| j.0).unwrap_or_default(),
    })
}

fn vendor_from_row(row: &PgRow) -> Result<Vendor, anyhow::Error> {
    let grade: String = row.try_get("grade")?;
    Ok(Vendor {
        vencode: row.try_get("vencode")?,
        venname: row.try_get("venname")?,
        grade: Grade::parse(&grade)?,
        last_assigned_at: row.try_get("last_assigned_at")?,
        active: row.try_get("active")?,
    })
}

fn car_from_row(row: &PgRow) -> Result<Car, anyhow::Error> {
    let status: String = row.try_get("status")?;
    Ok(Car {
        carlicense: row.try_get("carlicense")?,
        vencode: row.try_get("vencode")?,
        cartype: row.try_get("cartype")?,
        status: CarStatus::parse(&status)?,
        will_be_available_at: row.try_get("will_be_available_at")?,
    })
}

fn round_from_row(row: &PgRow) -> Result<BookingRound, anyhow::Error> {
    let status: String = row.try_get("status")?;
    Ok(BookingRound {
        id: row.try_get("id")?,
        round_name: row.try_get("round_name")?,
        round_date: row.try_get("round_date")?,
        round_time: row.try_get("round_time")?,
        warehouse_code: row.try_get("warehouse_code")?,
        total_volume_cbm: row.try_get("total_volume_cbm")?,
        status: RoundStatus::parse(&status)?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn detail_from_row(row: &PgRow) -> Result<ShipmentDetail, anyhow::Error> {
    Ok(ShipmentDetail {
        doid: row.try_get("doid")?,
        shipid: row.try_get("shipid")?,
        dlvdate: row.try_get("dlvdate")?,
        cusid: row.try_get("cusid")?,
        cusname: row.try_get("cusname")?,
        route: row.try_get("route")?,
        province: row.try_get("province")?,
        volume_cbm: row.try_get("volume_cbm")?,
    })
}

fn map_shipments(rows: Vec<PgRow>) -> Result<Vec<Shipment>, StoreError> {
    rows.iter()
        .map(|r| shipment_from_row(r).map_err(StoreError::from))
        .collect()
}

// ---------------------------------------------------------------------------
// Transaction-scoped helpers
// ---------------------------------------------------------------------------

async fn fetch_shipment_for_update(
    conn: &mut PgConnection,
    shipid: &str,
) -> Result<Option<Shipment>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {SHIPMENT_COLS} FROM shipment WHERE shipid = $1 FOR UPDATE"
    ))
    .bind(shipid)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref()
        .map(shipment_from_row)
        .transpose()
        .map_err(StoreError::from)
}

async fn fetch_car_for_update(
    conn: &mut PgConnection,
    carlicense: &str,
) -> Result<Option<Car>, StoreError> {
    let row = sqlx::query(
        "SELECT carlicense, vencode, cartype, status, will_be_available_at \
         FROM mcar WHERE carlicense = $1 FOR UPDATE",
    )
    .bind(carlicense)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(car_from_row).transpose().map_err(StoreError::from)
}

/// Persist a full shipment row produced by the lifecycle state machine.
async fn update_shipment(conn: &mut PgConnection, s: &Shipment) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE shipment SET \
           customer_name = $2, shippoint = $3, route = $4, cartype = $5, \
           volume_cbm = $6, apmdate = $7, crdate = $8, chuser = $9, chdate = $10, \
           booking_round_id = $11, docstat = $12, is_on_hold = $13, \
           docstat_before_hold = $14, vencode = $15, carlicense = $16, carnote = $17, \
           current_grade_to_assign = $18, confirmed_by_grade = $19, assigned_at = $20, \
           rejected_by_vencodes = $21 \
         WHERE shipid = $1",
    )
    .bind(&s.shipid)
    .bind(&s.customer_name)
    .bind(&s.shippoint)
    .bind(&s.route)
    .bind(&s.cartype)
    .bind(s.volume_cbm)
    .bind(s.apmdate)
    .bind(s.crdate)
    .bind(&s.chuser)
    .bind(s.chdate)
    .bind(s.booking_round_id)
    .bind(s.docstat.as_str())
    .bind(s.is_on_hold)
    .bind(s.docstat_before_hold.map(|d| d.as_str()))
    .bind(&s.vencode)
    .bind(&s.carlicense)
    .bind(&s.carnote)
    .bind(s.current_grade_to_assign.map(|g| g.as_str()))
    .bind(s.confirmed_by_grade.map(|g| g.as_str()))
    .bind(s.assigned_at)
    .bind(sqlx::types::Json(&s.rejected_by_vencodes))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_round_tx(
    conn: &mut PgConnection,
    round_id: i64,
    lock: bool,
) -> Result<Option<BookingRound>, StoreError> {
    let sql = if lock {
        "SELECT id, round_name, round_date, round_time, warehouse_code, total_volume_cbm, \
         status, created_by, created_at FROM booking_round WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, round_name, round_date, round_time, warehouse_code, total_volume_cbm, \
         status, created_by, created_at FROM booking_round WHERE id = $1"
    };
    let row = sqlx::query(sql).bind(round_id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(round_from_row).transpose().map_err(StoreError::from)
}

/// Lock and return a round's shipments, shipid ascending.
async fn fetch_round_shipments_for_update(
    conn: &mut PgConnection,
    round_id: i64,
) -> Result<Vec<Shipment>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {SHIPMENT_COLS} FROM shipment WHERE booking_round_id = $1 \
         ORDER BY shipid FOR UPDATE"
    ))
    .bind(round_id)
    .fetch_all(&mut *conn)
    .await?;
    map_shipments(rows)
}

async fn fetch_round_shipments(
    conn: &mut PgConnection,
    round_id: i64,
) -> Result<Vec<Shipment>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {SHIPMENT_COLS} FROM shipment WHERE booking_round_id = $1 ORDER BY shipid"
    ))
    .bind(round_id)
    .fetch_all(&mut *conn)
    .await?;
    map_shipments(rows)
}

/// Release every held shipment back to its pre-hold state. Side effect of
/// round creation and assign-all, preserved from the source system: the
/// release is global, not scoped to the round's warehouse.
async fn unhold_all(conn: &mut PgConnection, actor: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE shipment SET docstat = docstat_before_hold, docstat_before_hold = NULL, \
           is_on_hold = FALSE, chuser = $1, chdate = $2 \
         WHERE is_on_hold = TRUE AND docstat_before_hold IS NOT NULL",
    )
    .bind(actor)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn mark_round_status(
    conn: &mut PgConnection,
    round_id: i64,
    status: RoundStatus,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE booking_round SET status = $2 WHERE id = $1")
        .bind(round_id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// DispatchStore implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl DispatchStore for PgStore {
    async fn get_shipment(&self, shipid: &str) -> Result<Option<Shipment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment WHERE shipid = $1"
        ))
        .bind(shipid)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref()
            .map(shipment_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list_unassigned(
        &self,
        apmdate: Option<NaiveDate>,
        shippoint: Option<&str>,
    ) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE booking_round_id IS NULL AND is_on_hold = FALSE \
               AND ($1::text IS NULL OR shippoint = $1) \
               AND ($2::date IS NULL OR (apmdate AT TIME ZONE 'UTC')::date = $2) \
             ORDER BY shipid"
        ))
        .bind(shippoint)
        .bind(apmdate)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn list_held(&self, shippoint: Option<&str>) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE is_on_hold = TRUE AND ($1::text IS NULL OR shippoint = $1) \
             ORDER BY shipid"
        ))
        .bind(shippoint)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn list_shipments(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE ($1::text IS NULL OR docstat = $1) \
               AND ($2::text IS NULL OR vencode = $2) \
               AND ($3::timestamptz IS NULL OR apmdate >= $3) \
               AND ($4::timestamptz IS NULL OR apmdate <= $4) \
               AND ($5::boolean IS NULL OR is_on_hold = $5) \
             ORDER BY apmdate DESC, shipid"
        ))
        .bind(filter.docstat.map(|d| d.as_str()))
        .bind(&filter.vencode)
        .bind(filter.apmdate_from)
        .bind(filter.apmdate_to)
        .bind(filter.is_on_hold)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn list_for_vendor(
        &self,
        grade: Grade,
        vencode: &str,
    ) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE (docstat = '02' AND current_grade_to_assign = $1) \
                OR (docstat = 'BC' AND NOT (COALESCE(rejected_by_vencodes, '[]'::jsonb) \
                     @> jsonb_build_array($2::text))) \
             ORDER BY apmdate DESC, shipid"
        ))
        .bind(grade.as_str())
        .bind(vencode)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn list_ongoing(&self, vencode: Option<&str>) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE docstat IN ('03', '04') AND ($1::text IS NULL OR vencode = $1) \
             ORDER BY apmdate ASC, shipid"
        ))
        .bind(vencode)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn list_history(&self, vencode: Option<&str>) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE docstat IN ('06', 'RJ') AND ($1::text IS NULL OR vencode = $1) \
             ORDER BY chdate DESC NULLS LAST, shipid LIMIT 200"
        ))
        .bind(vencode)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn list_details(&self, shipid: &str) -> Result<Vec<ShipmentDetail>, StoreError> {
        let rows = sqlx::query(
            "SELECT doid, shipid, dlvdate, cusid, cusname, route, province, volume_cbm \
             FROM doh WHERE shipid = $1 ORDER BY doid",
        )
        .bind(shipid)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| detail_from_row(r).map_err(StoreError::from))
            .collect()
    }

    async fn list_expired_waiting(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE docstat = '02' AND assigned_at IS NOT NULL AND assigned_at <= $1 \
             ORDER BY shipid"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn list_expired_broadcast(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Shipment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLS} FROM shipment \
             WHERE docstat = 'BC' AND assigned_at IS NOT NULL AND assigned_at <= $1 \
             ORDER BY shipid"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        map_shipments(rows)
    }

    async fn insert_shipment(
        &self,
        new: NewShipment,
        now: DateTime<Utc>,
    ) -> Result<Shipment, StoreError> {
        sqlx::query(
            "INSERT INTO shipment (shipid, customer_name, shippoint, route, cartype, \
               volume_cbm, apmdate, crdate, docstat, is_on_hold, rejected_by_vencodes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '01', FALSE, '[]'::jsonb)",
        )
        .bind(&new.shipid)
        .bind(&new.customer_name)
        .bind(&new.shippoint)
        .bind(&new.route)
        .bind(&new.cartype)
        .bind(new.volume_cbm)
        .bind(new.apmdate)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Shipment {
            shipid: new.shipid,
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
        })
    }

    async fn apply_event(
        &self,
        shipid: &str,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<Shipment, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_shipment_for_update(&mut tx, shipid)
            .await?
            .ok_or_else(|| StoreError::not_found("shipment", shipid))?;

        // Re-run the transition under the lock: the guard sees the freshest
        // committed state, so a concurrent winner turns this into a
        // Transition error rather than a lost update.
        let next = fdk_lifecycle::apply(&current, event, now)?;

        if let Event::VendorConfirm {
            vencode, carlicense, ..
        } = event
        {
            // Car row locks after the shipment row.
            let car = fetch_car_for_update(&mut tx, carlicense).await?;
            fdk_carbook::try_reserve(car.as_ref(), carlicense, vencode, next.apmdate.date_naive())?;
        }

        update_shipment(&mut tx, &next).await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn get_vendor(&self, vencode: &str) -> Result<Option<Vendor>, StoreError> {
        let row = sqlx::query(
            "SELECT vencode, venname, grade, last_assigned_at, active \
             FROM mvendor WHERE vencode = $1",
        )
        .bind(vencode)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(vendor_from_row).transpose().map_err(StoreError::from)
    }

    async fn first_vendor_by_grade(&self, grade: Grade) -> Result<Option<Vendor>, StoreError> {
        let row = sqlx::query(
            "SELECT vencode, venname, grade, last_assigned_at, active \
             FROM mvendor WHERE grade = $1 AND active = TRUE ORDER BY vencode LIMIT 1",
        )
        .bind(grade.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(vendor_from_row).transpose().map_err(StoreError::from)
    }

    async fn list_vendors_with_cars(&self) -> Result<Vec<(Vendor, Vec<Car>)>, StoreError> {
        let vendor_rows = sqlx::query(
            "SELECT vencode, venname, grade, last_assigned_at, active \
             FROM mvendor ORDER BY vencode",
        )
        .fetch_all(&self.pool)
        .await?;
        let car_rows = sqlx::query(
            "SELECT carlicense, vencode, cartype, status, will_be_available_at \
             FROM mcar ORDER BY carlicense",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut vendors: Vec<(Vendor, Vec<Car>)> = Vec::with_capacity(vendor_rows.len());
        for row in &vendor_rows {
            vendors.push((vendor_from_row(row)?, Vec::new()));
        }
        for row in &car_rows {
            let car = car_from_row(row)?;
            if let Some(slot) = vendors.iter_mut().find(|(v, _)| v.vencode == car.vencode) {
                slot.1.push(car);
            }
        }
        Ok(vendors)
    }

    async fn get_car(&self, carlicense: &str) -> Result<Option<Car>, StoreError> {
        let row = sqlx::query(
            "SELECT carlicense, vencode, cartype, status, will_be_available_at \
             FROM mcar WHERE carlicense = $1",
        )
        .bind(carlicense)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(car_from_row).transpose().map_err(StoreError::from)
    }

    async fn get_lead_time(&self, route: &str) -> Result<Option<LeadTime>, StoreError> {
        let row = sqlx::query(
            "SELECT route, routedes, leadtime_days FROM mleadtime WHERE route = $1",
        )
        .bind(route)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(r) => Some(LeadTime {
                route: r.try_get("route").map_err(anyhow::Error::from)?,
                routedes: r.try_get("routedes").map_err(anyhow::Error::from)?,
                leadtime_days: r.try_get("leadtime_days").map_err(anyhow::Error::from)?,
            }),
            None => None,
        })
    }

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let rows = sqlx::query(
            "SELECT code, name, active FROM mwarehouse WHERE active = TRUE ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(Warehouse {
                code: r.try_get("code").map_err(anyhow::Error::from)?,
                name: r.try_get("name").map_err(anyhow::Error::from)?,
                active: r.try_get("active").map_err(anyhow::Error::from)?,
            });
        }
        Ok(out)
    }

    async fn list_master_rounds(&self) -> Result<Vec<MasterRound>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, round_time, round_name, active FROM mbooking_round \
             WHERE active = TRUE ORDER BY round_time",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(MasterRound {
                id: r.try_get("id").map_err(anyhow::Error::from)?,
                round_time: r.try_get("round_time").map_err(anyhow::Error::from)?,
                round_name: r.try_get("round_name").map_err(anyhow::Error::from)?,
                active: r.try_get("active").map_err(anyhow::Error::from)?,
            });
        }
        Ok(out)
    }

    async fn get_round(&self, round_id: i64) -> Result<Option<RoundWithShipments>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let round = match fetch_round_tx(&mut conn, round_id, false).await? {
            Some(r) => r,
            None => return Ok(None),
        };
        let shipments = fetch_round_shipments(&mut conn, round_id).await?;
        Ok(Some(RoundWithShipments { round, shipments }))
    }

    async fn list_rounds(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
    ) -> Result<Vec<RoundWithShipments>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, round_name, round_date, round_time, warehouse_code, total_volume_cbm, \
             status, created_by, created_at FROM booking_round \
             WHERE round_date = $1 AND warehouse_code = $2 ORDER BY round_time, id",
        )
        .bind(round_date)
        .bind(warehouse_code)
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let round = round_from_row(row)?;
            let shipments = fetch_round_shipments(&mut conn, round.id).await?;
            out.push(RoundWithShipments { round, shipments });
        }
        Ok(out)
    }

    async fn list_rounds_pending_confirmation(
        &self,
    ) -> Result<Vec<RoundWithShipments>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT b.id, b.round_name, b.round_date, b.round_time, \
               b.warehouse_code, b.total_volume_cbm, b.status, b.created_by, b.created_at \
             FROM booking_round b JOIN shipment s ON s.booking_round_id = b.id \
             WHERE s.docstat = '03' ORDER BY b.round_date, b.round_time, b.id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let round = round_from_row(row)?;
            let shipments = fetch_round_shipments(&mut conn, round.id).await?;
            out.push(RoundWithShipments { round, shipments });
        }
        Ok(out)
    }

    async fn create_round(
        &self,
        new: NewRound,
        shipment_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "INSERT INTO booking_round (round_name, round_date, round_time, warehouse_code, \
               total_volume_cbm, status, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7) RETURNING id",
        )
        .bind(&new.round_name)
        .bind(new.round_date)
        .bind(new.round_time)
        .bind(&new.warehouse_code)
        .bind(new.total_volume_cbm)
        .bind(&new.created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let round_id: i64 = row.try_get("id").map_err(anyhow::Error::from)?;

        if !shipment_ids.is_empty() {
            // Conditional bulk move: shipments already in a round or on hold
            // are silently skipped. Entering `01` starts a fresh booking
            // cycle, so assignment leftovers and the rejected set clear.
            sqlx::query(
                "UPDATE shipment SET booking_round_id = $1, docstat = '01', \
                   vencode = NULL, carlicense = NULL, carnote = NULL, \
                   confirmed_by_grade = NULL, current_grade_to_assign = NULL, \
                   assigned_at = NULL, rejected_by_vencodes = '[]'::jsonb, \
                   chuser = $2, chdate = $3 \
                 WHERE shipid = ANY($4) AND booking_round_id IS NULL AND is_on_hold = FALSE",
            )
            .bind(round_id)
            .bind(&new.created_by)
            .bind(now)
            .bind(shipment_ids)
            .execute(&mut *tx)
            .await?;
        }

        unhold_all(&mut tx, &new.created_by, now).await?;

        let round = fetch_round_tx(&mut tx, round_id, false)
            .await?
            .ok_or_else(|| StoreError::not_found("booking round", round_id.to_string()))?;
        let shipments = fetch_round_shipments(&mut tx, round_id).await?;

        tx.commit().await?;
        Ok(RoundWithShipments { round, shipments })
    }

    async fn sync_day_rounds(
        &self,
        round_date: NaiveDate,
        warehouse_code: &str,
        round_times: &[NaiveTime],
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingRound>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let old_rows = sqlx::query(
            "SELECT id FROM booking_round \
             WHERE round_date = $1 AND warehouse_code = $2 ORDER BY id FOR UPDATE",
        )
        .bind(round_date)
        .bind(warehouse_code)
        .fetch_all(&mut *tx)
        .await?;
        let mut old_ids = Vec::with_capacity(old_rows.len());
        for r in &old_rows {
            old_ids.push(r.try_get::<i64, _>("id").map_err(anyhow::Error::from)?);
        }

        if !old_ids.is_empty() {
            // Detach before delete; docstat stays as-is.
            sqlx::query(
                "UPDATE shipment SET booking_round_id = NULL WHERE booking_round_id = ANY($1)",
            )
            .bind(&old_ids)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM booking_round WHERE id = ANY($1)")
                .bind(&old_ids)
                .execute(&mut *tx)
                .await?;
        }

        let mut created = Vec::with_capacity(round_times.len());
        for (i, t) in round_times.iter().enumerate() {
            let row = sqlx::query(
                "INSERT INTO booking_round (round_name, round_date, round_time, \
                   warehouse_code, status, created_by, created_at) \
                 VALUES ($1, $2, $3, $4, 'pending', $5, $6) RETURNING id",
            )
            .bind(format!("Round {}", i + 1))
            .bind(round_date)
            .bind(*t)
            .bind(warehouse_code)
            .bind(created_by)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            let id: i64 = row.try_get("id").map_err(anyhow::Error::from)?;
            created.push(BookingRound {
                id,
                round_name: format!("Round {}", i + 1),
                round_date,
                round_time: *t,
                warehouse_code: warehouse_code.to_string(),
                total_volume_cbm: None,
                status: RoundStatus::Pending,
                created_by: created_by.to_string(),
                created_at: now,
            });
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn assign_all_ready(
        &self,
        round_id: i64,
        crdate: NaiveDate,
        shippoint: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut tx = self.pool.begin().await?;

        let round = fetch_round_tx(&mut tx, round_id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("booking round", round_id.to_string()))?;

        sqlx::query(
            "UPDATE shipment SET booking_round_id = $1, docstat = '01', \
               vencode = NULL, carlicense = NULL, carnote = NULL, \
               confirmed_by_grade = NULL, current_grade_to_assign = NULL, \
               assigned_at = NULL, rejected_by_vencodes = '[]'::jsonb, \
               chuser = $2, chdate = $3 \
             WHERE booking_round_id IS NULL AND is_on_hold = FALSE \
               AND shippoint = $4 AND (crdate AT TIME ZONE 'UTC')::date = $5",
        )
        .bind(round_id)
        .bind(&round.created_by)
        .bind(now)
        .bind(shippoint)
        .bind(crdate)
        .execute(&mut *tx)
        .await?;

        unhold_all(&mut tx, &round.created_by, now).await?;

        let shipments = fetch_round_shipments(&mut tx, round_id).await?;
        tx.commit().await?;
        Ok(RoundWithShipments { round, shipments })
    }

    async fn apply_allocation(
        &self,
        round_id: i64,
        plan: &AllocationPlan,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut round = fetch_round_tx(&mut tx, round_id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("booking round", round_id.to_string()))?;

        let locked = fetch_round_shipments_for_update(&mut tx, round_id).await?;
        let by_id: std::collections::HashMap<&str, &Shipment> =
            locked.iter().map(|s| (s.shipid.as_str(), s)).collect();

        for pa in &plan.assignments {
            let current = by_id.get(pa.shipid.as_str()).ok_or_else(|| {
                StoreError::Conflict(format!(
                    "shipment {} left round {} during allocation",
                    pa.shipid, round_id
                ))
            })?;
            let next = fdk_lifecycle::apply(
                current,
                &Event::AllocatorAssign {
                    vencode: pa.vencode.clone(),
                    grade: pa.grade,
                },
                now,
            )?;
            update_shipment(&mut tx, &next).await?;
        }

        for shipid in &plan.parked {
            let current = by_id.get(shipid.as_str()).ok_or_else(|| {
                StoreError::Conflict(format!(
                    "shipment {} left round {} during allocation",
                    shipid, round_id
                ))
            })?;
            let next = fdk_lifecycle::apply(current, &Event::AllocatorPark, now)?;
            update_shipment(&mut tx, &next).await?;
        }

        // Fairness bookkeeping, vencode ascending.
        let mut assigned_vendors: Vec<&str> = plan
            .assignments
            .iter()
            .map(|a| a.vencode.as_str())
            .collect();
        assigned_vendors.sort_unstable();
        assigned_vendors.dedup();
        for vencode in assigned_vendors {
            sqlx::query("UPDATE mvendor SET last_assigned_at = $2 WHERE vencode = $1")
                .bind(vencode)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        mark_round_status(&mut tx, round_id, RoundStatus::Allocated).await?;
        round.status = RoundStatus::Allocated;

        let shipments = fetch_round_shipments(&mut tx, round_id).await?;
        tx.commit().await?;
        Ok(RoundWithShipments { round, shipments })
    }

    async fn confirm_round(
        &self,
        round_id: i64,
        confirmed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundWithShipments, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut round = fetch_round_tx(&mut tx, round_id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("booking round", round_id.to_string()))?;

        let locked = fetch_round_shipments_for_update(&mut tx, round_id).await?;
        let to_confirm: Vec<&Shipment> = locked
            .iter()
            .filter(|s| s.docstat == DocStat::VendorConfirmed)
            .collect();

        // Car rows lock after the shipment rows, carlicense ascending.
        let mut licenses: Vec<&str> = Vec::new();
        for s in &to_confirm {
            let lic = s.carlicense.as_deref().ok_or_else(|| {
                StoreError::Conflict(format!("shipment {} has no reserved car", s.shipid))
            })?;
            licenses.push(lic);
        }
        licenses.sort_unstable();
        licenses.dedup();
        for lic in &licenses {
            fetch_car_for_update(&mut tx, lic)
                .await?
                .ok_or_else(|| StoreError::not_found("car", *lic))?;
        }

        for s in &to_confirm {
            let route = s.route.as_deref().ok_or_else(|| {
                StoreError::Conflict(format!("shipment {} has no route", s.shipid))
            })?;
            let lt_row = sqlx::query("SELECT leadtime_days FROM mleadtime WHERE route = $1")
                .bind(route)
                .fetch_optional(&mut *tx)
                .await?;
            let leadtime_days: i64 = lt_row
                .ok_or_else(|| {
                    StoreError::Conflict(format!("no lead time configured for route {}", route))
                })?
                .try_get("leadtime_days")
                .map_err(anyhow::Error::from)?;

            let available = fdk_carbook::available_date(s.apmdate, leadtime_days);
            // Idempotent per (shipid, carlicense): re-running writes the
            // same status and date.
            sqlx::query(
                "UPDATE mcar SET status = 'inactive', will_be_available_at = $2 \
                 WHERE carlicense = $1",
            )
            .bind(s.carlicense.as_deref())
            .bind(available)
            .execute(&mut *tx)
            .await?;

            let next = fdk_lifecycle::apply(
                s,
                &Event::DispatcherConfirm {
                    dispatcher: confirmed_by.to_string(),
                },
                now,
            )?;
            update_shipment(&mut tx, &next).await?;
        }

        mark_round_status(&mut tx, round_id, RoundStatus::Confirmed).await?;
        round.status = RoundStatus::Confirmed;

        let shipments = fetch_round_shipments(&mut tx, round_id).await?;
        tx.commit().await?;
        Ok(RoundWithShipments { round, shipments })
    }

    async fn vendor_tokens_by_grade(&self, grade: Grade) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT u.fcm_token FROM system_users u \
             JOIN mvendor v ON u.vencode_ref = v.vencode \
             WHERE u.role = 'vendor' AND u.active = TRUE AND u.fcm_token IS NOT NULL \
               AND v.active = TRUE AND v.grade = $1 \
             ORDER BY u.username",
        )
        .bind(grade.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect_tokens(rows)
    }

    async fn vendor_tokens_except(&self, vencode: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT u.fcm_token FROM system_users u \
             WHERE u.role = 'vendor' AND u.active = TRUE AND u.fcm_token IS NOT NULL \
               AND u.vencode_ref IS DISTINCT FROM $1 \
             ORDER BY u.username",
        )
        .bind(vencode)
        .fetch_all(&self.pool)
        .await?;
        collect_tokens(rows)
    }

    async fn vendor_tokens_not_of_grade(&self, grade: Grade) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT u.fcm_token FROM system_users u \
             JOIN mvendor v ON u.vencode_ref = v.vencode \
             WHERE u.role = 'vendor' AND u.active = TRUE AND u.fcm_token IS NOT NULL \
               AND v.active = TRUE AND v.grade <> $1 \
             ORDER BY u.username",
        )
        .bind(grade.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect_tokens(rows)
    }

    async fn dispatcher_tokens(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT fcm_token FROM system_users \
             WHERE role IN ('dispatcher', 'admin') AND active = TRUE \
               AND fcm_token IS NOT NULL \
             ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;
        collect_tokens(rows)
    }

    async fn token_for_vencode(&self, vencode: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT fcm_token FROM system_users \
             WHERE vencode_ref = $1 AND active = TRUE AND fcm_token IS NOT NULL \
             ORDER BY username LIMIT 1",
        )
        .bind(vencode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(r) => r.try_get("fcm_token").map_err(anyhow::Error::from)?,
            None => None,
        })
    }
}

fn collect_tokens(rows: Vec<PgRow>) -> Result<Vec<String>, StoreError> {
    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        let token: Option<String> = r.try_get("fcm_token").map_err(anyhow::Error::from)?;
        if let Some(t) = token {
            out.push(t);
        }
    }
    Ok(out)
}
