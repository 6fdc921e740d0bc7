//! Axum router and all HTTP handlers.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers. Handlers are `pub(crate)` and generic over
//! the store so the scenario tests in `tests/` compose the router directly
//! against the in-memory store.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveTime, Utc};

use fdk_db::{DispatchStore, NewRound, ShipmentFilter};
use fdk_schemas::{DocStat, Role};

use crate::{
    api_types::{
        parse_round_time, AssignAllQuery, ConfirmBody, CreateRoundBody, HealthResponse,
        HeldQuery, HoldBody, ManualAssignBody, RejectBody, RoundsQuery, SaveDayBody,
        ShipmentActionBody, ShipmentWithDetails, ShipmentsQuery, UnassignedQuery,
    },
    error::ApiError,
    identity::Identity,
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router<S: DispatchStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/v1/health", get(health::<S>))
        .route("/v1/shipments", get(list_shipments::<S>))
        .route("/v1/shipments/unassigned", get(list_unassigned::<S>))
        .route("/v1/shipments/held", get(list_held::<S>))
        .route("/v1/shipments/my-orders", get(my_orders::<S>))
        .route("/v1/shipments/my-history", get(my_history::<S>))
        .route("/v1/shipments/request-booking", post(request_booking::<S>))
        .route("/v1/shipments/confirm", post(confirm_shipment::<S>))
        .route("/v1/shipments/reject", post(reject_shipment::<S>))
        .route("/v1/shipments/manual-assign", post(manual_assign::<S>))
        .route("/v1/shipments/:shipid", get(get_shipment::<S>))
        .route("/v1/shipments/:shipid/hold", post(hold_shipment::<S>))
        .route(
            "/v1/booking-rounds",
            get(list_rounds::<S>).post(create_round::<S>),
        )
        .route(
            "/v1/booking-rounds/pending-confirmation",
            get(pending_confirmation::<S>),
        )
        .route("/v1/booking-rounds/save-for-day", post(save_for_day::<S>))
        .route("/v1/booking-rounds/:round_id", get(get_round::<S>))
        .route("/v1/booking-rounds/:round_id/assign-all", post(assign_all::<S>))
        .route("/v1/booking-rounds/:round_id/allocate", post(allocate::<S>))
        .route(
            "/v1/booking-rounds/:round_id/confirm-assignment",
            post(confirm_assignment::<S>),
        )
        .route("/v1/master/warehouses", get(master_warehouses::<S>))
        .route("/v1/master/booking-rounds", get(master_booking_rounds::<S>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub(crate) async fn health<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// Shipment reads
// ---------------------------------------------------------------------------

/// Role-aware listing: dispatchers see the filtered board, vendors see the
/// work available to their grade.
pub(crate) async fn list_shipments<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(q): Query<ShipmentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if identity.role == Role::Vendor {
        let vencode = identity.require_vendor()?;
        let vendor = st
            .store
            .get_vendor(vencode)
            .await?
            .ok_or_else(|| ApiError::forbidden("unknown vendor account"))?;
        let shipments = st.store.list_for_vendor(vendor.grade, vencode).await?;
        return Ok(Json(shipments));
    }

    identity.require_dispatcher()?;
    let docstat = q
        .docstat
        .as_deref()
        .map(DocStat::parse)
        .transpose()
        .map_err(|e| ApiError::invalid(e.to_string()))?;
    let filter = ShipmentFilter {
        docstat,
        vencode: q.vencode,
        apmdate_from: q.apmdate_from,
        apmdate_to: q.apmdate_to,
        is_on_hold: q.is_on_hold,
    };
    Ok(Json(st.store.list_shipments(&filter).await?))
}

pub(crate) async fn list_unassigned<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(q): Query<UnassignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_dispatcher()?;
    let shipments = st
        .store
        .list_unassigned(q.apmdate, q.shippoint.as_deref())
        .await?;
    Ok(Json(shipments))
}

pub(crate) async fn list_held<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(q): Query<HeldQuery>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_dispatcher()?;
    Ok(Json(st.store.list_held(q.shippoint.as_deref()).await?))
}

pub(crate) async fn my_orders<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let vencode = match identity.role {
        Role::Vendor => Some(identity.require_vendor()?.to_string()),
        _ => None,
    };
    Ok(Json(st.store.list_ongoing(vencode.as_deref()).await?))
}

pub(crate) async fn my_history<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let vencode = match identity.role {
        Role::Vendor => Some(identity.require_vendor()?.to_string()),
        _ => None,
    };
    Ok(Json(st.store.list_history(vencode.as_deref()).await?))
}

pub(crate) async fn get_shipment<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    _identity: Identity,
    Path(shipid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let shipment = st
        .store
        .get_shipment(&shipid)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("shipment {} not found", shipid)))?;
    let details = st.store.list_details(&shipid).await?;
    Ok(Json(ShipmentWithDetails { shipment, details }))
}

// ---------------------------------------------------------------------------
// Shipment actions
// ---------------------------------------------------------------------------

pub(crate) async fn request_booking<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(body): Json<ShipmentActionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let dispatcher = identity.require_dispatcher()?;
    let shipment = st
        .dispatch
        .request_booking(&body.shipid, dispatcher, Utc::now())
        .await?;
    Ok(Json(shipment))
}

pub(crate) async fn confirm_shipment<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(body): Json<ConfirmBody>,
) -> Result<impl IntoResponse, ApiError> {
    let vencode = identity.require_vendor()?;
    let shipment = st
        .dispatch
        .vendor_confirm(vencode, &body.shipid, &body.carlicense, body.carnote, Utc::now())
        .await?;
    Ok(Json(shipment))
}

pub(crate) async fn reject_shipment<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(body): Json<RejectBody>,
) -> Result<impl IntoResponse, ApiError> {
    let vencode = identity.require_vendor()?;
    let shipment = st
        .dispatch
        .vendor_reject(vencode, &body.shipid, &body.rejection_reason, Utc::now())
        .await?;
    Ok(Json(shipment))
}

pub(crate) async fn manual_assign<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(body): Json<ManualAssignBody>,
) -> Result<impl IntoResponse, ApiError> {
    let dispatcher = identity.require_dispatcher()?;
    let shipment = st
        .dispatch
        .manual_assign(&body.shipid, &body.vencode, dispatcher, Utc::now())
        .await?;
    Ok(Json(shipment))
}

pub(crate) async fn hold_shipment<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(shipid): Path<String>,
    Json(body): Json<HoldBody>,
) -> Result<impl IntoResponse, ApiError> {
    let dispatcher = identity.require_dispatcher()?;
    let shipment = st
        .dispatch
        .set_hold(&shipid, body.hold, dispatcher, Utc::now())
        .await?;
    Ok(Json(shipment))
}

// ---------------------------------------------------------------------------
// Booking rounds
// ---------------------------------------------------------------------------

pub(crate) async fn list_rounds<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    _identity: Identity,
    Query(q): Query<RoundsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(st.rounds.get_rounds(q.round_date, &q.warehouse_code).await?))
}

pub(crate) async fn get_round<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    _identity: Identity,
    Path(round_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(st.rounds.get_round(round_id).await?))
}

pub(crate) async fn pending_confirmation<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_dispatcher()?;
    Ok(Json(st.rounds.pending_confirmation().await?))
}

pub(crate) async fn create_round<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(body): Json<CreateRoundBody>,
) -> Result<impl IntoResponse, ApiError> {
    let dispatcher = identity.require_dispatcher()?;
    let round_time = parse_round_time(&body.round_time)?;
    let round = st
        .rounds
        .create_round(
            NewRound {
                round_name: body.round_name,
                round_date: body.round_date,
                round_time,
                warehouse_code: body.warehouse_code,
                total_volume_cbm: body.total_volume_cbm,
                created_by: dispatcher.to_string(),
            },
            &body.shipment_ids,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(round)))
}

pub(crate) async fn save_for_day<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(body): Json<SaveDayBody>,
) -> Result<impl IntoResponse, ApiError> {
    let dispatcher = identity.require_dispatcher()?;
    let times: Vec<NaiveTime> = body
        .round_times
        .iter()
        .map(|s| parse_round_time(s))
        .collect::<Result<_, _>>()?;
    let rounds = st
        .rounds
        .save_day(body.round_date, &body.warehouse_code, &times, dispatcher, Utc::now())
        .await?;
    Ok(Json(rounds))
}

pub(crate) async fn assign_all<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(round_id): Path<i64>,
    Query(q): Query<AssignAllQuery>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_dispatcher()?;
    let round = st
        .rounds
        .assign_all_ready(round_id, q.crdate, &q.shippoint, Utc::now())
        .await?;
    Ok(Json(round))
}

pub(crate) async fn allocate<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(round_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_dispatcher()?;
    let round = st
        .rounds
        .allocate(round_id, &st.quota_shares, Utc::now())
        .await?;
    Ok(Json(round))
}

pub(crate) async fn confirm_assignment<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(round_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let dispatcher = identity.require_dispatcher()?;
    let round = st
        .rounds
        .confirm_round(round_id, dispatcher, Utc::now())
        .await?;
    Ok(Json(round))
}

// ---------------------------------------------------------------------------
// Master data
// ---------------------------------------------------------------------------

pub(crate) async fn master_warehouses<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    _identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(st.store.list_warehouses().await?))
}

pub(crate) async fn master_booking_rounds<S: DispatchStore>(
    State(st): State<Arc<AppState<S>>>,
    _identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(st.store.list_master_rounds().await?))
}
