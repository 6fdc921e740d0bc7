//! Persistence layer.
//!
//! [`DispatchStore`] is the seam every service and handler is written
//! against; [`PgStore`] is the production implementation. The in-memory
//! implementation used by tests lives in `fdk-testkit`.
//!
//! Concurrency contract (both implementations):
//! - every mutator is one transaction;
//! - multi-entity mutators take locks in the fixed order
//!   round → shipments (shipid ascending) → cars (carlicense ascending);
//! - lifecycle transitions re-run the pure state machine *under* the row
//!   lock, so losing a race yields [`StoreError::Transition`] instead of a
//!   lost update.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use fdk_carbook::ReserveError;
use fdk_lifecycle::TransitionError;
use fdk_schemas::DocStat;

pub mod pg;
pub mod store;

pub use pg::PgStore;
pub use store::DispatchStore;

// ---------------------------------------------------------------------------
// Connection helpers
// ---------------------------------------------------------------------------

/// Connect to Postgres.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failure classification surfaced by every store operation. The service
/// layer translates these into boundary errors one-to-one.
#[derive(Debug)]
pub enum StoreError {
    /// Entity lookup failed. `kind` names the entity family.
    NotFound { kind: &'static str, id: String },
    /// The lifecycle state machine refused the transition.
    Transition(TransitionError),
    /// The car could not be reserved.
    Car(ReserveError),
    /// A non-lifecycle consistency violation (missing lead time, shipment
    /// mutated mid-allocation, ...).
    Conflict(String),
    /// Database-level failure; callers may retry.
    Db(anyhow::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound { kind, id } => write!(f, "{} {} not found", kind, id),
            StoreError::Transition(e) => write!(f, "{}", e),
            StoreError::Car(e) => write!(f, "{}", e),
            StoreError::Conflict(msg) => write!(f, "{}", msg),
            StoreError::Db(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Transition(e) => Some(e),
            StoreError::Car(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransitionError> for StoreError {
    fn from(e: TransitionError) -> Self {
        StoreError::Transition(e)
    }
}

impl From<ReserveError> for StoreError {
    fn from(e: ReserveError) -> Self {
        StoreError::Car(e)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Db(anyhow::Error::new(e))
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Db(e)
    }
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// Row for shipment creation; lifecycle fields start at their `WaitingRound`
/// defaults.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub shipid: String,
    pub customer_name: Option<String>,
    pub shippoint: String,
    pub route: Option<String>,
    pub cartype: String,
    pub volume_cbm: Option<f64>,
    pub apmdate: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRound {
    pub round_name: String,
    pub round_date: NaiveDate,
    pub round_time: NaiveTime,
    pub warehouse_code: String,
    pub total_volume_cbm: Option<f64>,
    pub created_by: String,
}

/// Dispatcher-side shipment listing filter; every field is optional and
/// conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ShipmentFilter {
    pub docstat: Option<DocStat>,
    pub vencode: Option<String>,
    pub apmdate_from: Option<DateTime<Utc>>,
    pub apmdate_to: Option<DateTime<Utc>>,
    pub is_on_hold: Option<bool>,
}
