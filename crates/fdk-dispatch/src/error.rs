//! Boundary error taxonomy.

use fdk_carbook::ReserveError;
use fdk_db::StoreError;
use fdk_lifecycle::TransitionError;

/// Error kinds surfaced to callers of the service layer. The HTTP layer
/// maps these one-to-one onto status codes; nothing below this level is
/// ever swallowed.
#[derive(Debug)]
pub enum DispatchError {
    NotFound(String),
    Forbidden(String),
    /// A lifecycle precondition failed (e.g. confirming a shipment that is
    /// no longer offered). The expected outcome of losing a race.
    StateConflict(String),
    /// A resource conflict outside the state machine: car unavailable,
    /// shipment already in a round, data inconsistency.
    Conflict(String),
    InvalidInput(String),
    /// Infrastructure failure; the caller should retry.
    Internal(anyhow::Error),
}

impl DispatchError {
    /// Stable machine-readable kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NotFound(_) => "not_found",
            DispatchError::Forbidden(_) => "forbidden",
            DispatchError::StateConflict(_) => "state_conflict",
            DispatchError::Conflict(_) => "conflict",
            DispatchError::InvalidInput(_) => "invalid_input",
            DispatchError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::NotFound(msg)
            | DispatchError::Forbidden(msg)
            | DispatchError::StateConflict(msg)
            | DispatchError::Conflict(msg)
            | DispatchError::InvalidInput(msg) => f.write_str(msg),
            DispatchError::Internal(e) => write!(f, "internal error: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => {
                DispatchError::NotFound(format!("{} {} not found", kind, id))
            }
            // Holding a shipment that already sits in a round is a request
            // shape problem, not a race.
            StoreError::Transition(TransitionError::InRound) => DispatchError::InvalidInput(
                "cannot hold a shipment that is assigned to a booking round".to_string(),
            ),
            StoreError::Transition(t) => DispatchError::StateConflict(t.to_string()),
            StoreError::Car(ReserveError::NotFound { carlicense }) => {
                DispatchError::NotFound(format!("car {} not found", carlicense))
            }
            StoreError::Car(c) => DispatchError::Conflict(c.to_string()),
            StoreError::Conflict(msg) => DispatchError::Conflict(msg),
            StoreError::Db(e) => DispatchError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdk_schemas::DocStat;

    #[test]
    fn store_errors_map_onto_the_boundary_taxonomy() {
        let nf: DispatchError = StoreError::not_found("shipment", "SH404").into();
        assert_eq!(nf.kind(), "not_found");
        assert_eq!(nf.to_string(), "shipment SH404 not found");

        let sc: DispatchError = StoreError::Transition(TransitionError::Illegal {
            from: DocStat::VendorConfirmed,
            event: "vendor_confirm",
        })
        .into();
        assert_eq!(sc.kind(), "state_conflict");

        let inv: DispatchError = StoreError::Transition(TransitionError::InRound).into();
        assert_eq!(inv.kind(), "invalid_input");

        let busy: DispatchError = StoreError::Car(ReserveError::Busy {
            carlicense: "XX-111".into(),
        })
        .into();
        assert_eq!(busy.kind(), "conflict");

        let car_nf: DispatchError = StoreError::Car(ReserveError::NotFound {
            carlicense: "XX-404".into(),
        })
        .into();
        assert_eq!(car_nf.kind(), "not_found");
    }
}
