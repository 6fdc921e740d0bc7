//! Dispatch services: every externally triggered operation on shipments and
//! booking rounds.
//!
//! [`DispatchService`] wraps single-shipment lifecycle actions;
//! [`RoundService`] owns round CRUD, day synchronization, allocation and
//! round confirmation. Both are generic over the store seam so scenario
//! tests drive them against the in-memory store.
//!
//! The flow of every action is the same: translate the request into one
//! lifecycle event or one transactional store operation, let the store
//! apply it under its locks, then fan out push notifications. Notification
//! delivery is best-effort and happens strictly after the store work
//! committed — a dead push service can never roll back dispatch state.

mod error;
mod rounds;
mod service;

pub use error::DispatchError;
pub use rounds::RoundService;
pub use service::DispatchService;
