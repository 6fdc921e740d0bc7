//! fdk-schemas
//!
//! Shared domain and wire types for the FreightDesk dispatch system.
//! Everything here is plain data: serde-serializable structs and string-code
//! enums. No IO, no business logic beyond code round-tripping and small
//! predicates used identically by every store implementation.

pub mod codes;
pub mod entities;

pub use codes::{CarStatus, CodeParseError, DocStat, Grade, QuotaShares, Role, RoundStatus};
pub use entities::{
    BookingRound, Car, LeadTime, MasterRound, RoundWithShipments, Shipment, ShipmentDetail, User,
    Vendor, Warehouse,
};
