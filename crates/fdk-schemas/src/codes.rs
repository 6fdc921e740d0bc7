//! String-code enums shared across the system.
//!
//! `docstat` and friends are persisted as short character codes; every enum
//! here round-trips through `as_str` / `parse` so the database layer, the
//! HTTP layer and the tests all agree on the wire form.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CodeParseError
// ---------------------------------------------------------------------------

/// Returned when a persisted or user-supplied code does not match any known
/// variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeParseError {
    /// Which code family was being parsed ("docstat", "grade", ...).
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for CodeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} code: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for CodeParseError {}

fn bad(kind: &'static str, value: &str) -> CodeParseError {
    CodeParseError {
        kind,
        value: value.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Grade
// ---------------------------------------------------------------------------

/// Vendor tier. `A` ranks first; the derived ordering is the allocation
/// priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::A, Grade::B, Grade::C, Grade::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CodeParseError> {
        match s {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            other => Err(bad("grade", other)),
        }
    }

    /// Index into per-grade arrays (`A` = 0 .. `D` = 3).
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DocStat
// ---------------------------------------------------------------------------

/// Shipment lifecycle state, persisted as a 2-char code.
///
/// Main line: `01 → 02 → 03 → 04`. Side states: `BC` (open broadcast),
/// `RJ` (rejected by all, legacy), `06` (canceled), `HD` (held or parked).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocStat {
    /// `01` — waiting to be grouped into a booking round.
    #[serde(rename = "01")]
    WaitingRound,
    /// `02` — offered to a specific grade, waiting for a vendor to confirm.
    #[serde(rename = "02")]
    WaitingVendor,
    /// `03` — a vendor confirmed with a specific truck.
    #[serde(rename = "03")]
    VendorConfirmed,
    /// `04` — dispatcher finalized the assignment. Terminal.
    #[serde(rename = "04")]
    DispatcherAssigned,
    /// `06` — canceled by a dispatcher. Terminal.
    #[serde(rename = "06")]
    Canceled,
    /// `BC` — open offer: any vendor that has not rejected may claim it.
    #[serde(rename = "BC")]
    Broadcast,
    /// `RJ` — rejected by every grade. Terminal (legacy rows only).
    #[serde(rename = "RJ")]
    RejectedAll,
    /// `HD` — held by a dispatcher, or parked awaiting dispatcher attention.
    #[serde(rename = "HD")]
    OnHold,
}

impl DocStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStat::WaitingRound => "01",
            DocStat::WaitingVendor => "02",
            DocStat::VendorConfirmed => "03",
            DocStat::DispatcherAssigned => "04",
            DocStat::Canceled => "06",
            DocStat::Broadcast => "BC",
            DocStat::RejectedAll => "RJ",
            DocStat::OnHold => "HD",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CodeParseError> {
        match s {
            "01" => Ok(DocStat::WaitingRound),
            "02" => Ok(DocStat::WaitingVendor),
            "03" => Ok(DocStat::VendorConfirmed),
            "04" => Ok(DocStat::DispatcherAssigned),
            "06" => Ok(DocStat::Canceled),
            "BC" => Ok(DocStat::Broadcast),
            "RJ" => Ok(DocStat::RejectedAll),
            "HD" => Ok(DocStat::OnHold),
            other => Err(bad("docstat", other)),
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocStat::DispatcherAssigned | DocStat::Canceled | DocStat::RejectedAll
        )
    }
}

impl std::fmt::Display for DocStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// System user role. Admins carry dispatcher permissions everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Dispatcher,
    Vendor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Dispatcher => "dispatcher",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CodeParseError> {
        match s {
            "dispatcher" => Ok(Role::Dispatcher),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            other => Err(bad("role", other)),
        }
    }

    pub fn is_dispatcher(&self) -> bool {
        matches!(self, Role::Dispatcher | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CarStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarStatus {
    Active,
    Inactive,
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Active => "active",
            CarStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CodeParseError> {
        match s {
            "active" => Ok(CarStatus::Active),
            "inactive" => Ok(CarStatus::Inactive),
            other => Err(bad("car status", other)),
        }
    }
}

impl std::fmt::Display for CarStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RoundStatus
// ---------------------------------------------------------------------------

/// Advisory round state for the dispatcher UI. Shipment `docstat` remains
/// authoritative; this never guards a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Allocated,
    Confirmed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Pending => "pending",
            RoundStatus::Allocated => "allocated",
            RoundStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CodeParseError> {
        match s {
            "pending" => Ok(RoundStatus::Pending),
            "allocated" => Ok(RoundStatus::Allocated),
            "confirmed" => Ok(RoundStatus::Confirmed),
            other => Err(bad("round status", other)),
        }
    }
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QuotaShares
// ---------------------------------------------------------------------------

/// Per-grade allocation shares for grades A, B and C; grade D always takes
/// the remainder, so only three fractions are configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaShares {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for QuotaShares {
    fn default() -> Self {
        Self {
            a: 0.40,
            b: 0.30,
            c: 0.20,
        }
    }
}

impl QuotaShares {
    /// Parse a `"0.40,0.30,0.20"` style triple. Each share must lie in
    /// `[0, 1]` and the sum must not exceed 1.
    pub fn parse(s: &str) -> Result<Self, CodeParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(bad("quota shares", s));
        }
        let mut vals = [0f64; 3];
        for (i, p) in parts.iter().enumerate() {
            let v: f64 = p.parse().map_err(|_| bad("quota shares", s))?;
            if !(0.0..=1.0).contains(&v) {
                return Err(bad("quota shares", s));
            }
            vals[i] = v;
        }
        if vals.iter().sum::<f64>() > 1.0 + 1e-9 {
            return Err(bad("quota shares", s));
        }
        Ok(Self {
            a: vals[0],
            b: vals[1],
            c: vals[2],
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docstat_round_trips() {
        for code in ["01", "02", "03", "04", "06", "BC", "RJ", "HD"] {
            assert_eq!(DocStat::parse(code).unwrap().as_str(), code);
        }
        assert!(DocStat::parse("05").is_err());
        assert!(DocStat::parse("").is_err());
    }

    #[test]
    fn docstat_terminal_states() {
        assert!(DocStat::DispatcherAssigned.is_terminal());
        assert!(DocStat::Canceled.is_terminal());
        assert!(DocStat::RejectedAll.is_terminal());
        assert!(!DocStat::Broadcast.is_terminal());
        assert!(!DocStat::OnHold.is_terminal());
    }

    #[test]
    fn grade_order_is_priority_order() {
        assert!(Grade::A < Grade::B);
        assert!(Grade::B < Grade::C);
        assert!(Grade::C < Grade::D);
        assert_eq!(Grade::A.index(), 0);
        assert_eq!(Grade::D.index(), 3);
    }

    #[test]
    fn role_admin_counts_as_dispatcher() {
        assert!(Role::Admin.is_dispatcher());
        assert!(Role::Dispatcher.is_dispatcher());
        assert!(!Role::Vendor.is_dispatcher());
    }

    #[test]
    fn quota_shares_parse() {
        let q = QuotaShares::parse("0.40,0.30,0.20").unwrap();
        assert_eq!(q, QuotaShares::default());
        assert!(QuotaShares::parse("0.5,0.5").is_err());
        assert!(QuotaShares::parse("0.6,0.6,0.2").is_err());
        assert!(QuotaShares::parse("a,b,c").is_err());
        assert!(QuotaShares::parse("-0.1,0.3,0.2").is_err());
    }
}
