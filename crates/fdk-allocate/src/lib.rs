//! Round allocator (pure, no IO, no store).
//!
//! Responsibilities:
//! - Split a round of N shipments into per-grade quotas.
//! - Rank eligible vendors for each shipment.
//! - Produce an [`AllocationPlan`]: `(shipment, vendor, grade)` assignments
//!   plus the shipments that could not be placed and go to dispatcher
//!   attention.
//!
//! The planner never talks to the database; callers snapshot vendors and
//! shipments, and the store applies the returned plan in one transaction.
//! Given the same inputs in the same order the plan is identical — there is
//! no wall clock and no randomness in here.
//!
//! # Algorithm
//!
//! 1. `QuotaVector::split(N)`: `q_A = ⌊a·N⌋`, `q_B = ⌊b·N⌋`, `q_C = ⌊c·N⌋`,
//!    `q_D` takes the remainder.
//! 2. Per shipment, in the callers' order (shipid ascending): collect
//!    eligible vendors — active, owning at least one active car of the
//!    shipment's cartype.
//! 3. Rank candidates by grade, then how recently they were assigned
//!    (never-assigned first; vendors assigned earlier in this same plan sort
//!    after vendors assigned in previous runs), then vencode.
//! 4. Walk the ranking; the first candidate whose grade still has quota
//!    takes the shipment. No candidate → the shipment is parked.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use fdk_schemas::{Car, CarStatus, Grade, QuotaShares, Vendor};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The slice of a shipment the planner needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentReq {
    pub shipid: String,
    pub cartype: String,
}

/// A vendor plus the cartypes of its active cars.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorSnapshot {
    pub vencode: String,
    pub grade: Grade,
    pub active: bool,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub cartypes: BTreeSet<String>,
}

impl VendorSnapshot {
    /// Build a snapshot from a vendor row and its cars; only active cars
    /// contribute cartypes.
    pub fn new(vendor: &Vendor, cars: &[Car]) -> Self {
        let cartypes = cars
            .iter()
            .filter(|c| c.status == CarStatus::Active)
            .map(|c| c.cartype.clone())
            .collect();
        Self {
            vencode: vendor.vencode.clone(),
            grade: vendor.grade,
            active: vendor.active,
            last_assigned_at: vendor.last_assigned_at,
            cartypes,
        }
    }

    fn eligible_for(&self, cartype: &str) -> bool {
        self.active && self.cartypes.contains(cartype)
    }
}

// ---------------------------------------------------------------------------
// QuotaVector
// ---------------------------------------------------------------------------

/// Absolute per-grade caps for one allocation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaVector {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
}

impl QuotaVector {
    /// Distribute `n` shipments across grades using floor shares for A, B
    /// and C; grade D takes whatever remains.
    pub fn split(n: usize, shares: &QuotaShares) -> Self {
        let a = (shares.a * n as f64).floor() as usize;
        let b = (shares.b * n as f64).floor() as usize;
        let c = (shares.c * n as f64).floor() as usize;
        Self {
            a,
            b,
            c,
            d: n - a - b - c,
        }
    }

    pub fn for_grade(&self, grade: Grade) -> usize {
        match grade {
            Grade::A => self.a,
            Grade::B => self.b,
            Grade::C => self.c,
            Grade::D => self.d,
        }
    }

    pub fn total(&self) -> usize {
        self.a + self.b + self.c + self.d
    }
}

// ---------------------------------------------------------------------------
// Plan output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAssignment {
    pub shipid: String,
    pub vencode: String,
    pub grade: Grade,
}

/// The result of one allocation run.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub assignments: Vec<PlannedAssignment>,
    /// Shipments with no eligible vendor, or whose eligible grades were all
    /// at quota; these are parked for dispatcher attention.
    pub parked: Vec<String>,
    /// Per-grade tally, indexed by `Grade::index()`.
    pub allocated: [usize; 4],
}

impl AllocationPlan {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.parked.is_empty()
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

/// How recently a vendor was assigned, for ranking. Never-assigned vendors
/// come first; assignments made earlier in this plan outrank nothing — they
/// push the vendor to the back of its grade, which is what round-robins
/// equal-timestamp updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Recency {
    Never,
    Prior(i64),
    InPlan(u64),
}

/// Compute an allocation plan for `shipments` (callers pass them shipid
/// ascending) against the vendor pool, under `quota`.
pub fn plan(
    shipments: &[ShipmentReq],
    vendors: &[VendorSnapshot],
    quota: QuotaVector,
) -> AllocationPlan {
    let mut assignments: Vec<PlannedAssignment> = Vec::new();
    let mut parked: Vec<String> = Vec::new();
    let mut allocated = [0usize; 4];

    // vencode → in-plan assignment sequence, bumped on every grant.
    let mut in_plan: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    let mut seq: u64 = 0;

    for shipment in shipments {
        let mut candidates: Vec<&VendorSnapshot> = vendors
            .iter()
            .filter(|v| v.eligible_for(&shipment.cartype))
            .collect();

        candidates.sort_by(|x, y| {
            let key = |v: &VendorSnapshot| {
                let recency = match in_plan.get(v.vencode.as_str()) {
                    Some(s) => Recency::InPlan(*s),
                    None => match v.last_assigned_at {
                        Some(t) => Recency::Prior(t.timestamp_micros()),
                        None => Recency::Never,
                    },
                };
                (v.grade, recency)
            };
            key(x).cmp(&key(y)).then_with(|| x.vencode.cmp(&y.vencode))
        });

        let winner = candidates
            .iter()
            .find(|v| allocated[v.grade.index()] < quota.for_grade(v.grade));

        match winner {
            Some(v) => {
                allocated[v.grade.index()] += 1;
                seq += 1;
                in_plan.insert(v.vencode.clone(), seq);
                assignments.push(PlannedAssignment {
                    shipid: shipment.shipid.clone(),
                    vencode: v.vencode.clone(),
                    grade: v.grade,
                });
            }
            None => parked.push(shipment.shipid.clone()),
        }
    }

    AllocationPlan {
        assignments,
        parked,
        allocated,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
