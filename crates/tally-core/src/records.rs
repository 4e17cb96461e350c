use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Party, RecordId};

/// A single-direction debt: `borrower` owes `value` to `lender`, observed
/// by `viewer`.
///
/// Records are never mutated. A settlement consumes them and produces a
/// new [`SettlementRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationRecord {
    pub id: RecordId,
    pub value: u64,
    pub created_at: DateTime<Utc>,
    pub viewer: Party,
    pub lender: Party,
    pub borrower: Party,
}

impl ObligationRecord {
    /// Create a new obligation stamped with a fresh id and the current time.
    pub fn new(value: u64, viewer: Party, lender: Party, borrower: Party) -> Self {
        Self {
            id: RecordId::new(),
            value,
            created_at: Utc::now(),
            viewer,
            lender,
            borrower,
        }
    }

    /// Override the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Viewer, lender and borrower, in that order.
    pub fn participants(&self) -> [&Party; 3] {
        [&self.viewer, &self.lender, &self.borrower]
    }

    /// Whether `{lender, borrower}` is exactly `{a, b}`.
    pub fn is_between(&self, a: &Party, b: &Party) -> bool {
        (self.lender == *a && self.borrower == *b) || (self.lender == *b && self.borrower == *a)
    }
}

/// A netted settlement: `payer` owes `value` to `loaner`, observed by
/// `viewer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: RecordId,
    pub value: u64,
    pub created_at: DateTime<Utc>,
    pub viewer: Party,
    pub payer: Party,
    pub loaner: Party,
}

impl SettlementRecord {
    /// Create a new settlement stamped with a fresh id and the current time.
    pub fn new(value: u64, viewer: Party, payer: Party, loaner: Party) -> Self {
        Self {
            id: RecordId::new(),
            value,
            created_at: Utc::now(),
            viewer,
            payer,
            loaner,
        }
    }

    /// Viewer, payer and loaner, in that order.
    pub fn participants(&self) -> [&Party; 3] {
        [&self.viewer, &self.payer, &self.loaner]
    }

    /// Whether viewer, payer and loaner are pairwise distinct.
    pub fn has_distinct_parties(&self) -> bool {
        self.viewer != self.payer && self.viewer != self.loaner && self.payer != self.loaner
    }
}
