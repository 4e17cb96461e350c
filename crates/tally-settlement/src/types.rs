use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tally_core::{ObligationRecord, OwningKey, Party, Transaction, TransactionId};
use tally_crypto::{verify_transaction_signature, TransactionSignature};

use crate::error::SettlementError;

/// A transaction together with the signatures collected for it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub signatures: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tx.id
    }

    /// Attach a signature, replacing any earlier one by the same key.
    pub fn add_signature(&mut self, sig: TransactionSignature) {
        self.signatures.retain(|s| s.by != sig.by);
        self.signatures.push(sig);
    }

    pub fn signature_by(&self, key: &OwningKey) -> Option<&TransactionSignature> {
        self.signatures.iter().find(|s| &s.by == key)
    }

    /// Declared signers that have not signed yet.
    pub fn missing_signers(&self) -> Vec<&OwningKey> {
        self.tx
            .signers
            .iter()
            .filter(|key| self.signature_by(key).is_none())
            .collect()
    }

    /// Check that every declared signer signed, every signature verifies, and
    /// nobody outside the signer set signed.
    pub fn verify_signatures(&self) -> Result<(), SettlementError> {
        if let Some(missing) = self.missing_signers().first() {
            return Err(SettlementError::InvalidSignature(format!(
                "missing signature by {}",
                missing
            )));
        }
        for sig in &self.signatures {
            if !self.tx.requires_signature_from(&sig.by) {
                return Err(SettlementError::InvalidSignature(format!(
                    "{} is not a required signer",
                    sig.by
                )));
            }
            verify_transaction_signature(&self.tx, sig)?;
        }
        Ok(())
    }
}

/// Inclusive creation-time window. An absent bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Self, SettlementError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(SettlementError::InvalidInput(
                    "invalid period, 'from' is after 'to'".into(),
                ));
            }
        }
        Ok(Self { from, to })
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, SettlementError> {
        Self::new(Some(from), Some(to))
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *at >= from) && self.to.map_or(true, |to| *at <= to)
    }
}

/// The role a party plays in an obligation, for querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Lender,
    Borrower,
    Viewer,
}

impl FromStr for PartyRole {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lender" => Ok(Self::Lender),
            "borrower" => Ok(Self::Borrower),
            "viewer" => Ok(Self::Viewer),
            other => Err(SettlementError::InvalidInput(format!(
                "unknown role '{}', expected lender, borrower or viewer",
                other
            ))),
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lender => write!(f, "lender"),
            Self::Borrower => write!(f, "borrower"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

/// Whether queries return only live records or also consumed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Unconsumed,
    All,
}

impl FromStr for RecordStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unconsumed" => Ok(Self::Unconsumed),
            "all" => Ok(Self::All),
            other => Err(SettlementError::InvalidInput(format!(
                "unknown status '{}', expected unconsumed or all",
                other
            ))),
        }
    }
}

/// Selection criteria for obligation queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObligationFilter {
    All,
    ByRole { role: PartyRole, party: Party },
    /// Obligations whose lender and borrower are `a` and `b` in either
    /// direction, created within `range`.
    Between { a: Party, b: Party, range: DateRange },
}

impl ObligationFilter {
    pub fn matches(&self, iou: &ObligationRecord) -> bool {
        match self {
            Self::All => true,
            Self::ByRole { role, party } => match role {
                PartyRole::Lender => iou.lender == *party,
                PartyRole::Borrower => iou.borrower == *party,
                PartyRole::Viewer => iou.viewer == *party,
            },
            Self::Between { a, b, range } => iou.is_between(a, b) && range.contains(&iou.created_at),
        }
    }
}
