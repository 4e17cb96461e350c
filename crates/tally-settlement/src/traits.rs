use async_trait::async_trait;
use tally_core::{LedgerState, ObligationRecord, Party, RecordId, SettlementRecord};

use crate::error::SettlementError;
use crate::session::Session;
use crate::types::{ObligationFilter, RecordStatus, SignedTransaction};

/// Maps human-readable party names to party handles.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    /// Resolve `name` to a handle, or fail with `UnresolvedParty`.
    async fn resolve(&self, name: &str) -> Result<Party, SettlementError>;

    /// Every known party except `me` and notary services.
    async fn peers(&self, me: &Party) -> Vec<Party>;
}

/// Opens message sessions between parties.
#[async_trait]
pub trait SessionOpener: Send + Sync {
    /// Open a session from `from` to `to`. The far end is delivered to
    /// `to`'s responder.
    async fn open_session(&self, from: &Party, to: &Party) -> Result<Session, SettlementError>;
}

/// Orders and commits fully signed transactions.
#[async_trait]
pub trait FinalityService: Send + Sync {
    /// Commit `signed`, or fail with `ConflictingConsumption` if an input was
    /// already spent.
    async fn submit(&self, signed: SignedTransaction) -> Result<SignedTransaction, SettlementError>;
}

/// Read access to one party's recorded states.
#[async_trait]
pub trait RecordQuery: Send + Sync {
    async fn obligations(
        &self,
        filter: &ObligationFilter,
        status: RecordStatus,
    ) -> Vec<ObligationRecord>;

    async fn settlements(&self, status: RecordStatus) -> Vec<SettlementRecord>;

    /// The stored copy of a record and whether it has been consumed.
    async fn lookup(&self, id: &RecordId) -> Option<(LedgerState, bool)>;
}
