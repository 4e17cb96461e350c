use async_trait::async_trait;
use dashmap::DashMap;
use tally_core::{LedgerState, ObligationRecord, Party, RecordId, SettlementRecord, Transaction};

use crate::traits::RecordQuery;
use crate::types::{ObligationFilter, RecordStatus};

#[derive(Debug, Clone)]
struct VaultEntry {
    state: LedgerState,
    consumed: bool,
}

/// One party's local view of the ledger: every record it participates in,
/// with its consumption status.
pub struct Vault {
    owner: Party,
    states: DashMap<RecordId, VaultEntry>,
}

impl Vault {
    pub fn new(owner: Party) -> Self {
        Self {
            owner,
            states: DashMap::new(),
        }
    }

    pub fn owner(&self) -> &Party {
        &self.owner
    }

    /// Store `state` as unconsumed, replacing any copy with the same id.
    pub fn insert(&self, state: LedgerState) {
        self.states.insert(
            state.id(),
            VaultEntry {
                state,
                consumed: false,
            },
        );
    }

    /// Apply a committed transaction: mark its inputs consumed and store the
    /// outputs the owner participates in.
    pub fn record_transaction(&self, tx: &Transaction) {
        for input in &tx.inputs {
            if let Some(mut entry) = self.states.get_mut(&input.id()) {
                entry.consumed = true;
            } else if self.participates_in(input) {
                self.states.insert(
                    input.id(),
                    VaultEntry {
                        state: input.clone(),
                        consumed: true,
                    },
                );
            }
        }
        for output in &tx.outputs {
            if self.participates_in(output) {
                self.insert(output.clone());
            }
        }
        tracing::debug!(owner = %self.owner, tx_id = %tx.id, "vault recorded transaction");
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn participates_in(&self, state: &LedgerState) -> bool {
        state.participants().contains(&&self.owner)
    }

    fn collect<T, F>(&self, status: RecordStatus, pick: F) -> Vec<T>
    where
        F: Fn(&LedgerState) -> Option<T>,
    {
        self.states
            .iter()
            .filter(|entry| status == RecordStatus::All || !entry.consumed)
            .filter_map(|entry| pick(&entry.state))
            .collect()
    }
}

#[async_trait]
impl RecordQuery for Vault {
    async fn obligations(
        &self,
        filter: &ObligationFilter,
        status: RecordStatus,
    ) -> Vec<ObligationRecord> {
        let mut found = self.collect(status, |state| {
            state
                .as_obligation()
                .filter(|iou| filter.matches(iou))
                .cloned()
        });
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found
    }

    async fn settlements(&self, status: RecordStatus) -> Vec<SettlementRecord> {
        let mut found = self.collect(status, |state| state.as_settlement().cloned());
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found
    }

    async fn lookup(&self, id: &RecordId) -> Option<(LedgerState, bool)> {
        self.states
            .get(id)
            .map(|entry| (entry.state.clone(), entry.consumed))
    }
}
