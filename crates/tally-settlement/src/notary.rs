use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tally_core::{Action, LedgerState, Party, RecordId, SettlementContract, TransactionId};
use tokio::sync::broadcast;

use crate::error::SettlementError;
use crate::traits::FinalityService;
use crate::types::SignedTransaction;
use crate::vault::Vault;

const EVENT_BUFFER: usize = 256;

/// Published once per committed transaction.
#[derive(Debug, Clone, Serialize)]
pub struct CommitEvent {
    pub tx_id: TransactionId,
    pub action: Action,
    pub participants: Vec<Party>,
    pub committed_at: DateTime<Utc>,
}

#[derive(Default)]
struct Ledger {
    /// Consumed record → the transaction that consumed it.
    consumed: HashMap<RecordId, TransactionId>,
    /// Committed records not yet consumed, exactly as committed.
    unconsumed: HashMap<RecordId, LedgerState>,
    committed: Vec<SignedTransaction>,
    committed_ids: HashSet<TransactionId>,
}

/// In-process finality service.
///
/// Verifies signatures and the contract, then atomically checks and marks
/// every input as consumed. An input must be identical, owning keys
/// included, to the record this notary committed. Committed transactions are recorded in the
/// vault of each participant and announced on a broadcast channel.
pub struct LocalNotary {
    identity: Party,
    ledger: Mutex<Ledger>,
    vaults: DashMap<String, Arc<Vault>>,
    events: broadcast::Sender<CommitEvent>,
}

impl LocalNotary {
    pub fn new(identity: Party) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            identity,
            ledger: Mutex::new(Ledger::default()),
            vaults: DashMap::new(),
            events,
        }
    }

    pub fn identity(&self) -> &Party {
        &self.identity
    }

    /// Route committed transactions to `vault`'s owner.
    pub fn attach_vault(&self, vault: Arc<Vault>) {
        self.vaults.insert(vault.owner().canonical_name(), vault);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommitEvent> {
        self.events.subscribe()
    }

    /// Every committed transaction, in commit order.
    pub fn committed(&self) -> Vec<SignedTransaction> {
        self.ledger.lock().unwrap().committed.clone()
    }

    /// Committed transactions from position `start` onwards, in commit order.
    pub fn committed_since(&self, start: usize) -> Vec<SignedTransaction> {
        let ledger = self.ledger.lock().unwrap();
        ledger.committed.iter().skip(start).cloned().collect()
    }

    pub fn committed_count(&self) -> usize {
        self.ledger.lock().unwrap().committed.len()
    }

    pub fn is_consumed(&self, id: &RecordId) -> bool {
        self.ledger.lock().unwrap().consumed.contains_key(id)
    }

    /// Re-apply a previously committed transaction without announcing it.
    pub fn replay(&self, signed: SignedTransaction) -> Result<(), SettlementError> {
        self.commit(signed, false).map(|_| ())
    }

    fn commit(
        &self,
        signed: SignedTransaction,
        publish: bool,
    ) -> Result<SignedTransaction, SettlementError> {
        let tx_id = signed.id();
        if !signed.tx.id_is_consistent() {
            return Err(SettlementError::InvalidInput(format!(
                "transaction {} does not match its contents",
                tx_id
            )));
        }
        signed.verify_signatures()?;
        SettlementContract::verify(&signed.tx)?;

        let participants = signed.tx.participants();
        {
            let mut ledger = self.ledger.lock().unwrap();
            if ledger.committed_ids.contains(&tx_id) {
                return Err(SettlementError::InvalidInput(format!(
                    "transaction {} is already committed",
                    tx_id
                )));
            }

            let mut seen = HashSet::new();
            for input in &signed.tx.inputs {
                let id = input.id();
                if let Some(by) = ledger.consumed.get(&id) {
                    tracing::warn!(tx_id = %tx_id, record = %id, consumed_by = %by, "conflicting consumption");
                    return Err(SettlementError::ConflictingConsumption {
                        record: id,
                        consumed_by: by.to_hex(),
                    });
                }
                if !seen.insert(id) {
                    return Err(SettlementError::ConflictingConsumption {
                        record: id,
                        consumed_by: tx_id.to_hex(),
                    });
                }
                match ledger.unconsumed.get(&id) {
                    Some(committed) if committed.is_identical(input) => {}
                    _ => {
                        tracing::warn!(tx_id = %tx_id, record = %id, "input is not a committed record");
                        return Err(SettlementError::InvalidInput(format!(
                            "input {} does not match any committed record",
                            id
                        )));
                    }
                }
            }
            for id in seen {
                ledger.unconsumed.remove(&id);
                ledger.consumed.insert(id, tx_id);
            }
            for output in &signed.tx.outputs {
                ledger.unconsumed.insert(output.id(), output.clone());
            }
            ledger.committed_ids.insert(tx_id);
            ledger.committed.push(signed.clone());

            for party in &participants {
                if let Some(vault) = self.vaults.get(&party.canonical_name()) {
                    vault.record_transaction(&signed.tx);
                }
            }
        }

        tracing::info!(
            tx_id = %tx_id,
            action = %signed.tx.action,
            inputs = signed.tx.inputs.len(),
            replay = !publish,
            "transaction committed"
        );

        if publish {
            // No subscribers is not an error.
            let _ = self.events.send(CommitEvent {
                tx_id,
                action: signed.tx.action.clone(),
                participants,
                committed_at: Utc::now(),
            });
        }
        Ok(signed)
    }
}

#[async_trait]
impl FinalityService for LocalNotary {
    async fn submit(&self, signed: SignedTransaction) -> Result<SignedTransaction, SettlementError> {
        self.commit(signed, true)
    }
}
