use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::records::{ObligationRecord, SettlementRecord};
use crate::types::{OwningKey, Party, RecordId, TransactionId};

/// Version byte prefixed to every signing payload.
const PAYLOAD_VERSION: u8 = 1;

/// The action a transaction declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Issue a single obligation.
    Create,
    /// Net a set of obligations into one settlement.
    Settle,
    /// Any action this rule set does not know.
    Other(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Settle => write!(f, "Settle"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A record as it appears in a transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record")]
pub enum LedgerState {
    Obligation(ObligationRecord),
    Settlement(SettlementRecord),
}

impl LedgerState {
    pub fn id(&self) -> RecordId {
        match self {
            Self::Obligation(r) => r.id,
            Self::Settlement(r) => r.id,
        }
    }

    /// Equal contents, with every party carrying the same owning key.
    pub fn is_identical(&self, other: &LedgerState) -> bool {
        self == other
            && self
                .participants()
                .iter()
                .zip(other.participants())
                .all(|(ours, theirs)| ours.is_same_identity(theirs))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Obligation(_) => "obligation",
            Self::Settlement(_) => "settlement",
        }
    }

    pub fn participants(&self) -> [&Party; 3] {
        match self {
            Self::Obligation(r) => r.participants(),
            Self::Settlement(r) => r.participants(),
        }
    }

    pub fn as_obligation(&self) -> Option<&ObligationRecord> {
        match self {
            Self::Obligation(r) => Some(r),
            Self::Settlement(_) => None,
        }
    }

    pub fn as_settlement(&self) -> Option<&SettlementRecord> {
        match self {
            Self::Settlement(r) => Some(r),
            Self::Obligation(_) => None,
        }
    }

    /// Append the canonical encoding of this state to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>) {
        let (tag, id, value, created_at, parties) = match self {
            Self::Obligation(r) => (0u8, r.id, r.value, r.created_at, r.participants()),
            Self::Settlement(r) => (1u8, r.id, r.value, r.created_at, r.participants()),
        };
        buf.push(tag);
        buf.extend_from_slice(id.as_uuid().as_bytes());
        buf.extend_from_slice(&value.to_be_bytes());
        buf.extend_from_slice(&created_at.timestamp_millis().to_be_bytes());
        for party in parties {
            push_prefixed(buf, party.canonical_name().as_bytes());
            push_prefixed(buf, party.owning_key().as_str().as_bytes());
        }
    }
}

impl From<ObligationRecord> for LedgerState {
    fn from(record: ObligationRecord) -> Self {
        Self::Obligation(record)
    }
}

impl From<SettlementRecord> for LedgerState {
    fn from(record: SettlementRecord) -> Self {
        Self::Settlement(record)
    }
}

/// A proposed state transition: consume `inputs`, produce `outputs`, under
/// `action`, authorised by every key in `signers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Digest of the signing payload.
    pub id: TransactionId,
    /// Declared action.
    pub action: Action,
    /// Records consumed by this transaction.
    pub inputs: Vec<LedgerState>,
    /// Records produced by this transaction.
    pub outputs: Vec<LedgerState>,
    /// Keys that must sign, in declaration order.
    pub signers: Vec<OwningKey>,
    /// When the proposer assembled the transaction.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new TransactionBuilder.
    pub fn builder(action: Action) -> TransactionBuilder {
        TransactionBuilder::new(action)
    }

    /// Compute the canonical signing payload.
    /// Deterministic for the same action, states, signers and timestamp.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = vec![PAYLOAD_VERSION];

        push_prefixed(&mut payload, self.action.to_string().as_bytes());

        payload.extend_from_slice(&(self.inputs.len() as u32).to_be_bytes());
        for state in &self.inputs {
            state.encode_into(&mut payload);
        }

        payload.extend_from_slice(&(self.outputs.len() as u32).to_be_bytes());
        for state in &self.outputs {
            state.encode_into(&mut payload);
        }

        payload.extend_from_slice(&(self.signers.len() as u32).to_be_bytes());
        for key in &self.signers {
            push_prefixed(&mut payload, key.as_str().as_bytes());
        }

        payload.extend_from_slice(&self.created_at.timestamp_millis().to_be_bytes());
        payload
    }

    /// Recompute the id from the current contents.
    pub fn compute_id(&self) -> TransactionId {
        TransactionId(*blake3::hash(&self.signing_payload()).as_bytes())
    }

    /// Whether the stored id matches the contents.
    pub fn id_is_consistent(&self) -> bool {
        self.id == self.compute_id()
    }

    /// Inputs that are obligations.
    pub fn obligation_inputs(&self) -> Vec<&ObligationRecord> {
        self.inputs.iter().filter_map(LedgerState::as_obligation).collect()
    }

    /// Outputs that are obligations.
    pub fn obligation_outputs(&self) -> Vec<&ObligationRecord> {
        self.outputs.iter().filter_map(LedgerState::as_obligation).collect()
    }

    /// Outputs that are settlements.
    pub fn settlement_outputs(&self) -> Vec<&SettlementRecord> {
        self.outputs.iter().filter_map(LedgerState::as_settlement).collect()
    }

    /// Every party appearing in any input or output, deduplicated.
    pub fn participants(&self) -> Vec<Party> {
        let mut parties: Vec<Party> = Vec::new();
        for state in self.inputs.iter().chain(self.outputs.iter()) {
            for party in state.participants() {
                if !parties.contains(party) {
                    parties.push(party.clone());
                }
            }
        }
        parties
    }

    /// Whether `key` is in the declared signer set.
    pub fn requires_signature_from(&self, key: &OwningKey) -> bool {
        self.signers.contains(key)
    }
}

/// Builder for constructing sealed transactions.
pub struct TransactionBuilder {
    action: Action,
    inputs: Vec<LedgerState>,
    outputs: Vec<LedgerState>,
    signers: Vec<OwningKey>,
    created_at: Option<DateTime<Utc>>,
}

impl TransactionBuilder {
    fn new(action: Action) -> Self {
        Self {
            action,
            inputs: Vec::new(),
            outputs: Vec::new(),
            signers: Vec::new(),
            created_at: None,
        }
    }

    /// Add a consumed record.
    pub fn input(mut self, state: impl Into<LedgerState>) -> Self {
        self.inputs.push(state.into());
        self
    }

    /// Add a produced record.
    pub fn output(mut self, state: impl Into<LedgerState>) -> Self {
        self.outputs.push(state.into());
        self
    }

    /// Add a required signer. Duplicates are ignored.
    pub fn signer(mut self, key: OwningKey) -> Self {
        if !self.signers.contains(&key) {
            self.signers.push(key);
        }
        self
    }

    /// Add the owning keys of every given party as required signers.
    pub fn signers_of<'a>(mut self, parties: impl IntoIterator<Item = &'a Party>) -> Self {
        for party in parties {
            self = self.signer(party.owning_key().clone());
        }
        self
    }

    /// Pin the creation timestamp.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Build and seal the transaction (id computed from contents).
    pub fn build(self) -> Transaction {
        let mut tx = Transaction {
            id: TransactionId([0u8; 32]),
            action: self.action,
            inputs: self.inputs,
            outputs: self.outputs,
            signers: self.signers,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        };
        tx.id = tx.compute_id();
        tx
    }
}

fn push_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(name: &str) -> Party {
        Party::new(name, OwningKey::new(format!("key-{}", name.to_lowercase())))
    }

    fn make_create_tx() -> Transaction {
        let iou = ObligationRecord::new(100, party("V"), party("A"), party("B"));
        Transaction::builder(Action::Create)
            .signers_of(iou.participants())
            .output(iou)
            .build()
    }

    #[test]
    fn test_identical_states_compare_keys() {
        let iou = ObligationRecord::new(100, party("V"), party("A"), party("B"));
        let mut forged = iou.clone();
        forged.viewer = Party::new("V", OwningKey::new("key-a"));

        let ours = LedgerState::Obligation(iou.clone());
        assert!(ours.is_identical(&LedgerState::Obligation(iou)));
        assert_eq!(ours, LedgerState::Obligation(forged.clone()));
        assert!(!ours.is_identical(&LedgerState::Obligation(forged)));
    }

    #[test]
    fn test_builder_seals_id() {
        let tx = make_create_tx();
        assert!(tx.id_is_consistent());
        assert_eq!(tx.signers.len(), 3);
        assert_eq!(tx.obligation_outputs().len(), 1);
        assert!(tx.inputs.is_empty());
    }

    #[test]
    fn test_builder_dedups_signers() {
        let tx = Transaction::builder(Action::Settle)
            .signer(OwningKey::new("k1"))
            .signer(OwningKey::new("k1"))
            .signer(OwningKey::new("k2"))
            .build();
        assert_eq!(tx.signers, vec![OwningKey::new("k1"), OwningKey::new("k2")]);
    }

    #[test]
    fn test_tampering_changes_id() {
        let mut tx = make_create_tx();
        if let LedgerState::Obligation(ref mut iou) = tx.outputs[0] {
            iou.value = 101;
        }
        assert!(!tx.id_is_consistent());
    }

    #[test]
    fn test_signing_payload_deterministic() {
        let tx = make_create_tx();
        assert_eq!(tx.signing_payload(), tx.clone().signing_payload());
    }

    #[test]
    fn test_participants_deduplicated() {
        let a_b = ObligationRecord::new(100, party("V"), party("A"), party("B"));
        let b_a = ObligationRecord::new(40, party("V"), party("B"), party("A"));
        let ipu = SettlementRecord::new(60, party("V"), party("B"), party("A"));
        let tx = Transaction::builder(Action::Settle)
            .input(a_b)
            .input(b_a)
            .output(ipu)
            .build();
        let names: Vec<String> = tx.participants().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["V", "A", "B"]);
    }

    #[test]
    fn test_requires_signature_from() {
        let tx = make_create_tx();
        assert!(tx.requires_signature_from(&OwningKey::new("key-a")));
        assert!(!tx.requires_signature_from(&OwningKey::new("key-z")));
    }

    #[test]
    fn test_transaction_serde_keeps_id_consistent() {
        let tx = make_create_tx();
        let json = serde_json::to_vec(&tx).unwrap();
        let decoded: Transaction = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded.id, tx.id);
        assert!(decoded.id_is_consistent());
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Create.to_string(), "Create");
        assert_eq!(Action::Settle.to_string(), "Settle");
        assert_eq!(Action::Other("Burn".into()).to_string(), "Burn");
    }
}
