//! Commands dispatched from the HTTP API to the node event loop.

use serde::Serialize;
use tally_settlement::{DateRange, SignedTransaction};
use tokio::sync::oneshot;

/// A command sent from the HTTP API to the node's main event loop.
pub enum NodeCommand {
    /// Issue an obligation from one hosted party.
    CreateObligation {
        node: String,
        value: u64,
        viewer: String,
        lender: String,
        borrower: String,
        reply: oneshot::Sender<Result<TransactionResponse, String>>,
    },
    /// Net a hosted party's obligations with a counterparty.
    Compensate {
        node: String,
        viewer: String,
        counterparty: String,
        range: DateRange,
        reply: oneshot::Sender<Result<TransactionResponse, String>>,
    },
}

impl NodeCommand {
    /// The hosted party that proposes.
    pub fn node(&self) -> &str {
        match self {
            Self::CreateObligation { node, .. } | Self::Compensate { node, .. } => node,
        }
    }
}

/// Response after a transaction commits.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub action: String,
    pub participants: Vec<String>,
}

impl From<&SignedTransaction> for TransactionResponse {
    fn from(signed: &SignedTransaction) -> Self {
        Self {
            transaction_id: signed.id().to_hex(),
            action: signed.tx.action.to_string(),
            participants: signed
                .tx
                .participants()
                .iter()
                .map(|p| p.name().to_string())
                .collect(),
        }
    }
}
