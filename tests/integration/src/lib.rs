//! Test harness: an in-process network of settlement nodes sharing one
//! directory, one session network and one notary.

use std::sync::Arc;

use tally_core::{Action, ObligationRecord, Party, ProtocolConfig, SettlementRecord, Transaction};
use tally_crypto::KeyPair;
use tally_settlement::{
    InMemoryDirectory, LocalNetwork, LocalNotary, SettlementNode, SignedTransaction,
};

/// The viewer every scenario uses unless it says otherwise.
pub const VIEWER: &str = "Viewer";

pub struct TestNetwork {
    pub directory: Arc<InMemoryDirectory>,
    pub network: Arc<LocalNetwork>,
    pub notary: Arc<LocalNotary>,
    nodes: Vec<Arc<SettlementNode>>,
}

impl TestNetwork {
    /// Start one node per name with short timeouts.
    pub fn start(names: &[&str]) -> Self {
        Self::with_config(
            names,
            ProtocolConfig {
                session_timeout_ms: 2_000,
                finality_timeout_ms: 2_000,
            },
        )
    }

    pub fn with_config(names: &[&str], config: ProtocolConfig) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let network = Arc::new(LocalNetwork::new());
        let notary = Arc::new(LocalNotary::new(Party::new(
            "Notary",
            KeyPair::generate().owning_key(),
        )));
        directory.register_notary(notary.identity().clone());

        let nodes = names
            .iter()
            .map(|name| {
                let node = Arc::new(SettlementNode::new(
                    name,
                    KeyPair::generate(),
                    directory.clone(),
                    network.clone(),
                    notary.clone(),
                    config.clone(),
                ));
                directory.register(node.me().clone());
                notary.attach_vault(node.vault());
                node.start_responder(network.register(node.me()));
                node
            })
            .collect();

        Self {
            directory,
            network,
            notary,
            nodes,
        }
    }

    /// The node registered under `name`. Panics if there is none.
    pub fn node(&self, name: &str) -> Arc<SettlementNode> {
        self.nodes
            .iter()
            .find(|n| n.me().is_named(name))
            .cloned()
            .unwrap_or_else(|| panic!("no node named {}", name))
    }

    pub fn party(&self, name: &str) -> Party {
        self.node(name).me().clone()
    }

    /// Number of transactions the notary has committed.
    pub fn commits(&self) -> usize {
        self.notary.committed_count()
    }

    /// Have `proposer` issue an obligation observed by the default viewer.
    pub async fn issue(
        &self,
        proposer: &str,
        value: u64,
        lender: &str,
        borrower: &str,
    ) -> SignedTransaction {
        self.node(proposer)
            .create_obligation(value, VIEWER, lender, borrower)
            .await
            .unwrap_or_else(|e| panic!("issuing {} from {}: {}", value, proposer, e))
    }
}

/// A Settle transaction consuming `inputs` into `ipu`, signed by its three parties.
pub fn settle_tx(inputs: Vec<ObligationRecord>, ipu: SettlementRecord) -> Transaction {
    let mut builder = Transaction::builder(Action::Settle).signers_of(ipu.participants());
    for iou in inputs {
        builder = builder.input(iou);
    }
    builder.output(ipu).build()
}
