//! The set of settlement nodes hosted by this process.
//!
//! Every hosted party gets its own [`SettlementNode`] with a responder task,
//! and all of them share one directory, one session network and one notary.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tally_core::types::canonical_name;
use tally_core::{Party, ProtocolConfig};
use tally_crypto::KeyPair;
use tally_settlement::{
    InMemoryDirectory, LocalNetwork, LocalNotary, SettlementNode, SignedTransaction,
};
use tokio::task::JoinHandle;

use crate::config::ClusterConfig;

pub struct LocalCluster {
    directory: Arc<InMemoryDirectory>,
    network: Arc<LocalNetwork>,
    notary: Arc<LocalNotary>,
    nodes: Vec<Arc<SettlementNode>>,
    responders: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    /// Build the cluster and start one responder per party.
    ///
    /// `load_key` supplies each party's signing key by canonical name. Must be
    /// called from within a Tokio runtime.
    pub fn start<F>(
        config: &ClusterConfig,
        protocol: &ProtocolConfig,
        mut load_key: F,
    ) -> Result<Self>
    where
        F: FnMut(&str) -> Result<KeyPair>,
    {
        if config.parties.is_empty() {
            anyhow::bail!("cluster must host at least one party");
        }
        let notary_name = canonical_name(&config.notary);
        if notary_name.is_empty() {
            anyhow::bail!("notary name must not be empty");
        }
        let mut seen = HashSet::new();
        for name in &config.parties {
            let canonical = canonical_name(name);
            if canonical.is_empty() {
                anyhow::bail!("party names must not be empty");
            }
            if canonical == notary_name {
                anyhow::bail!("party '{}' clashes with the notary's name", name.trim());
            }
            if !seen.insert(canonical) {
                anyhow::bail!("party '{}' is listed more than once", name.trim());
            }
        }

        let directory = Arc::new(InMemoryDirectory::new());
        let network = Arc::new(LocalNetwork::new());
        let notary_key = load_key(&notary_name)?;
        let notary = Arc::new(LocalNotary::new(Party::new(
            config.notary.trim(),
            notary_key.owning_key(),
        )));
        directory.register_notary(notary.identity().clone());

        let mut nodes = Vec::with_capacity(config.parties.len());
        let mut responders = Vec::with_capacity(config.parties.len());
        for name in &config.parties {
            let keypair = load_key(&canonical_name(name))?;
            let node = Arc::new(SettlementNode::new(
                name.trim(),
                keypair,
                directory.clone(),
                network.clone(),
                notary.clone(),
                protocol.clone(),
            ));
            directory.register(node.me().clone());
            notary.attach_vault(node.vault());
            responders.push(node.start_responder(network.register(node.me())));
            tracing::info!(party = %node.me(), key = %node.me().owning_key(), "hosting party");
            nodes.push(node);
        }

        Ok(Self {
            directory,
            network,
            notary,
            nodes,
            responders,
        })
    }

    /// The hosted node for `name`, compared by canonical name.
    pub fn node(&self, name: &str) -> Option<Arc<SettlementNode>> {
        self.nodes.iter().find(|n| n.me().is_named(name)).cloned()
    }

    pub fn nodes(&self) -> &[Arc<SettlementNode>] {
        &self.nodes
    }

    pub fn notary(&self) -> &Arc<LocalNotary> {
        &self.notary
    }

    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }

    pub fn directory(&self) -> &Arc<InMemoryDirectory> {
        &self.directory
    }

    /// Re-apply a journal to the notary, restoring vaults and consumption.
    pub fn replay(&self, journal: Vec<SignedTransaction>) -> Result<usize> {
        let count = journal.len();
        for (seq, signed) in journal.into_iter().enumerate() {
            let tx_id = signed.id();
            self.notary
                .replay(signed)
                .map_err(|e| anyhow::anyhow!("journal entry {} ({}): {}", seq, tx_id, e))?;
        }
        if count > 0 {
            tracing::info!(transactions = count, "journal replayed");
        }
        Ok(count)
    }

    /// Stop every responder task.
    pub fn stop(&self) {
        for handle in &self.responders {
            handle.abort();
        }
    }
}
