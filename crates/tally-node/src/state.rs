//! Shared node state for cross-task communication.

use std::sync::{Arc, RwLock};
use std::time::Instant;
use tally_settlement::SettlementNode;
use tokio::sync::mpsc;

use crate::cluster::LocalCluster;
use crate::commands::NodeCommand;

/// Shared state for the running node, accessible from HTTP handlers.
pub struct NodeState {
    /// When the node started.
    pub start_time: Instant,
    /// The hosted parties.
    pub cluster: Arc<LocalCluster>,
    /// Transactions journaled so far (updated by the event loop).
    committed: RwLock<usize>,
    /// Channel to send commands to the event loop.
    pub command_tx: mpsc::Sender<NodeCommand>,
}

impl NodeState {
    pub fn new(
        cluster: Arc<LocalCluster>,
        committed: usize,
        command_tx: mpsc::Sender<NodeCommand>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            cluster,
            committed: RwLock::new(committed),
            command_tx,
        }
    }

    pub fn node(&self, name: &str) -> Option<Arc<SettlementNode>> {
        self.cluster.node(name)
    }

    pub fn set_committed(&self, count: usize) {
        *self.committed.write().unwrap() = count;
    }

    pub fn committed(&self) -> usize {
        *self.committed.read().unwrap()
    }
}
