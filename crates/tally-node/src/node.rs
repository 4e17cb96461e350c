//! The Tally node orchestrator.
//!
//! Opens storage, starts the hosted cluster, replays the commit journal and
//! runs the HTTP API. The main event loop journals every commit and hands
//! each API proposal to its own task.

use anyhow::Result;
use std::sync::Arc;
use tally_settlement::{CommitEvent, LocalNotary};
use tokio::sync::{broadcast, mpsc};

use crate::cluster::LocalCluster;
use crate::commands::{NodeCommand, TransactionResponse};
use crate::config::TallyConfig;
use crate::state::NodeState;
use crate::storage::Storage;

/// The Tally node, hosting every configured party.
pub struct TallyNode {
    /// Node configuration.
    config: TallyConfig,
    /// Persistent storage.
    storage: Option<Storage>,
    /// The hosted parties.
    cluster: Option<Arc<LocalCluster>>,
    /// Shared state accessible from HTTP handlers.
    node_state: Option<Arc<NodeState>>,
    /// Receives commands from the HTTP API.
    command_rx: Option<mpsc::Receiver<NodeCommand>>,
    /// Receives commit announcements from the notary.
    event_rx: Option<broadcast::Receiver<CommitEvent>>,
}

impl TallyNode {
    /// Create a new node with the given config.
    pub fn new(config: TallyConfig) -> Result<Self> {
        if config.cluster.parties.is_empty() {
            anyhow::bail!("no parties configured under [cluster]");
        }
        tracing::info!(parties = ?config.cluster.parties, "Tally node created");
        Ok(Self {
            config,
            storage: None,
            cluster: None,
            node_state: None,
            command_rx: None,
            event_rx: None,
        })
    }

    /// Initialize and start the node: storage, cluster, journal replay, HTTP API.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting Tally node");

        // Initialize storage
        let storage = Storage::open(&self.config.storage.data_dir)?;
        tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");

        // Start the hosted parties with their persisted keys
        let cluster = LocalCluster::start(&self.config.cluster, &self.config.protocol, |name| {
            storage.load_or_generate_keypair(name)
        })?;
        let cluster = Arc::new(cluster);

        // Restore committed state before accepting new proposals
        let replayed = cluster.replay(storage.transactions()?)?;
        let event_rx = cluster.notary().subscribe();

        // Create the NodeCommand channel (HTTP API → main event loop)
        let (command_tx, command_rx) = mpsc::channel::<NodeCommand>(256);

        // Create shared state
        let node_state = Arc::new(NodeState::new(cluster.clone(), replayed, command_tx));

        // Spawn the HTTP API server
        let api_addr = self.config.api_addr()?;
        let api_state = node_state.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::api::start_api_server(api_addr, api_state).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        });

        // Store handles
        self.storage = Some(storage);
        self.cluster = Some(cluster);
        self.node_state = Some(node_state);
        self.command_rx = Some(command_rx);
        self.event_rx = Some(event_rx);

        Ok(())
    }

    /// Run the node's main event loop: journals commits and dispatches API commands.
    pub async fn run(&mut self) -> Result<()> {
        let mut event_rx = self
            .event_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let node_state = self
            .node_state
            .clone()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let cluster = self
            .cluster
            .clone()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;

        let mut journaled = node_state.committed();
        tracing::info!("entering main event loop");

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Ok(ev) => {
                            tracing::debug!(tx_id = %ev.tx_id, action = %ev.action, "commit announced");
                            journaled = journal_commits(storage, cluster.notary(), journaled)?;
                            node_state.set_committed(journaled);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "commit receiver lagged");
                            journaled = journal_commits(storage, cluster.notary(), journaled)?;
                            node_state.set_committed(journaled);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("commit event channel closed");
                            break;
                        }
                    }
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(c) => handle_api_command(&cluster, c),
                        None => {
                            tracing::info!("API command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Gracefully shut down the node.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down Tally node");

        self.node_state = None;

        if let Some(cluster) = self.cluster.take() {
            cluster.stop();
            if let Some(ref storage) = self.storage {
                let journaled = storage.transaction_count()?;
                let total = journal_commits(storage, cluster.notary(), journaled)?;
                tracing::info!(transactions = total, "journal flushed");
            }
        }

        if let Some(storage) = self.storage.take() {
            drop(storage);
            tracing::info!("storage closed");
        }

        tracing::info!("Tally node shut down");
        Ok(())
    }

    pub fn cluster(&self) -> Option<&Arc<LocalCluster>> {
        self.cluster.as_ref()
    }
}

/// Journal every commit past position `journaled`. Returns the new count.
fn journal_commits(storage: &Storage, notary: &LocalNotary, journaled: usize) -> Result<usize> {
    let pending = notary.committed_since(journaled);
    for (offset, signed) in pending.iter().enumerate() {
        storage.append_transaction((journaled + offset) as u64, signed)?;
    }
    Ok(journaled + pending.len())
}

/// Hand a command to the proposing party on its own task.
pub(crate) fn handle_api_command(cluster: &LocalCluster, cmd: NodeCommand) {
    let Some(node) = cluster.node(cmd.node()) else {
        let error = format!("unknown node '{}'", cmd.node());
        match cmd {
            NodeCommand::CreateObligation { reply, .. } | NodeCommand::Compensate { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
        return;
    };

    match cmd {
        NodeCommand::CreateObligation {
            value,
            viewer,
            lender,
            borrower,
            reply,
            ..
        } => {
            tokio::spawn(async move {
                let result = node
                    .create_obligation(value, &viewer, &lender, &borrower)
                    .await
                    .map(|signed| TransactionResponse::from(&signed))
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            });
        }
        NodeCommand::Compensate {
            viewer,
            counterparty,
            range,
            reply,
            ..
        } => {
            tokio::spawn(async move {
                let result = node
                    .compensate(&viewer, &counterparty, range)
                    .await
                    .map(|signed| TransactionResponse::from(&signed))
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            });
        }
    }
}
