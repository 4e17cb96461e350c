use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::RwLock;
use tally_core::Party;
use tokio::sync::mpsc;

use crate::error::SettlementError;
use crate::session::Session;
use crate::traits::SessionOpener;

const INBOX_BUFFER: usize = 64;
const SESSION_LOG_CAPACITY: usize = 256;

/// In-process session transport.
///
/// Each registered party gets an inbox of incoming sessions that its
/// responder drains. Thread-safe: uses `DashMap` for the inbox table.
/// Only the most recent sessions are remembered.
pub struct LocalNetwork {
    inboxes: DashMap<String, mpsc::Sender<Session>>,
    opened: RwLock<VecDeque<(Party, Party)>>,
    log_capacity: usize,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::with_session_log(SESSION_LOG_CAPACITY)
    }

    /// A network remembering at most `capacity` opened sessions.
    pub fn with_session_log(capacity: usize) -> Self {
        Self {
            inboxes: DashMap::new(),
            opened: RwLock::new(VecDeque::with_capacity(capacity)),
            log_capacity: capacity,
        }
    }

    /// Register `party` and return the receiver its responder listens on.
    /// Registering again replaces the previous inbox.
    pub fn register(&self, party: &Party) -> mpsc::Receiver<Session> {
        let (tx, rx) = mpsc::channel(INBOX_BUFFER);
        self.inboxes.insert(party.canonical_name(), tx);
        tracing::debug!(party = %party, "registered on local network");
        rx
    }

    /// Make `party` unreachable. Returns whether it was registered.
    pub fn disconnect(&self, party: &Party) -> bool {
        self.inboxes.remove(&party.canonical_name()).is_some()
    }

    pub fn is_reachable(&self, party: &Party) -> bool {
        self.inboxes.contains_key(&party.canonical_name())
    }

    /// The most recently opened sessions, as `(from, to)` in opening order.
    pub fn sessions_opened(&self) -> Vec<(Party, Party)> {
        self.opened.read().unwrap().iter().cloned().collect()
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionOpener for LocalNetwork {
    async fn open_session(&self, from: &Party, to: &Party) -> Result<Session, SettlementError> {
        let inbox = self
            .inboxes
            .get(&to.canonical_name())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SettlementError::CommunicationFailure(format!("no route to {}", to)))?;

        let (near, far) = Session::pair(from.clone(), to.clone());
        inbox.send(far).await.map_err(|_| {
            SettlementError::CommunicationFailure(format!("{} is not accepting sessions", to))
        })?;

        {
            let mut opened = self.opened.write().unwrap();
            if opened.len() >= self.log_capacity {
                opened.pop_front();
            }
            if self.log_capacity > 0 {
                opened.push_back((from.clone(), to.clone()));
            }
        }
        tracing::debug!(from = %from, to = %to, "session opened");
        Ok(near)
    }
}
