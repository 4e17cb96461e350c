//! Bidirectional message sessions between two parties.

use std::time::Duration;
use tally_core::Party;
use tally_crypto::TransactionSignature;
use tokio::sync::mpsc;

use crate::error::SettlementError;
use crate::types::SignedTransaction;

const SESSION_BUFFER: usize = 4;

/// Messages exchanged over a coordination session.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// Proposer → responder: the transaction with the proposer's signature.
    Propose(SignedTransaction),
    /// Responder → proposer: the responder's signature.
    Signed(TransactionSignature),
    /// Responder → proposer: the responder declined, with its reason.
    Refused(String),
}

/// One end of a session. Dropping it closes the session for the peer.
pub struct Session {
    local: Party,
    peer: Party,
    outbound: mpsc::Sender<SessionMessage>,
    inbound: mpsc::Receiver<SessionMessage>,
}

impl Session {
    /// Create both ends of a session between `a` and `b`.
    pub fn pair(a: Party, b: Party) -> (Session, Session) {
        let (a_tx, b_rx) = mpsc::channel(SESSION_BUFFER);
        let (b_tx, a_rx) = mpsc::channel(SESSION_BUFFER);
        (
            Session {
                local: a.clone(),
                peer: b.clone(),
                outbound: a_tx,
                inbound: a_rx,
            },
            Session {
                local: b,
                peer: a,
                outbound: b_tx,
                inbound: b_rx,
            },
        )
    }

    pub fn local(&self) -> &Party {
        &self.local
    }

    /// The party at the other end.
    pub fn peer(&self) -> &Party {
        &self.peer
    }

    pub async fn send(&self, msg: SessionMessage) -> Result<(), SettlementError> {
        self.outbound.send(msg).await.map_err(|_| {
            SettlementError::CommunicationFailure(format!("session with {} is closed", self.peer))
        })
    }

    /// Wait up to `timeout` for the next message from the peer.
    pub async fn receive(&mut self, timeout: Duration) -> Result<SessionMessage, SettlementError> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(msg)) => Ok(msg),
            Ok(None) => Err(SettlementError::CommunicationFailure(format!(
                "session with {} closed before replying",
                self.peer
            ))),
            Err(_) => Err(SettlementError::CommunicationFailure(format!(
                "timed out after {:?} waiting for {}",
                timeout, self.peer
            ))),
        }
    }
}
