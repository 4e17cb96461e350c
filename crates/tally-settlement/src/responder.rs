//! The counterparty side of the coordination protocol.

use std::sync::Arc;
use tally_core::{Participants, Party, ProtocolConfig, SettlementContract};
use tally_crypto::{sign_transaction, verify_transaction_signature, KeyPair, TransactionSignature};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::{Session, SessionMessage};
use crate::traits::RecordQuery;
use crate::types::SignedTransaction;

/// Answers signature requests on behalf of one party.
///
/// Every inbound session is handled on its own task. A proposal is signed
/// only if it passes the same contract the proposer ran plus this party's
/// own checks against its vault.
pub struct Responder {
    me: Party,
    keypair: Arc<KeyPair>,
    records: Arc<dyn RecordQuery>,
    config: ProtocolConfig,
}

impl Responder {
    pub fn new(
        me: Party,
        keypair: Arc<KeyPair>,
        records: Arc<dyn RecordQuery>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            me,
            keypair,
            records,
            config,
        }
    }

    /// Serve `inbox` on a background task until the network drops it.
    pub fn spawn(self: Arc<Self>, inbox: mpsc::Receiver<Session>) -> JoinHandle<()> {
        tokio::spawn(self.serve(inbox))
    }

    pub async fn serve(self: Arc<Self>, mut inbox: mpsc::Receiver<Session>) {
        tracing::debug!(party = %self.me, "responder listening");
        while let Some(session) = inbox.recv().await {
            let responder = self.clone();
            tokio::spawn(async move { responder.handle(session).await });
        }
        tracing::debug!(party = %self.me, "responder stopped");
    }

    /// Handle a single inbound session.
    pub async fn handle(&self, mut session: Session) {
        let proposer = session.peer().clone();
        let reply = match session.receive(self.config.session_timeout()).await {
            Ok(SessionMessage::Propose(signed)) => match self.evaluate(&signed, &proposer).await {
                Ok(sig) => {
                    tracing::debug!(tx_id = %signed.id(), party = %self.me, proposer = %proposer, "signed proposal");
                    SessionMessage::Signed(sig)
                }
                Err(reason) => {
                    tracing::warn!(
                        tx_id = %signed.id(),
                        party = %self.me,
                        proposer = %proposer,
                        reason = %reason,
                        "refused to sign"
                    );
                    SessionMessage::Refused(reason)
                }
            },
            Ok(_) => SessionMessage::Refused("expected a proposal".into()),
            Err(err) => {
                tracing::warn!(party = %self.me, proposer = %proposer, error = %err, "inbound session failed");
                return;
            }
        };
        if let Err(err) = session.send(reply).await {
            tracing::warn!(party = %self.me, proposer = %proposer, error = %err, "could not answer proposer");
        }
    }

    /// Decide whether to sign `signed`, proposed by `proposer`. The error is
    /// the refusal reason sent back.
    pub async fn evaluate(
        &self,
        signed: &SignedTransaction,
        proposer: &Party,
    ) -> Result<TransactionSignature, String> {
        let tx = &signed.tx;

        if !tx.id_is_consistent() {
            return Err("transaction id does not match its contents".into());
        }
        if !tx.requires_signature_from(self.me.owning_key()) {
            return Err(format!("{} is not a required signer", self.me));
        }

        let proposer_sig = signed
            .signature_by(proposer.owning_key())
            .ok_or_else(|| format!("proposal carries no signature by {}", proposer))?;
        verify_transaction_signature(tx, proposer_sig)
            .map_err(|e| format!("proposer signature is invalid: {}", e))?;

        SettlementContract::verify(tx).map_err(|e| e.to_string())?;

        let participants = Participants::of(tx).map_err(|e| e.to_string())?;
        if participants.role_of(proposer).is_none() {
            return Err(format!("{} is not a participant of the transaction", proposer));
        }

        for input in &tx.inputs {
            match self.records.lookup(&input.id()).await {
                None => return Err(format!("input {} is unknown to {}", input.id(), self.me)),
                Some((ours, _)) if !ours.is_identical(input) => {
                    return Err(format!(
                        "input {} does not match the records of {}",
                        input.id(),
                        self.me
                    ))
                }
                Some(_) => {}
            }
        }

        Ok(sign_transaction(tx, &self.keypair))
    }
}
