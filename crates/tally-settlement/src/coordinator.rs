//! The proposer side of the coordination protocol.

use std::sync::Arc;
use tally_core::{
    CoordinationEvent, CoordinationState, CoordinationStateMachine, Participants, Party,
    ProtocolConfig, SettlementContract, Transaction,
};
use tally_crypto::{sign_transaction, verify_transaction_signature, KeyPair};

use crate::error::SettlementError;
use crate::session::SessionMessage;
use crate::traits::{FinalityService, SessionOpener};
use crate::types::SignedTransaction;

/// One coordination attempt and the states it has passed through.
#[derive(Debug)]
pub struct Proposal {
    signed: SignedTransaction,
    state: CoordinationState,
    history: Vec<CoordinationState>,
}

impl Proposal {
    pub fn new(tx: Transaction) -> Self {
        Self {
            signed: SignedTransaction::new(tx),
            state: CoordinationState::Building,
            history: vec![CoordinationState::Building],
        }
    }

    pub fn state(&self) -> CoordinationState {
        self.state
    }

    /// Every state visited, starting with `Building`.
    pub fn history(&self) -> &[CoordinationState] {
        &self.history
    }

    pub fn transaction(&self) -> &Transaction {
        &self.signed.tx
    }

    fn advance(&mut self, event: CoordinationEvent) -> Result<(), SettlementError> {
        self.state = CoordinationStateMachine::transition(self.state, event)?;
        self.history.push(self.state);
        Ok(())
    }

    fn reject(&mut self) {
        if !self.state.is_final() {
            // Rejected is reachable from every non-final state.
            let _ = self.advance(CoordinationEvent::Rejected);
        }
    }
}

/// Runs proposals on behalf of one party.
pub struct Coordinator {
    me: Party,
    keypair: Arc<KeyPair>,
    sessions: Arc<dyn SessionOpener>,
    finality: Arc<dyn FinalityService>,
    config: ProtocolConfig,
}

impl Coordinator {
    pub fn new(
        me: Party,
        keypair: Arc<KeyPair>,
        sessions: Arc<dyn SessionOpener>,
        finality: Arc<dyn FinalityService>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            me,
            keypair,
            sessions,
            finality,
            config,
        }
    }

    pub fn me(&self) -> &Party {
        &self.me
    }

    /// Run a fresh proposal for `tx` to completion.
    pub async fn propose(&self, tx: Transaction) -> Result<SignedTransaction, SettlementError> {
        let mut proposal = Proposal::new(tx);
        self.drive(&mut proposal).await
    }

    /// Drive `proposal` from `Building` to `Committed`, or to `Rejected` on
    /// the first failure.
    pub async fn drive(&self, proposal: &mut Proposal) -> Result<SignedTransaction, SettlementError> {
        let result = self.run(proposal).await;
        match &result {
            Ok(signed) => {
                tracing::info!(
                    tx_id = %signed.id(),
                    party = %self.me,
                    action = %signed.tx.action,
                    "proposal committed"
                );
            }
            Err(err) => {
                proposal.reject();
                tracing::warn!(
                    tx_id = %proposal.signed.id(),
                    party = %self.me,
                    state = %proposal.state,
                    error = %err,
                    "proposal rejected"
                );
            }
        }
        result
    }

    async fn run(&self, proposal: &mut Proposal) -> Result<SignedTransaction, SettlementError> {
        if proposal.state != CoordinationState::Building {
            return Err(SettlementError::Internal(format!(
                "proposal is already {}",
                proposal.state
            )));
        }

        // Building → LocallyValidated
        SettlementContract::verify(&proposal.signed.tx)?;
        let counterparts = self.counterparts(&proposal.signed.tx)?;
        proposal.advance(CoordinationEvent::LocalValidationPassed)?;

        // Proposer signs first.
        let own = sign_transaction(&proposal.signed.tx, &self.keypair);
        proposal.signed.add_signature(own);
        proposal.advance(CoordinationEvent::ProposerSigned)?;

        // One session at a time, in role order.
        for counterparty in &counterparts {
            self.collect_signature(&mut proposal.signed, counterparty)
                .await?;
        }
        proposal.advance(CoordinationEvent::AllSignaturesGathered)?;

        let committed = tokio::time::timeout(
            self.config.finality_timeout(),
            self.finality.submit(proposal.signed.clone()),
        )
        .await
        .map_err(|_| {
            SettlementError::CommunicationFailure(format!(
                "finality service did not answer within {:?}",
                self.config.finality_timeout()
            ))
        })??;
        proposal.advance(CoordinationEvent::Committed)?;
        Ok(committed)
    }

    /// The two parties to solicit, checking this party may propose `tx`.
    fn counterparts(&self, tx: &Transaction) -> Result<Vec<Party>, SettlementError> {
        let participants = Participants::of(tx)?;
        let order = participants.solicitation_order(&self.me)?;

        if !tx.requires_signature_from(self.me.owning_key()) {
            return Err(SettlementError::InvalidInput(format!(
                "{} is not a required signer of the transaction",
                self.me
            )));
        }
        let expected = [&participants.viewer, &participants.payer, &participants.loaner];
        if let Some(extra) = tx
            .signers
            .iter()
            .find(|key| !expected.iter().any(|p| p.owning_key() == *key))
        {
            return Err(SettlementError::InvalidInput(format!(
                "signer {} is not a participant",
                extra
            )));
        }
        Ok(order.into_iter().cloned().collect())
    }

    async fn collect_signature(
        &self,
        signed: &mut SignedTransaction,
        counterparty: &Party,
    ) -> Result<(), SettlementError> {
        let timeout = self.config.session_timeout();
        let mut session = tokio::time::timeout(
            timeout,
            self.sessions.open_session(&self.me, counterparty),
        )
        .await
        .map_err(|_| {
            SettlementError::CommunicationFailure(format!(
                "could not open a session with {} within {:?}",
                counterparty, timeout
            ))
        })??;

        tracing::debug!(tx_id = %signed.id(), party = %counterparty, "soliciting signature");
        session.send(SessionMessage::Propose(signed.clone())).await?;

        match session.receive(timeout).await? {
            SessionMessage::Signed(sig) => {
                if &sig.by != counterparty.owning_key() {
                    return Err(SettlementError::SignatureRefused {
                        party: counterparty.to_string(),
                        reason: format!("signature is by {}, not by {}", sig.by, counterparty),
                    });
                }
                verify_transaction_signature(&signed.tx, &sig).map_err(|e| {
                    SettlementError::SignatureRefused {
                        party: counterparty.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                signed.add_signature(sig);
                Ok(())
            }
            SessionMessage::Refused(reason) => Err(SettlementError::SignatureRefused {
                party: counterparty.to_string(),
                reason,
            }),
            SessionMessage::Propose(_) => Err(SettlementError::SignatureRefused {
                party: counterparty.to_string(),
                reason: "counterparty answered with a proposal".into(),
            }),
        }
    }
}
