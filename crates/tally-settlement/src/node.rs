//! Boundary operations of one party: issue an obligation, compensate with a
//! counterparty, and query the local vault.

use std::sync::Arc;
use tally_core::{
    net, Action, ObligationRecord, Party, ProtocolConfig, SettlementRecord, Transaction,
};
use tally_crypto::KeyPair;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::coordinator::Coordinator;
use crate::error::SettlementError;
use crate::responder::Responder;
use crate::session::Session;
use crate::traits::{FinalityService, PartyDirectory, RecordQuery, SessionOpener};
use crate::types::{DateRange, ObligationFilter, PartyRole, RecordStatus, SignedTransaction};
use crate::vault::Vault;

/// A party's node: its identity, vault, proposer and responder.
pub struct SettlementNode {
    me: Party,
    directory: Arc<dyn PartyDirectory>,
    vault: Arc<Vault>,
    coordinator: Coordinator,
    responder: Arc<Responder>,
}

impl SettlementNode {
    pub fn new(
        name: &str,
        keypair: KeyPair,
        directory: Arc<dyn PartyDirectory>,
        sessions: Arc<dyn SessionOpener>,
        finality: Arc<dyn FinalityService>,
        config: ProtocolConfig,
    ) -> Self {
        let me = Party::new(name, keypair.owning_key());
        let keypair = Arc::new(keypair);
        let vault = Arc::new(Vault::new(me.clone()));
        let coordinator = Coordinator::new(
            me.clone(),
            keypair.clone(),
            sessions,
            finality,
            config.clone(),
        );
        let responder = Arc::new(Responder::new(me.clone(), keypair, vault.clone(), config));
        Self {
            me,
            directory,
            vault,
            coordinator,
            responder,
        }
    }

    pub fn me(&self) -> &Party {
        &self.me
    }

    pub fn vault(&self) -> Arc<Vault> {
        self.vault.clone()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Answer inbound sessions from `inbox` on a background task.
    pub fn start_responder(&self, inbox: mpsc::Receiver<Session>) -> JoinHandle<()> {
        self.responder.clone().spawn(inbox)
    }

    pub async fn peers(&self) -> Vec<Party> {
        self.directory.peers(&self.me).await
    }

    /// Issue one obligation: `borrower` owes `value` to `lender`, observed by
    /// `viewer`. This node must be one of the three.
    pub async fn create_obligation(
        &self,
        value: u64,
        viewer: &str,
        lender: &str,
        borrower: &str,
    ) -> Result<SignedTransaction, SettlementError> {
        if value == 0 {
            return Err(SettlementError::InvalidInput(
                "the obligation's value must be positive".into(),
            ));
        }
        let viewer = self.directory.resolve(viewer).await?;
        let lender = self.directory.resolve(lender).await?;
        let borrower = self.directory.resolve(borrower).await?;
        if viewer == lender || viewer == borrower {
            return Err(SettlementError::InvalidInput(
                "the viewer can be neither the lender nor the borrower".into(),
            ));
        }

        let iou = ObligationRecord::new(value, viewer, lender, borrower);
        tracing::debug!(party = %self.me, obligation = %iou.id, value, "issuing obligation");
        let tx = Transaction::builder(Action::Create)
            .signers_of(iou.participants())
            .output(iou)
            .build();
        self.coordinator.propose(tx).await
    }

    /// Net every unconsumed obligation between this node and `counterparty`,
    /// observed by `viewer` and created within `range`, into one settlement.
    pub async fn compensate(
        &self,
        viewer: &str,
        counterparty: &str,
        range: DateRange,
    ) -> Result<SignedTransaction, SettlementError> {
        let viewer = self.directory.resolve(viewer).await?;
        let counterparty = self.directory.resolve(counterparty).await?;
        if counterparty == self.me {
            return Err(SettlementError::InvalidInput(
                "cannot compensate with yourself".into(),
            ));
        }

        let filter = ObligationFilter::Between {
            a: self.me.clone(),
            b: counterparty.clone(),
            range,
        };
        let selection: Vec<ObligationRecord> = self
            .vault
            .obligations(&filter, RecordStatus::Unconsumed)
            .await
            .into_iter()
            .filter(|iou| iou.viewer == viewer)
            .collect();
        if selection.is_empty() {
            return Err(SettlementError::InvalidInput(format!(
                "nothing to compensate between {} and {}",
                counterparty, self.me
            )));
        }

        let position = net(&selection, &self.me, &counterparty)?;
        let ipu = SettlementRecord::new(position.amount, viewer, position.payer, position.loaner);
        tracing::debug!(
            party = %self.me,
            counterparty = %counterparty,
            obligations = selection.len(),
            amount = ipu.value,
            "compensating"
        );

        let mut builder = Transaction::builder(Action::Settle).signers_of(ipu.participants());
        for iou in selection {
            builder = builder.input(iou);
        }
        self.coordinator.propose(builder.output(ipu).build()).await
    }

    pub async fn obligations(&self, status: RecordStatus) -> Vec<ObligationRecord> {
        self.vault.obligations(&ObligationFilter::All, status).await
    }

    pub async fn obligations_by_role(
        &self,
        role: PartyRole,
        party: &str,
        status: RecordStatus,
    ) -> Result<Vec<ObligationRecord>, SettlementError> {
        let party = self.directory.resolve(party).await?;
        Ok(self
            .vault
            .obligations(&ObligationFilter::ByRole { role, party }, status)
            .await)
    }

    pub async fn obligations_between(
        &self,
        a: &str,
        b: &str,
        range: DateRange,
        status: RecordStatus,
    ) -> Result<Vec<ObligationRecord>, SettlementError> {
        let a = self.directory.resolve(a).await?;
        let b = self.directory.resolve(b).await?;
        Ok(self
            .vault
            .obligations(&ObligationFilter::Between { a, b, range }, status)
            .await)
    }

    pub async fn settlements(&self, status: RecordStatus) -> Vec<SettlementRecord> {
        self.vault.settlements(status).await
    }
}
