use std::fmt;

use crate::error::CoreError;
use crate::transaction::{Action, Transaction};
use crate::types::Party;

/// The states of one coordination attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CoordinationState {
    /// The proposer is assembling the transaction.
    Building,
    /// The contract accepted the transaction locally.
    LocallyValidated,
    /// The proposer has signed and is soliciting counterparties.
    CollectingSignatures,
    /// All signatures gathered, submitted for finality.
    Finalizing,
    /// Finality confirmed. Final state.
    Committed,
    /// The attempt was abandoned. Final state.
    Rejected,
}

impl CoordinationState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }
}

impl fmt::Display for CoordinationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "Building"),
            Self::LocallyValidated => write!(f, "LocallyValidated"),
            Self::CollectingSignatures => write!(f, "CollectingSignatures"),
            Self::Finalizing => write!(f, "Finalizing"),
            Self::Committed => write!(f, "Committed"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Events that trigger state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinationEvent {
    /// The contract accepted the proposal.
    LocalValidationPassed,
    /// The proposer attached its own signature.
    ProposerSigned,
    /// Every required signer has signed.
    AllSignaturesGathered,
    /// The finality service committed the transaction.
    Committed,
    /// Validation, a counterparty, a session or finality failed.
    Rejected,
}

/// Drives a coordination attempt through its states.
///
/// Valid transitions:
/// - Building → LocallyValidated (LocalValidationPassed)
/// - LocallyValidated → CollectingSignatures (ProposerSigned)
/// - CollectingSignatures → Finalizing (AllSignaturesGathered)
/// - Finalizing → Committed (Committed)
/// - any non-final state → Rejected (Rejected)
pub struct CoordinationStateMachine;

impl CoordinationStateMachine {
    /// Attempt a state transition based on an event.
    pub fn transition(
        current: CoordinationState,
        event: CoordinationEvent,
    ) -> Result<CoordinationState, CoreError> {
        use CoordinationEvent as E;
        use CoordinationState as S;

        let new_state = match (current, event) {
            (S::Building, E::LocalValidationPassed) => S::LocallyValidated,
            (S::LocallyValidated, E::ProposerSigned) => S::CollectingSignatures,
            (S::CollectingSignatures, E::AllSignaturesGathered) => S::Finalizing,
            (S::Finalizing, E::Committed) => S::Committed,
            (state, E::Rejected) if !state.is_final() => S::Rejected,
            _ => {
                let target = match event {
                    E::LocalValidationPassed => S::LocallyValidated,
                    E::ProposerSigned => S::CollectingSignatures,
                    E::AllSignaturesGathered => S::Finalizing,
                    E::Committed => S::Committed,
                    E::Rejected => S::Rejected,
                };
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "coordination state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: CoordinationState, event: CoordinationEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

/// The role a party plays in a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Role {
    Viewer,
    Payer,
    Loaner,
}

impl Role {
    /// The two roles a proposer in this role solicits, in session order.
    pub fn counterparts(&self) -> [Role; 2] {
        match self {
            Self::Viewer => [Self::Loaner, Self::Payer],
            Self::Payer => [Self::Viewer, Self::Loaner],
            Self::Loaner => [Self::Viewer, Self::Payer],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viewer => write!(f, "viewer"),
            Self::Payer => write!(f, "payer"),
            Self::Loaner => write!(f, "loaner"),
        }
    }
}

/// The three parties of a transaction, keyed by role.
///
/// For a Create transaction the lender plays the loaner and the borrower
/// plays the payer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participants {
    pub viewer: Party,
    pub payer: Party,
    pub loaner: Party,
}

impl Participants {
    /// Derive the participants from the transaction's single output.
    pub fn of(tx: &Transaction) -> Result<Self, CoreError> {
        match tx.action {
            Action::Create => {
                let out = tx.obligation_outputs().into_iter().next().ok_or_else(|| {
                    CoreError::MissingField("obligation output".into())
                })?;
                Ok(Self {
                    viewer: out.viewer.clone(),
                    payer: out.borrower.clone(),
                    loaner: out.lender.clone(),
                })
            }
            Action::Settle => {
                let out = tx.settlement_outputs().into_iter().next().ok_or_else(|| {
                    CoreError::MissingField("settlement output".into())
                })?;
                Ok(Self {
                    viewer: out.viewer.clone(),
                    payer: out.payer.clone(),
                    loaner: out.loaner.clone(),
                })
            }
            Action::Other(ref name) => Err(CoreError::ValidationError(format!(
                "no participants for action {}",
                name
            ))),
        }
    }

    /// The party playing `role`.
    pub fn party(&self, role: Role) -> &Party {
        match role {
            Role::Viewer => &self.viewer,
            Role::Payer => &self.payer,
            Role::Loaner => &self.loaner,
        }
    }

    /// The role `party` plays, if any. Viewer is checked first.
    pub fn role_of(&self, party: &Party) -> Option<Role> {
        [Role::Viewer, Role::Payer, Role::Loaner]
            .into_iter()
            .find(|role| self.party(*role) == party)
    }

    /// The parties `proposer` must solicit, in session order. Fails unless
    /// the three roles are held by three distinct parties.
    pub fn solicitation_order(&self, proposer: &Party) -> Result<[&Party; 2], CoreError> {
        let role = self
            .role_of(proposer)
            .ok_or_else(|| CoreError::NotAParticipant(proposer.to_string()))?;
        let [first, second] = role.counterparts();
        let order = [self.party(first), self.party(second)];
        if order.contains(&proposer) || order[0] == order[1] {
            return Err(CoreError::ValidationError(
                "viewer, payer and loaner must be distinct parties".into(),
            ));
        }
        Ok(order)
    }
}
