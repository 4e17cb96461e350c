use crate::coordination::CoordinationState;
use crate::types::RecordId;

/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: CoordinationState,
        to: CoordinationState,
    },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("nothing to net: no obligations were selected")]
    NothingToNet,

    #[error("obligation {id} is not between the two netting parties")]
    ForeignObligation { id: RecordId },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("party {0} plays no role in the transaction")]
    NotAParticipant(String),

    #[error("invalid transaction id: {0}")]
    InvalidTransactionId(String),
}

/// Rule violations reported by the settlement contract.
///
/// Each variant is one rule; its message is what callers surface verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("No inputs should be consumed when issuing an obligation.")]
    CreateConsumesInputs,

    #[error("Only one output state should be created.")]
    CreateOutputCount,

    #[error("The lender and the borrower cannot be the same entity.")]
    LenderIsBorrower,

    #[error("The obligation's value must be positive.")]
    NonPositiveValue,

    #[error("One input should be at least consumed when issuing a settlement.")]
    NoObligationInputs,

    #[error("Only one settlement output should be created.")]
    SettlementOutputCount,

    #[error("There are invalid output states.")]
    InvalidOutputs,

    #[error("There are invalid input states.")]
    InvalidInputs,

    #[error("All of the participants must be signers.")]
    MissingSigners,

    #[error("In input obligations the viewer, lender and the borrower cannot be the same entity.")]
    InputPartiesNotDistinct,

    #[error("In the output settlement the viewer, payer and the loaner cannot be the same entity.")]
    OutputPartiesNotDistinct,

    #[error("All of the viewers must be the same entity.")]
    ViewerMismatch,

    #[error("All of the input participants must be equal to output participants.")]
    PartyClosure,

    #[error("Every party must keep its owning key from the inputs to the output.")]
    PartyKeyMismatch,

    #[error("The compensation is not valid: the payer is owed more than it owes.")]
    CompensationDirection,

    #[error("The compensation is not valid: expected {expected}, settlement carries {actual}.")]
    CompensationAmount { expected: u128, actual: u64 },

    #[error("Invalid contract action in transaction: {0}")]
    UnknownAction(String),
}
