use tally_core::{ContractError, CoreError, RecordId};
use tally_crypto::CryptoError;

/// Settlement-layer errors.
///
/// Every variant is surfaced to the boundary caller with its message.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("party named {0} cannot be found")]
    UnresolvedParty(String),

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ContractError),

    #[error("{party} refused to sign: {reason}")]
    SignatureRefused { party: String, reason: String },

    #[error("record {record} was already consumed by transaction {consumed_by}")]
    ConflictingConsumption { record: RecordId, consumed_by: String },

    #[error("communication failure: {0}")]
    CommunicationFailure(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    /// Whether re-invoking the operation with a fresh selection may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConflictingConsumption { .. } | Self::CommunicationFailure(_)
        )
    }
}

impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NothingToNet => Self::InvalidInput("nothing to compensate".into()),
            CoreError::InvalidStateTransition { .. } => Self::Internal(err.to_string()),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

impl From<CryptoError> for SettlementError {
    fn from(err: CryptoError) -> Self {
        Self::InvalidSignature(err.to_string())
    }
}
