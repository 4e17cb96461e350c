/// Cryptographic operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("signature by {signer} is not for transaction {tx_id}")]
    SignatureForOtherTransaction { signer: String, tx_id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
