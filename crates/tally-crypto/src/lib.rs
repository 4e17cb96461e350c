pub mod error;
pub mod keys;
pub mod signing;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey};
pub use signing::{
    sign, sign_transaction, verify, verify_transaction_signature, Signature, TransactionSignature,
};
