use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use tally_core::{OwningKey, Transaction, TransactionId};

use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};

/// Ed25519 signature (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    /// Get the raw bytes (64 bytes).
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    /// Create from raw bytes (64 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_arr: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidInput(format!("signature must be 64 bytes, got {}", bytes.len()))
        })?;
        Ok(Self {
            inner: ed25519_dalek::Signature::from_bytes(&bytes_arr),
        })
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode from hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CryptoError::InvalidInput(format!("invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

/// Sign a message using Ed25519.
pub fn sign(message: &[u8], keypair: &KeyPair) -> Signature {
    Signature {
        inner: keypair.signing_key().sign(message),
    }
}

/// Verify an Ed25519 signature.
pub fn verify(message: &[u8], signature: &Signature, pubkey: &PublicKey) -> Result<(), CryptoError> {
    pubkey
        .verifying_key()
        .verify(message, &signature.inner)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// A party's signature over a transaction id, as exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    /// The transaction being signed.
    pub tx_id: TransactionId,
    /// Owning key of the signer.
    pub by: OwningKey,
    /// Hex-encoded Ed25519 signature over the id bytes.
    pub signature: String,
}

/// Sign a transaction's id.
pub fn sign_transaction(tx: &Transaction, keypair: &KeyPair) -> TransactionSignature {
    let sig = sign(tx.id.as_bytes(), keypair);
    TransactionSignature {
        tx_id: tx.id,
        by: keypair.owning_key(),
        signature: sig.to_hex(),
    }
}

/// Verify that `sig` is a valid signature by `sig.by` over `tx`'s id.
pub fn verify_transaction_signature(
    tx: &Transaction,
    sig: &TransactionSignature,
) -> Result<(), CryptoError> {
    if sig.tx_id != tx.id {
        return Err(CryptoError::SignatureForOtherTransaction {
            signer: sig.by.to_string(),
            tx_id: tx.id.to_hex(),
        });
    }
    let pubkey = PublicKey::from_owning_key(&sig.by)?;
    let signature = Signature::from_hex(&sig.signature)?;
    verify(tx.id.as_bytes(), &signature, &pubkey).map_err(|e| {
        tracing::debug!(tx_id = %tx.id, signer = %sig.by, "transaction signature rejected");
        e
    })
}
