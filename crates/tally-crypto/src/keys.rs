use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use tally_core::OwningKey;
use zeroize::Zeroize;

use crate::error::CryptoError;

const SEED_LEN: usize = 32;

/// The Ed25519 identity a hosted party signs transactions with.
///
/// The node persists only the seed; the owning key published in party
/// handles is derived from it.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// A fresh identity from OS entropy.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore an identity from its seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Restore an identity from a stored seed of unchecked length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut seed: [u8; SEED_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SEED_LEN,
                actual: bytes.len(),
            })?;
        let keypair = Self::from_seed(&seed);
        seed.zeroize();
        Ok(keypair)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Key that party handles for this identity carry.
    pub fn owning_key(&self) -> OwningKey {
        self.public_key().to_owning_key()
    }

    /// The seed, for persisting. Callers zeroize their copy.
    pub fn secret_bytes(&self) -> [u8; SEED_LEN] {
        self.signing_key.to_bytes()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// Verifying half of a party's identity, recovered from its owning key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Parse the hex-encoded key carried by a party handle.
    pub fn from_owning_key(key: &OwningKey) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key.as_str()).map_err(|e| {
            CryptoError::InvalidInput(format!("owning key {} is not hex: {}", key, e))
        })?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        let verifying_key = VerifyingKey::from_bytes(&bytes).map_err(|e| {
            CryptoError::InvalidInput(format!("owning key {} is not a point: {}", key, e))
        })?;
        Ok(Self { verifying_key })
    }

    pub fn to_owning_key(&self) -> OwningKey {
        OwningKey::new(hex::encode(self.verifying_key.as_bytes()))
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}
