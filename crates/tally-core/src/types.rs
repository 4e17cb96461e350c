use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::error::CoreError;

/// Canonical form of a party name: trimmed and ASCII-lowercased.
pub fn canonical_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Hex-encoded Ed25519 public key that signs on behalf of a party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwningKey(pub String);

impl OwningKey {
    /// Create from a hex string.
    pub fn new(hex_key: impl Into<String>) -> Self {
        Self(hex_key.into())
    }

    /// Get the hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A globally resolvable party handle.
///
/// Two handles denote the same party iff their canonical names are equal.
/// `PartialEq` and `Hash` are both defined over the canonical name, so a
/// handle that went through serialization still compares equal to the
/// original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    name: String,
    owning_key: OwningKey,
}

impl Party {
    /// Create a new party handle.
    pub fn new(name: impl Into<String>, owning_key: OwningKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }

    /// Display name as registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key that must sign for this party.
    pub fn owning_key(&self) -> &OwningKey {
        &self.owning_key
    }

    /// Canonical identity string.
    pub fn canonical_name(&self) -> String {
        canonical_name(&self.name)
    }

    /// Whether this handle denotes the party registered under `name`.
    pub fn is_named(&self, name: &str) -> bool {
        self.canonical_name() == canonical_name(name)
    }

    /// Same party and the same owning key. Plain `==` ignores the key.
    pub fn is_same_identity(&self, other: &Party) -> bool {
        self == other && self.owning_key == other.owning_key
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_name() == other.canonical_name()
    }
}

impl Eq for Party {}

impl Hash for Party {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_name().hash(state);
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Unique identifier for a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Create a new record ID (time-ordered UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BLAKE3 digest of a transaction's signing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub [u8; 32]);

impl TransactionId {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CoreError::InvalidTransactionId(format!("invalid hex: {}", e)))?;
        let digest: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CoreError::InvalidTransactionId(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(digest))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
