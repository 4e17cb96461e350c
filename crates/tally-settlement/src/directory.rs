use async_trait::async_trait;
use dashmap::DashMap;
use tally_core::types::canonical_name;
use tally_core::Party;

use crate::error::SettlementError;
use crate::traits::PartyDirectory;

#[derive(Debug, Clone)]
struct DirectoryEntry {
    party: Party,
    notary: bool,
}

/// Network map of every party known to this process, keyed by canonical name.
pub struct InMemoryDirectory {
    entries: DashMap<String, DirectoryEntry>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a participant party. Re-registering a name replaces its handle.
    pub fn register(&self, party: Party) {
        tracing::debug!(party = %party, "party registered in directory");
        self.entries.insert(
            party.canonical_name(),
            DirectoryEntry {
                party,
                notary: false,
            },
        );
    }

    /// Register a notary service. Notaries resolve but are never peers.
    pub fn register_notary(&self, party: Party) {
        self.entries.insert(
            party.canonical_name(),
            DirectoryEntry {
                party,
                notary: true,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartyDirectory for InMemoryDirectory {
    async fn resolve(&self, name: &str) -> Result<Party, SettlementError> {
        let key = canonical_name(name);
        if key.is_empty() {
            return Err(SettlementError::InvalidInput(
                "party name is missing".into(),
            ));
        }
        self.entries
            .get(&key)
            .map(|entry| entry.party.clone())
            .ok_or_else(|| SettlementError::UnresolvedParty(name.trim().to_string()))
    }

    async fn peers(&self, me: &Party) -> Vec<Party> {
        let mut peers: Vec<Party> = self
            .entries
            .iter()
            .filter(|entry| !entry.notary && entry.party != *me)
            .map(|entry| entry.party.clone())
            .collect();
        peers.sort_by_key(|p| p.canonical_name());
        peers
    }
}
