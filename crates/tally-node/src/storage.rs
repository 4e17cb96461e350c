//! RocksDB storage backend for the Tally node.

use anyhow::Result;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::path::Path;
use tally_crypto::KeyPair;
use tally_settlement::SignedTransaction;
use zeroize::Zeroize;

/// Committed transactions, keyed by big-endian commit sequence number.
const CF_TRANSACTIONS: &str = "transactions";
/// Ed25519 seeds of hosted parties, keyed by canonical name.
const CF_IDENTITIES: &str = "identities";

/// RocksDB-backed storage for the Tally node.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_IDENTITIES, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    /// Put a value into a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Get a value from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        let value = self.db.get_cf(&cf, key)?;
        Ok(value)
    }

    /// Delete a key from a column family.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    /// Journal a committed transaction at position `seq`.
    pub fn append_transaction(&self, seq: u64, signed: &SignedTransaction) -> Result<()> {
        let data = serde_json::to_vec(signed)?;
        self.put(CF_TRANSACTIONS, &seq.to_be_bytes(), &data)
    }

    /// Every journaled transaction, in commit order.
    pub fn transactions(&self) -> Result<Vec<SignedTransaction>> {
        let cf = self
            .db
            .cf_handle(CF_TRANSACTIONS)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", CF_TRANSACTIONS))?;
        let mut journal = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            journal.push(serde_json::from_slice(&value)?);
        }
        Ok(journal)
    }

    /// Number of journaled transactions.
    pub fn transaction_count(&self) -> Result<usize> {
        let cf = self
            .db
            .cf_handle(CF_TRANSACTIONS)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", CF_TRANSACTIONS))?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Store a party's signing key.
    pub fn put_identity(&self, canonical_name: &str, keypair: &KeyPair) -> Result<()> {
        let mut seed = keypair.secret_bytes();
        let result = self.put(CF_IDENTITIES, canonical_name.as_bytes(), &seed);
        seed.zeroize();
        result
    }

    /// Get a party's signing key.
    pub fn get_identity(&self, canonical_name: &str) -> Result<Option<KeyPair>> {
        match self.get(CF_IDENTITIES, canonical_name.as_bytes())? {
            Some(mut seed) => {
                let keypair = KeyPair::from_bytes(&seed);
                seed.zeroize();
                Ok(Some(keypair?))
            }
            None => Ok(None),
        }
    }

    /// Load a party's signing key, or generate and store a new one.
    pub fn load_or_generate_keypair(&self, canonical_name: &str) -> Result<KeyPair> {
        if let Some(keypair) = self.get_identity(canonical_name)? {
            tracing::debug!(party = canonical_name, "loaded signing key");
            return Ok(keypair);
        }
        let keypair = KeyPair::generate();
        self.put_identity(canonical_name, &keypair)?;
        tracing::info!(party = canonical_name, "generated and saved new signing key");
        Ok(keypair)
    }
}
