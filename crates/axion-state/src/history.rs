//! Append-only per-(block, tx-index) history of account changes.

use crate::error::StateError;
use axion_storage::{schema, AccountMetadata, KvStore};
use axion_types::{Address, Hash};
use std::collections::HashMap;
use std::sync::Arc;

/// Writer/reader for the history store. One metadata row per (account,
/// block, tx-index) with metadata changes, one row per modified slot.
/// Nothing is ever deleted during normal block application.
pub struct HistoryDb {
    disk: Arc<dyn KvStore>,
}

impl HistoryDb {
    pub fn new(disk: Arc<dyn KvStore>) -> Self {
        Self { disk }
    }

    /// The underlying key-value disk database.
    pub fn disk(&self) -> &Arc<dyn KvStore> {
        &self.disk
    }

    /// Flush one account's per-transaction records for a block. The whole
    /// write is one atomic batch; on failure no row of the block lands.
    pub fn commit_account(
        &self,
        addr: &Address,
        block_number: u64,
        storage_record: &HashMap<u32, HashMap<Hash, Hash>>,
        metadata_record: &HashMap<u32, AccountMetadata>,
    ) -> Result<(), StateError> {
        let mut batch = self.disk.new_batch();
        for (tx_index, metadata) in metadata_record {
            let key = schema::history_metadata_key(addr, block_number, *tx_index);
            batch.put(&key, &metadata.to_bytes()?);
        }
        for (tx_index, slots) in storage_record {
            for (slot, value) in slots {
                let key = schema::history_storage_key(addr, slot, block_number, *tx_index);
                batch.put(&key, value.as_bytes());
            }
        }
        batch.write()?;
        Ok(())
    }

    /// Post-image metadata of an account at exactly (block, tx-index), if
    /// that transaction touched the account's metadata.
    pub fn metadata_at(
        &self,
        addr: &Address,
        block_number: u64,
        tx_index: u32,
    ) -> Result<Option<AccountMetadata>, StateError> {
        let key = schema::history_metadata_key(addr, block_number, tx_index);
        match self.disk.get(&key)? {
            Some(bytes) => Ok(Some(AccountMetadata::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The slots modified by (block, tx-index) with their new values.
    pub fn storage_changes(
        &self,
        addr: &Address,
        block_number: u64,
        tx_index: u32,
    ) -> Result<HashMap<Hash, Hash>, StateError> {
        let mut changes = HashMap::new();
        for row in self.disk.iter_prefix(addr.as_bytes(), &[]) {
            let (key, value) = row?;
            if let Some((slot, bn, txi)) = schema::parse_history_storage_key(addr, &key) {
                if bn == block_number && txi == tx_index {
                    changes.insert(slot, Hash::from_slice(&value).unwrap_or(Hash::ZERO));
                }
            }
        }
        Ok(changes)
    }

    /// Replay every history row of an account in (block, tx-index) order,
    /// reconstructing the latest metadata and storage image. Returns `None`
    /// for an account with no history.
    pub fn reconstruct_account(
        &self,
        addr: &Address,
    ) -> Result<Option<(AccountMetadata, HashMap<Hash, Hash>)>, StateError> {
        let mut metadata: Option<((u64, u32), AccountMetadata)> = None;
        let mut storage: HashMap<Hash, ((u64, u32), Hash)> = HashMap::new();

        for row in self.disk.iter_prefix(addr.as_bytes(), &[]) {
            let (key, value) = row?;
            if let Some((bn, txi)) = schema::parse_history_metadata_key(addr, &key) {
                let record = AccountMetadata::from_bytes(&value)?;
                if metadata.as_ref().map_or(true, |(pos, _)| *pos <= (bn, txi)) {
                    metadata = Some(((bn, txi), record));
                }
            } else if let Some((slot, bn, txi)) = schema::parse_history_storage_key(addr, &key) {
                let new = Hash::from_slice(&value).unwrap_or(Hash::ZERO);
                let entry = storage.entry(slot).or_insert(((bn, txi), new));
                if entry.0 <= (bn, txi) {
                    *entry = ((bn, txi), new);
                }
            }
        }

        match metadata {
            Some((_, meta)) => {
                let image = storage.into_iter().map(|(k, (_, v))| (k, v)).collect();
                Ok(Some((meta, image)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axion_storage::MemoryKv;
    use axion_types::{U256, EMPTY_CODE_HASH};

    fn history_db() -> HistoryDb {
        HistoryDb::new(Arc::new(MemoryKv::new()))
    }

    fn meta(nonce: u64, balance: u64) -> AccountMetadata {
        AccountMetadata {
            nonce,
            balance: U256::from(balance),
            code_hash: EMPTY_CODE_HASH,
            code: None,
        }
    }

    #[test]
    fn test_commit_and_read_back() {
        let db = history_db();
        let addr = Address::from_bytes([1; 20]);

        let mut metadata_record = HashMap::new();
        metadata_record.insert(0u32, meta(1, 100));
        metadata_record.insert(2u32, meta(2, 50));

        let slot = Hash::compute(b"slot");
        let mut storage_record = HashMap::new();
        let mut tx0 = HashMap::new();
        tx0.insert(slot, Hash::compute(b"v0"));
        storage_record.insert(0u32, tx0);

        db.commit_account(&addr, 5, &storage_record, &metadata_record)
            .unwrap();

        assert_eq!(db.metadata_at(&addr, 5, 0).unwrap(), Some(meta(1, 100)));
        assert_eq!(db.metadata_at(&addr, 5, 1).unwrap(), None);
        assert_eq!(db.metadata_at(&addr, 5, 2).unwrap(), Some(meta(2, 50)));

        let changes = db.storage_changes(&addr, 5, 0).unwrap();
        assert_eq!(changes.get(&slot), Some(&Hash::compute(b"v0")));
        assert!(db.storage_changes(&addr, 5, 1).unwrap().is_empty());
    }

    #[test]
    fn test_reconstruct_takes_latest_position() {
        let db = history_db();
        let addr = Address::from_bytes([2; 20]);
        let slot = Hash::compute(b"slot");

        // Block 1, tx 0: balance 10, slot = a
        let mut mr = HashMap::new();
        mr.insert(0u32, meta(0, 10));
        let mut sr = HashMap::new();
        let mut slots = HashMap::new();
        slots.insert(slot, Hash::compute(b"a"));
        sr.insert(0u32, slots);
        db.commit_account(&addr, 1, &sr, &mr).unwrap();

        // Block 2, tx 3: balance 20, slot = b
        let mut mr = HashMap::new();
        mr.insert(3u32, meta(1, 20));
        let mut sr = HashMap::new();
        let mut slots = HashMap::new();
        slots.insert(slot, Hash::compute(b"b"));
        sr.insert(3u32, slots);
        db.commit_account(&addr, 2, &sr, &mr).unwrap();

        let (metadata, storage) = db.reconstruct_account(&addr).unwrap().unwrap();
        assert_eq!(metadata, meta(1, 20));
        assert_eq!(storage.get(&slot), Some(&Hash::compute(b"b")));
    }

    #[test]
    fn test_reconstruct_missing_account() {
        let db = history_db();
        assert!(db
            .reconstruct_account(&Address::from_bytes([3; 20]))
            .unwrap()
            .is_none());
    }
}
