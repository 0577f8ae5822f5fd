//! Per-account in-memory handle used during block execution.

use crate::cached_db::CachingDb;
use crate::error::StateError;
use crate::history::HistoryDb;
use axion_storage::AccountMetadata;
use axion_types::{Address, Hash, StateAccount, U256, EMPTY_CODE_HASH};
use std::collections::{BTreeMap, HashMap};

/// Cache of one account's state while a block executes.
///
/// Storage reads resolve dirty → pending → origin → the rows loaded with the
/// account; the first hit defines the value. `dirty` holds the in-flight
/// transaction's writes and is drained into `pending` by `finalise` at every
/// transaction boundary. `storage_record` and `metadata_record` accumulate
/// the per-transaction post-images that feed the history store.
#[derive(Clone, Debug)]
pub struct StateObject {
    address: Address,
    /// Account as loaded from disk; `None` when it did not exist.
    origin: Option<StateAccount>,
    /// Working copy carrying all applied mutations.
    account: StateAccount,
    code: Option<Vec<u8>>,

    origin_storage: HashMap<Hash, Hash>,
    pending_storage: HashMap<Hash, Hash>,
    dirty_storage: HashMap<Hash, Hash>,

    storage_record: HashMap<u32, HashMap<Hash, Hash>>,
    metadata_record: HashMap<u32, AccountMetadata>,

    pub(crate) dirty_code: bool,
    pub(crate) suicided: bool,
    pub(crate) deleted: bool,
}

impl StateObject {
    pub(crate) fn new(address: Address, account: Option<StateAccount>) -> Self {
        Self {
            address,
            origin: account.clone(),
            account: account.unwrap_or_default(),
            code: None,
            origin_storage: HashMap::new(),
            pending_storage: HashMap::new(),
            dirty_storage: HashMap::new(),
            storage_record: HashMap::new(),
            metadata_record: HashMap::new(),
            dirty_code: false,
            suicided: false,
            deleted: false,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn balance(&self) -> U256 {
        self.account.balance
    }

    pub fn nonce(&self) -> u64 {
        self.account.nonce
    }

    pub fn code_hash(&self) -> Hash {
        self.account.code_hash
    }

    /// True when the account existed on disk before this block.
    pub fn existed(&self) -> bool {
        self.origin.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.account.nonce == 0
            && self.account.balance.is_zero()
            && self.account.code_hash == EMPTY_CODE_HASH
            && self.pending_storage.is_empty()
            && self.dirty_storage.is_empty()
            && self.account.storage.is_empty()
    }

    /// Read a slot, dirty layer first.
    pub fn state(&mut self, key: Hash) -> Hash {
        if let Some(value) = self.dirty_storage.get(&key) {
            return *value;
        }
        self.committed_state(key)
    }

    /// Read a slot skipping the in-flight transaction's writes.
    pub fn committed_state(&mut self, key: Hash) -> Hash {
        if let Some(value) = self.pending_storage.get(&key) {
            return *value;
        }
        if let Some(value) = self.origin_storage.get(&key) {
            return *value;
        }
        let value = self
            .account
            .storage
            .get(&key)
            .copied()
            .unwrap_or(Hash::ZERO);
        self.origin_storage.insert(key, value);
        value
    }

    /// Stamp the dirty layer. Journaling and equal-value suppression happen
    /// in the façade.
    pub(crate) fn set_state(&mut self, key: Hash, value: Hash) {
        self.dirty_storage.insert(key, value);
    }

    pub(crate) fn record_storage(&mut self, tx_index: u32, key: Hash, value: Hash) {
        self.storage_record
            .entry(tx_index)
            .or_default()
            .insert(key, value);
    }

    /// Snapshot the post-image of the account metadata for this transaction.
    /// Later touches within the same transaction overwrite the snapshot, so
    /// the record always carries the values as of the last change.
    pub(crate) fn record_metadata(&mut self, tx_index: u32) {
        let code = if self.dirty_code { self.code.clone() } else { None };
        self.metadata_record.insert(
            tx_index,
            AccountMetadata {
                nonce: self.account.nonce,
                balance: self.account.balance,
                code_hash: self.account.code_hash,
                code,
            },
        );
    }

    pub(crate) fn set_balance_raw(&mut self, balance: U256) {
        self.account.balance = balance;
    }

    pub(crate) fn set_nonce_raw(&mut self, nonce: u64) {
        self.account.nonce = nonce;
    }

    pub(crate) fn set_code_raw(&mut self, code_hash: Hash, code: Option<Vec<u8>>) {
        self.code = code;
        self.account.code_hash = code_hash;
        self.dirty_code = true;
    }

    pub(crate) fn mark_suicided(&mut self) {
        self.suicided = true;
    }

    /// The contract's bytecode, loaded from the content-addressed store on
    /// first use. The empty-code sentinel never touches disk.
    pub fn code(&mut self, db: &CachingDb) -> Result<Vec<u8>, StateError> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        if self.account.code_hash == EMPTY_CODE_HASH {
            return Ok(Vec::new());
        }
        let code = db.contract_code(&self.account.code_hash)?;
        self.code = Some(code.clone());
        Ok(code)
    }

    pub fn code_size(&mut self, db: &CachingDb) -> Result<usize, StateError> {
        if let Some(code) = &self.code {
            return Ok(code.len());
        }
        if self.account.code_hash == EMPTY_CODE_HASH {
            return Ok(0);
        }
        db.contract_code_size(&self.account.code_hash)
    }

    /// Promote the in-flight transaction's writes into the pending layer
    /// (last writer wins) and clear the dirty layer.
    pub(crate) fn finalise(&mut self) {
        for (key, value) in self.dirty_storage.drain() {
            self.pending_storage.insert(key, value);
        }
    }

    pub(crate) fn has_dirty_storage(&self) -> bool {
        !self.dirty_storage.is_empty()
    }

    /// Serialise the metadata and emit it with the pending storage to the
    /// current-state store; fold the written slots into the block write-set.
    pub(crate) fn commit(
        &mut self,
        db: &CachingDb,
        write_set: &mut BTreeMap<(Address, Hash), Hash>,
    ) -> Result<(), StateError> {
        let metadata = AccountMetadata {
            nonce: self.account.nonce,
            balance: self.account.balance,
            code_hash: self.account.code_hash,
            code: None,
        };
        for (key, value) in &self.pending_storage {
            write_set.insert((self.address, *key), *value);
        }
        db.commit_account(&self.address, &metadata.to_bytes()?, &self.pending_storage)
    }

    /// Flush the per-transaction records to the history store.
    pub(crate) fn commit_history(
        &self,
        block_number: u64,
        db: &HistoryDb,
    ) -> Result<(), StateError> {
        db.commit_account(
            &self.address,
            block_number,
            &self.storage_record,
            &self.metadata_record,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axion_storage::MemoryKv;
    use std::sync::Arc;

    fn object() -> StateObject {
        StateObject::new(Address::from_bytes([1; 20]), None)
    }

    #[test]
    fn test_layered_reads() {
        let mut account = StateAccount::new();
        let key = Hash::compute(b"key");
        account.storage.insert(key, Hash::compute(b"disk"));
        let mut obj = StateObject::new(Address::from_bytes([1; 20]), Some(account));

        // Nothing dirty or pending: falls through to the loaded rows
        assert_eq!(obj.state(key), Hash::compute(b"disk"));

        // Dirty wins over everything for state, but not for committed reads
        obj.set_state(key, Hash::compute(b"dirty"));
        assert_eq!(obj.state(key), Hash::compute(b"dirty"));
        assert_eq!(obj.committed_state(key), Hash::compute(b"disk"));

        // After finalise the write surfaces in the committed view
        obj.finalise();
        assert_eq!(obj.committed_state(key), Hash::compute(b"dirty"));
        assert!(!obj.has_dirty_storage());
    }

    #[test]
    fn test_unset_slot_reads_zero() {
        let mut obj = object();
        assert_eq!(obj.state(Hash::compute(b"missing")), Hash::ZERO);
    }

    #[test]
    fn test_finalise_idempotent() {
        let mut obj = object();
        let key = Hash::compute(b"k");
        obj.set_state(key, Hash::compute(b"v"));
        obj.finalise();
        let snapshot = obj.pending_storage.clone();
        obj.finalise();
        assert_eq!(obj.pending_storage, snapshot);
    }

    #[test]
    fn test_code_sentinel_skips_disk() {
        let db = CachingDb::new(Arc::new(MemoryKv::new()));
        let mut obj = object();
        assert_eq!(obj.code(&db).unwrap(), Vec::<u8>::new());
        assert_eq!(obj.code_size(&db).unwrap(), 0);
    }

    #[test]
    fn test_metadata_record_post_image() {
        let mut obj = object();
        obj.set_nonce_raw(1);
        obj.record_metadata(0);
        obj.set_balance_raw(U256::from(50u64));
        obj.record_metadata(0);

        let record = obj.metadata_record.get(&0).unwrap();
        assert_eq!(record.nonce, 1);
        assert_eq!(record.balance, U256::from(50u64));
    }

    #[test]
    fn test_empty_detection() {
        let mut obj = object();
        assert!(obj.is_empty());
        obj.set_balance_raw(U256::ONE);
        assert!(!obj.is_empty());
        obj.set_balance_raw(U256::ZERO);
        obj.set_state(Hash::ZERO, Hash::compute(b"x"));
        assert!(!obj.is_empty());
    }
}
