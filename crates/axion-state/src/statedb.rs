//! Top-level state façade: account lookup, reads and journaled writes,
//! snapshot/revert, finalise and the block commit.

use crate::access_list::{AccessList, AccessListItem};
use crate::cached_db::CachingDb;
use crate::error::StateError;
use crate::history::HistoryDb;
use crate::journal::{Journal, JournalEntry};
use crate::object::StateObject;
use axion_types::{Address, Hash, Log, U256, EMPTY_CODE_HASH};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A snapshot id bound to a journal offset.
#[derive(Debug, Clone, Copy)]
struct Revision {
    id: usize,
    journal_index: usize,
}

/// Mutable account state across one block of transactions.
///
/// Single-writer: one execution thread applies transactions sequentially.
/// `copy` hands off an independent view. Disk writes happen only in
/// `commit`, once per block.
pub struct StateDb {
    current: Arc<CachingDb>,
    history: Arc<HistoryDb>,

    pub(crate) objects: HashMap<Address, StateObject>,
    /// Finalised but not yet committed this block.
    pending: HashSet<Address>,
    /// Modified in the current block.
    dirty: HashSet<Address>,

    pub(crate) journal: Journal,
    revisions: Vec<Revision>,
    next_revision_id: usize,

    pub(crate) access_list: AccessList,

    /// Block-level write-set; ordered by (address, key) so the commit digest
    /// is identical across peers.
    write_set: BTreeMap<(Address, Hash), Hash>,

    pub(crate) logs: HashMap<Hash, Vec<Log>>,

    tx_hash: Hash,
    tx_index: usize,
    block_number: u64,

    pub(crate) refund: u64,

    db_err: Option<StateError>,
}

impl StateDb {
    pub fn new(current: Arc<CachingDb>, history: Arc<HistoryDb>) -> Self {
        Self {
            current,
            history,
            objects: HashMap::new(),
            pending: HashSet::new(),
            dirty: HashSet::new(),
            journal: Journal::new(),
            revisions: Vec::new(),
            next_revision_id: 0,
            access_list: AccessList::new(),
            write_set: BTreeMap::new(),
            logs: HashMap::new(),
            tx_hash: Hash::ZERO,
            tx_index: 0,
            block_number: 0,
            refund: 0,
            db_err: None,
        }
    }

    /// Deep, independent copy. Snapshots taken on the original cannot be
    /// reverted on the copy.
    pub fn copy(&self) -> Self {
        let mut objects = HashMap::new();
        for addr in self.journal.dirty_addresses() {
            if let Some(obj) = self.objects.get(&addr) {
                objects.insert(addr, obj.clone());
            }
        }
        for addr in self.pending.iter().chain(self.dirty.iter()) {
            if !objects.contains_key(addr) {
                if let Some(obj) = self.objects.get(addr) {
                    objects.insert(*addr, obj.clone());
                }
            }
        }
        Self {
            current: Arc::clone(&self.current),
            history: Arc::clone(&self.history),
            objects,
            pending: self.pending.clone(),
            dirty: self.dirty.clone(),
            journal: Journal::new(),
            revisions: Vec::new(),
            next_revision_id: 0,
            access_list: self.access_list.clone(),
            write_set: self.write_set.clone(),
            logs: self.logs.clone(),
            tx_hash: self.tx_hash,
            tx_index: self.tx_index,
            block_number: self.block_number,
            refund: self.refund,
            db_err: self.db_err.clone(),
        }
    }

    // ---- object plumbing ----

    fn ensure_loaded(&mut self, addr: Address) {
        if self.objects.contains_key(&addr) {
            return;
        }
        match self.current.get_account(&addr) {
            Ok(Some(account)) => {
                self.objects.insert(addr, StateObject::new(addr, Some(account)));
            }
            Ok(None) => {}
            Err(e) => self.set_error(e),
        }
    }

    fn object_mut(&mut self, addr: Address) -> Option<&mut StateObject> {
        self.ensure_loaded(addr);
        self.objects.get_mut(&addr).filter(|o| !o.deleted)
    }

    /// Replace whatever lives at `addr` with a fresh object, journaling the
    /// displaced one. Returns the live predecessor's balance.
    fn create_object(&mut self, addr: Address) -> Option<U256> {
        self.ensure_loaded(addr);
        let prev = self.objects.remove(&addr);
        let live_balance = prev
            .as_ref()
            .filter(|o| !o.deleted)
            .map(|o| o.balance());
        self.journal.append(JournalEntry::AccountCreated {
            account: addr,
            prev: prev.map(Box::new),
        });
        self.objects.insert(addr, StateObject::new(addr, None));
        live_balance
    }

    fn ensure_object(&mut self, addr: Address) {
        if self.object_mut(addr).is_none() {
            self.create_object(addr);
        }
    }

    // ---- reads ----

    pub fn get_state(&mut self, addr: Address, key: Hash) -> Hash {
        match self.object_mut(addr) {
            Some(obj) => obj.state(key),
            None => Hash::ZERO,
        }
    }

    pub fn get_committed_state(&mut self, addr: Address, key: Hash) -> Hash {
        match self.object_mut(addr) {
            Some(obj) => obj.committed_state(key),
            None => Hash::ZERO,
        }
    }

    pub fn get_balance(&mut self, addr: Address) -> U256 {
        self.object_mut(addr).map(|o| o.balance()).unwrap_or(U256::ZERO)
    }

    pub fn get_nonce(&mut self, addr: Address) -> u64 {
        self.object_mut(addr).map(|o| o.nonce()).unwrap_or(0)
    }

    pub fn get_code_hash(&mut self, addr: Address) -> Hash {
        self.object_mut(addr).map(|o| o.code_hash()).unwrap_or(Hash::ZERO)
    }

    pub fn get_code(&mut self, addr: Address) -> Vec<u8> {
        self.ensure_loaded(addr);
        let result = match self.objects.get_mut(&addr).filter(|o| !o.deleted) {
            Some(obj) => obj.code(&self.current),
            None => return Vec::new(),
        };
        match result {
            Ok(code) => code,
            Err(e) => {
                self.set_error(e);
                Vec::new()
            }
        }
    }

    pub fn get_code_size(&mut self, addr: Address) -> usize {
        self.ensure_loaded(addr);
        let result = match self.objects.get_mut(&addr).filter(|o| !o.deleted) {
            Some(obj) => obj.code_size(&self.current),
            None => return 0,
        };
        match result {
            Ok(size) => size,
            Err(e) => {
                self.set_error(e);
                0
            }
        }
    }

    pub fn exists(&mut self, addr: Address) -> bool {
        self.object_mut(addr).is_some()
    }

    /// Non-existent or empty (nonce = balance = code = storage = 0).
    pub fn empty(&mut self, addr: Address) -> bool {
        self.object_mut(addr).map(|o| o.is_empty()).unwrap_or(true)
    }

    // ---- journaled writes ----

    pub fn set_state(&mut self, addr: Address, key: Hash, value: Hash) {
        self.ensure_object(addr);
        let prev = match self.objects.get_mut(&addr) {
            Some(obj) => obj.state(key),
            None => return,
        };
        if prev == value {
            return;
        }
        self.journal.append(JournalEntry::StorageChange {
            account: addr,
            key,
            prev,
        });
        let tx_index = self.tx_index as u32;
        if let Some(obj) = self.objects.get_mut(&addr) {
            obj.record_storage(tx_index, key, value);
            obj.set_state(key, value);
        }
    }

    pub fn set_balance(&mut self, addr: Address, amount: U256) {
        self.ensure_object(addr);
        let prev = match self.objects.get(&addr) {
            Some(obj) => obj.balance(),
            None => return,
        };
        self.journal.append(JournalEntry::BalanceChange {
            account: addr,
            prev,
        });
        let tx_index = self.tx_index as u32;
        if let Some(obj) = self.objects.get_mut(&addr) {
            obj.set_balance_raw(amount);
            obj.record_metadata(tx_index);
        }
    }

    pub fn add_balance(&mut self, addr: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let balance = self.get_balance(addr);
        self.set_balance(addr, balance.saturating_add(&amount));
    }

    /// Decrease a balance. Negative balances are forbidden; an underflow is
    /// memoised as an error instead of wrapping, and the balance is left
    /// unchanged.
    pub fn sub_balance(&mut self, addr: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let balance = self.get_balance(addr);
        match balance.checked_sub(&amount) {
            Some(remaining) => self.set_balance(addr, remaining),
            None => self.set_error(StateError::BalanceUnderflow(addr.to_string())),
        }
    }

    pub fn set_nonce(&mut self, addr: Address, nonce: u64) {
        self.ensure_object(addr);
        let prev = match self.objects.get(&addr) {
            Some(obj) => obj.nonce(),
            None => return,
        };
        self.journal.append(JournalEntry::NonceChange {
            account: addr,
            prev,
        });
        let tx_index = self.tx_index as u32;
        if let Some(obj) = self.objects.get_mut(&addr) {
            obj.set_nonce_raw(nonce);
            obj.record_metadata(tx_index);
        }
    }

    pub fn set_code(&mut self, addr: Address, code: Vec<u8>) {
        self.ensure_object(addr);
        let (prev_hash, prev_code) = {
            let obj = match self.objects.get_mut(&addr) {
                Some(obj) => obj,
                None => return,
            };
            let prev_hash = obj.code_hash();
            if prev_hash == EMPTY_CODE_HASH {
                (prev_hash, None)
            } else {
                match obj.code(&self.current) {
                    Ok(code) => (prev_hash, Some(code)),
                    Err(e) => {
                        self.set_error(e);
                        return;
                    }
                }
            }
        };
        self.journal.append(JournalEntry::CodeChange {
            account: addr,
            prev_hash,
            prev_code,
        });
        let code_hash = Hash::keccak(&code);
        let tx_index = self.tx_index as u32;
        if let Some(obj) = self.objects.get_mut(&addr) {
            obj.set_code_raw(code_hash, Some(code));
            obj.record_metadata(tx_index);
        }
    }

    /// Create a fresh account at `addr`. An existing account collides
    /// cleanly: its balance carries forward onto the new object.
    pub fn create_account(&mut self, addr: Address) {
        if let Some(balance) = self.create_object(addr) {
            if let Some(obj) = self.objects.get_mut(&addr) {
                obj.set_balance_raw(balance);
            }
        }
    }

    /// Mark an account suicided and zero its balance. The object stays
    /// reachable until the end of the transaction.
    pub fn suicide(&mut self, addr: Address) -> bool {
        let (prev, prev_balance) = match self.object_mut(addr) {
            Some(obj) => (obj.suicided, obj.balance()),
            None => return false,
        };
        self.journal.append(JournalEntry::SuicideChange {
            account: addr,
            prev,
            prev_balance,
        });
        if let Some(obj) = self.objects.get_mut(&addr) {
            obj.mark_suicided();
            obj.set_balance_raw(U256::ZERO);
        }
        true
    }

    pub fn has_suicided(&mut self, addr: Address) -> bool {
        self.object_mut(addr).map(|o| o.suicided).unwrap_or(false)
    }

    // ---- refund counter ----

    pub fn add_refund(&mut self, gas: u64) {
        self.journal.append(JournalEntry::RefundChange { prev: self.refund });
        self.refund += gas;
    }

    /// Panics when the counter would go below zero; that is a bug in the
    /// caller, not a recoverable condition.
    pub fn sub_refund(&mut self, gas: u64) {
        self.journal.append(JournalEntry::RefundChange { prev: self.refund });
        if gas > self.refund {
            panic!("refund counter below zero (gas: {} > refund: {})", gas, self.refund);
        }
        self.refund -= gas;
    }

    pub fn refund(&self) -> u64 {
        self.refund
    }

    // ---- logs ----

    pub fn add_log(&mut self, mut log: Log) {
        self.journal.append(JournalEntry::LogChange { tx_hash: self.tx_hash });
        log.tx_hash = self.tx_hash;
        log.tx_index = self.tx_index;
        log.block_number = self.block_number;
        self.logs.entry(self.tx_hash).or_default().push(log);
    }

    pub fn logs(&self, tx_hash: &Hash) -> &[Log] {
        self.logs.get(tx_hash).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_logs(&self) -> Vec<Log> {
        self.logs.values().flatten().cloned().collect()
    }

    // ---- access list ----

    /// Reset the warm sets for a new transaction and seed them with the
    /// sender, destination, precompiles and the declared list.
    pub fn prepare(
        &mut self,
        sender: Address,
        _coinbase: Address,
        dst: Option<Address>,
        precompiles: &[Address],
        list: &[AccessListItem],
    ) {
        let mut al = AccessList::new();
        al.add_address(sender);
        if let Some(dst) = dst {
            al.add_address(dst);
        }
        for addr in precompiles {
            al.add_address(*addr);
        }
        for item in list {
            al.add_address(item.address);
            for key in &item.storage_keys {
                al.add_slot(item.address, *key);
            }
        }
        self.access_list = al;
    }

    pub fn add_address_to_access_list(&mut self, addr: Address) {
        if self.access_list.add_address(addr) {
            self.journal
                .append(JournalEntry::AccessListAddAccount { address: addr });
        }
    }

    pub fn add_slot_to_access_list(&mut self, addr: Address, slot: Hash) {
        let (addr_added, slot_added) = self.access_list.add_slot(addr, slot);
        if addr_added {
            self.journal
                .append(JournalEntry::AccessListAddAccount { address: addr });
        }
        if slot_added {
            self.journal
                .append(JournalEntry::AccessListAddSlot { address: addr, slot });
        }
    }

    pub fn address_in_access_list(&self, addr: &Address) -> bool {
        self.access_list.contains_address(addr)
    }

    /// Returns (address warm, slot warm).
    pub fn slot_in_access_list(&self, addr: &Address, slot: &Hash) -> (bool, bool) {
        self.access_list.contains(addr, slot)
    }

    // ---- snapshot / revert ----

    /// An identifier for the current revision of the state.
    pub fn snapshot(&mut self) -> usize {
        let id = self.next_revision_id;
        self.next_revision_id += 1;
        self.revisions.push(Revision {
            id,
            journal_index: self.journal.len(),
        });
        id
    }

    /// Undo all changes made since the given revision. Panics on an unknown
    /// id — reverting to a snapshot that was never issued (or already
    /// reverted past) is a programmer error.
    pub fn revert_to_snapshot(&mut self, id: usize) {
        let idx = self
            .revisions
            .iter()
            .position(|r| r.id >= id)
            .filter(|idx| self.revisions[*idx].id == id)
            .unwrap_or_else(|| panic!("revision id {} cannot be reverted", id));
        let journal_index = self.revisions[idx].journal_index;

        let mut journal = std::mem::take(&mut self.journal);
        journal.revert(self, journal_index);
        self.journal = journal;
        self.revisions.truncate(idx);
    }

    // ---- transaction / block context ----

    /// Set the hash and index of the transaction about to execute. Invoked
    /// before each transaction.
    pub fn set_tx_context(&mut self, tx_hash: Hash, tx_index: usize) {
        self.tx_hash = tx_hash;
        self.tx_index = tx_index;
    }

    pub fn set_block_info(&mut self, block_number: u64) {
        self.block_number = block_number;
    }

    pub fn tx_index(&self) -> usize {
        self.tx_index
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    // ---- finalise / commit ----

    /// Close the in-flight transaction: promote dirty storage to pending,
    /// mark suicided and emptied accounts deleted, clear the journal.
    /// Applying it twice in a row is a no-op the second time.
    pub fn finalise(&mut self) {
        for addr in self.journal.dirty_addresses() {
            let Some(obj) = self.objects.get_mut(&addr) else {
                // Mutation belonged to a transaction that was reverted.
                continue;
            };
            if obj.suicided || obj.is_empty() {
                obj.deleted = true;
            } else {
                obj.finalise();
            }
            self.pending.insert(addr);
            self.dirty.insert(addr);
        }
        self.clear_journal_and_refund();
    }

    fn clear_journal_and_refund(&mut self) {
        if self.journal.len() > 0 {
            self.journal = Journal::new();
            self.refund = 0;
        }
        self.revisions.clear();
    }

    /// Commit the block: write dirty code, each dirty account's metadata and
    /// pending storage to the current store, and the per-transaction records
    /// to history. Returns the Keccak-256 digest over the block write-set in
    /// canonical (address, key) order.
    pub fn commit(&mut self) -> Result<Hash, StateError> {
        if let Some(err) = &self.db_err {
            return Err(StateError::CommitAborted(err.to_string()));
        }
        self.finalise();

        let mut addresses: Vec<Address> = self.dirty.iter().copied().collect();
        addresses.sort();

        for addr in addresses {
            let Some(obj) = self.objects.get_mut(&addr) else {
                continue;
            };
            if obj.deleted {
                continue;
            }
            if obj.dirty_code && obj.code_hash() != EMPTY_CODE_HASH {
                let code = obj.code(&self.current)?;
                self.current.write_code(&obj.code_hash(), &code)?;
                obj.dirty_code = false;
            }
            obj.commit(&self.current, &mut self.write_set)?;
            obj.commit_history(self.block_number, &self.history)?;
        }
        self.dirty.clear();
        self.pending.clear();

        let mut digest_input = Vec::with_capacity(self.write_set.len() * Hash::LEN);
        for value in self.write_set.values() {
            digest_input.extend_from_slice(value.as_bytes());
        }
        debug!(
            entries = self.write_set.len(),
            block = self.block_number,
            "committed state"
        );
        Ok(Hash::keccak(&digest_input))
    }

    // ---- error memo ----

    pub(crate) fn set_error(&mut self, err: StateError) {
        if self.db_err.is_none() {
            self.db_err = Some(err);
        }
    }

    /// The first database failure observed, if any.
    pub fn error(&self) -> Option<&StateError> {
        self.db_err.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn journal_len(&self) -> usize {
        self.journal.len()
    }
}
