//! Reversible log of state mutations.
//!
//! Every entry remembers the previous value of exactly one scalar. A
//! snapshot is the journal length at the time it was taken; reverting
//! replays entries in LIFO order and drops them.

use crate::object::StateObject;
use crate::statedb::StateDb;
use axion_types::{Address, Hash, U256};
use std::collections::HashMap;

/// One reversible mutation.
#[derive(Debug)]
pub(crate) enum JournalEntry {
    BalanceChange {
        account: Address,
        prev: U256,
    },
    NonceChange {
        account: Address,
        prev: u64,
    },
    StorageChange {
        account: Address,
        key: Hash,
        prev: Hash,
    },
    CodeChange {
        account: Address,
        prev_hash: Hash,
        prev_code: Option<Vec<u8>>,
    },
    /// A fresh object replaced `prev` (possibly nothing) in the object table.
    AccountCreated {
        account: Address,
        prev: Option<Box<StateObject>>,
    },
    SuicideChange {
        account: Address,
        prev: bool,
        prev_balance: U256,
    },
    RefundChange {
        prev: u64,
    },
    AccessListAddAccount {
        address: Address,
    },
    AccessListAddSlot {
        address: Address,
        slot: Hash,
    },
    LogChange {
        tx_hash: Hash,
    },
}

impl JournalEntry {
    /// The address this entry dirties, if any.
    fn dirtied(&self) -> Option<Address> {
        match self {
            JournalEntry::BalanceChange { account, .. }
            | JournalEntry::NonceChange { account, .. }
            | JournalEntry::StorageChange { account, .. }
            | JournalEntry::CodeChange { account, .. }
            | JournalEntry::AccountCreated { account, .. }
            | JournalEntry::SuicideChange { account, .. } => Some(*account),
            JournalEntry::RefundChange { .. }
            | JournalEntry::AccessListAddAccount { .. }
            | JournalEntry::AccessListAddSlot { .. }
            | JournalEntry::LogChange { .. } => None,
        }
    }

    fn revert(self, state: &mut StateDb) {
        match self {
            JournalEntry::BalanceChange { account, prev } => {
                if let Some(obj) = state.objects.get_mut(&account) {
                    obj.set_balance_raw(prev);
                }
            }
            JournalEntry::NonceChange { account, prev } => {
                if let Some(obj) = state.objects.get_mut(&account) {
                    obj.set_nonce_raw(prev);
                }
            }
            JournalEntry::StorageChange { account, key, prev } => {
                if let Some(obj) = state.objects.get_mut(&account) {
                    obj.set_state(key, prev);
                }
            }
            JournalEntry::CodeChange {
                account,
                prev_hash,
                prev_code,
            } => {
                if let Some(obj) = state.objects.get_mut(&account) {
                    obj.set_code_raw(prev_hash, prev_code);
                }
            }
            JournalEntry::AccountCreated { account, prev } => {
                state.objects.remove(&account);
                if let Some(prev) = prev {
                    state.objects.insert(account, *prev);
                }
            }
            JournalEntry::SuicideChange {
                account,
                prev,
                prev_balance,
            } => {
                if let Some(obj) = state.objects.get_mut(&account) {
                    obj.suicided = prev;
                    obj.set_balance_raw(prev_balance);
                }
            }
            JournalEntry::RefundChange { prev } => {
                state.refund = prev;
            }
            JournalEntry::AccessListAddAccount { address } => {
                state.access_list.delete_address(address);
            }
            JournalEntry::AccessListAddSlot { address, slot } => {
                state.access_list.delete_slot(address, slot);
            }
            JournalEntry::LogChange { tx_hash } => {
                if let Some(logs) = state.logs.get_mut(&tx_hash) {
                    logs.pop();
                    if logs.is_empty() {
                        state.logs.remove(&tx_hash);
                    }
                }
            }
        }
    }
}

/// Append-only log plus a multiset counting dirty touches per address.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<JournalEntry>,
    dirties: HashMap<Address, usize>,
}

impl Journal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, entry: JournalEntry) {
        if let Some(addr) = entry.dirtied() {
            *self.dirties.entry(addr).or_insert(0) += 1;
        }
        self.entries.push(entry);
    }

    /// Current length; doubles as the snapshot identifier payload.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn dirty_addresses(&self) -> Vec<Address> {
        self.dirties.keys().copied().collect()
    }

    /// Undo every entry past `snapshot`, newest first.
    pub(crate) fn revert(&mut self, state: &mut StateDb, snapshot: usize) {
        while self.entries.len() > snapshot {
            let entry = match self.entries.pop() {
                Some(entry) => entry,
                None => break,
            };
            if let Some(addr) = entry.dirtied() {
                if let Some(count) = self.dirties.get_mut(&addr) {
                    *count -= 1;
                    if *count == 0 {
                        self.dirties.remove(&addr);
                    }
                }
            }
            entry.revert(state);
        }
    }
}
