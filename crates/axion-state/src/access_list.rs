//! Warm address/slot tracking for access-cost pricing, reset per
//! transaction.

use axion_types::{Address, Hash};
use std::collections::{HashMap, HashSet};

/// One entry of a transaction's declared access list.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<Hash>,
}

/// Set of warm addresses and, per address, warm storage slots.
///
/// Addresses map to an index into `slots`; `None` marks an address warmed
/// without any slots. All membership operations are O(1) amortised.
#[derive(Clone, Debug, Default)]
pub struct AccessList {
    addresses: HashMap<Address, Option<usize>>,
    slots: Vec<HashSet<Hash>>,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the address is warm.
    pub fn contains_address(&self, addr: &Address) -> bool {
        self.addresses.contains_key(addr)
    }

    /// Returns (address warm, slot warm).
    pub fn contains(&self, addr: &Address, slot: &Hash) -> (bool, bool) {
        match self.addresses.get(addr) {
            Some(Some(idx)) => (true, self.slots[*idx].contains(slot)),
            Some(None) => (true, false),
            None => (false, false),
        }
    }

    /// Warm an address. Returns true if it was not warm before.
    pub fn add_address(&mut self, addr: Address) -> bool {
        if self.addresses.contains_key(&addr) {
            return false;
        }
        self.addresses.insert(addr, None);
        true
    }

    /// Warm an (address, slot) pair. Returns (address newly warmed, slot
    /// newly warmed).
    pub fn add_slot(&mut self, addr: Address, slot: Hash) -> (bool, bool) {
        match self.addresses.get(&addr).copied() {
            None => {
                self.slots.push(HashSet::from([slot]));
                self.addresses.insert(addr, Some(self.slots.len() - 1));
                (true, true)
            }
            Some(None) => {
                self.slots.push(HashSet::from([slot]));
                self.addresses.insert(addr, Some(self.slots.len() - 1));
                (false, true)
            }
            Some(Some(idx)) => (false, self.slots[idx].insert(slot)),
        }
    }

    /// Undo an `add_slot`. Only called while reverting a journal, so the
    /// entry must exist; anything else is a coding bug.
    pub(crate) fn delete_slot(&mut self, addr: Address, slot: Hash) {
        let idx = match self.addresses.get(&addr) {
            Some(Some(idx)) => *idx,
            _ => panic!("reverting slot change, address not present in access list"),
        };
        self.slots[idx].remove(&slot);
        if self.slots[idx].is_empty() && idx == self.slots.len() - 1 {
            self.slots.pop();
            self.addresses.insert(addr, None);
        }
    }

    /// Undo an `add_address`.
    pub(crate) fn delete_address(&mut self, addr: Address) {
        self.addresses.remove(&addr);
    }

    /// Number of warm addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn test_add_address() {
        let mut al = AccessList::new();
        assert!(al.add_address(addr(1)));
        assert!(!al.add_address(addr(1)));
        assert!(al.contains_address(&addr(1)));
        assert!(!al.contains_address(&addr(2)));
    }

    #[test]
    fn test_add_slot() {
        let mut al = AccessList::new();
        let slot = Hash::compute(b"s");

        let (addr_new, slot_new) = al.add_slot(addr(1), slot);
        assert!(addr_new && slot_new);

        let (addr_new, slot_new) = al.add_slot(addr(1), slot);
        assert!(!addr_new && !slot_new);

        assert_eq!(al.contains(&addr(1), &slot), (true, true));
        assert_eq!(al.contains(&addr(1), &Hash::compute(b"t")), (true, false));
        assert_eq!(al.contains(&addr(2), &slot), (false, false));
    }

    #[test]
    fn test_slot_on_warm_address() {
        let mut al = AccessList::new();
        al.add_address(addr(1));
        let (addr_new, slot_new) = al.add_slot(addr(1), Hash::ZERO);
        assert!(!addr_new && slot_new);
    }

    #[test]
    fn test_delete_round_trip() {
        let mut al = AccessList::new();
        let slot = Hash::compute(b"s");
        al.add_slot(addr(1), slot);
        al.delete_slot(addr(1), slot);
        assert_eq!(al.contains(&addr(1), &slot), (true, false));
        al.delete_address(addr(1));
        assert!(!al.contains_address(&addr(1)));
    }
}
