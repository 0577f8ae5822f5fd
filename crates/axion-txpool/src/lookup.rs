//! Global hash → transaction index with local/remote partitioning and slot
//! accounting.

use crate::validation::num_slots;
use axion_types::{Address, Hash, SignedTransaction, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Set of addresses whose transactions are considered local.
#[derive(Debug, Clone, Default)]
pub(crate) struct AccountSet(HashSet<Address>);

impl AccountSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, addr: &Address) -> bool {
        self.0.contains(addr)
    }

    pub(crate) fn contains_tx(&self, tx: &SignedTransaction) -> bool {
        self.contains(&tx.sender())
    }

    pub(crate) fn add(&mut self, addr: Address) {
        self.0.insert(addr);
    }

    pub(crate) fn flatten(&self) -> Vec<Address> {
        self.0.iter().copied().collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Address> for AccountSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Every transaction currently tracked by the pool, split into the local and
/// remote tiers, with the total number of occupied slots.
#[derive(Default)]
pub(crate) struct Lookup {
    slots: u64,
    locals: HashMap<Hash, Arc<SignedTransaction>>,
    remotes: HashMap<Hash, Arc<SignedTransaction>>,
}

impl Lookup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, hash: &Hash) -> bool {
        self.locals.contains_key(hash) || self.remotes.contains_key(hash)
    }

    pub(crate) fn get(&self, hash: &Hash) -> Option<&Arc<SignedTransaction>> {
        self.locals.get(hash).or_else(|| self.remotes.get(hash))
    }

    pub(crate) fn get_remote(&self, hash: &Hash) -> Option<&Arc<SignedTransaction>> {
        self.remotes.get(hash)
    }

    pub(crate) fn count(&self) -> usize {
        self.locals.len() + self.remotes.len()
    }

    pub(crate) fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub(crate) fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Total number of occupied slots.
    pub(crate) fn slots(&self) -> u64 {
        self.slots
    }

    pub(crate) fn add(&mut self, tx: Arc<SignedTransaction>, local: bool) {
        self.slots += num_slots(&tx);
        if local {
            self.locals.insert(tx.hash(), tx);
        } else {
            self.remotes.insert(tx.hash(), tx);
        }
    }

    pub(crate) fn remove(&mut self, hash: &Hash) {
        let tx = self
            .locals
            .remove(hash)
            .or_else(|| self.remotes.remove(hash));
        if let Some(tx) = tx {
            self.slots -= num_slots(&tx);
        }
    }

    /// Migrate remote transactions of newly-local senders into the local
    /// tier. Returns the number migrated.
    pub(crate) fn remote_to_locals(&mut self, locals: &AccountSet) -> usize {
        let migrate: Vec<Hash> = self
            .remotes
            .values()
            .filter(|tx| locals.contains_tx(tx))
            .map(|tx| tx.hash())
            .collect();
        for hash in &migrate {
            if let Some(tx) = self.remotes.remove(hash) {
                self.locals.insert(*hash, tx);
            }
        }
        migrate.len()
    }

    /// Remote transactions priced below the given tip.
    pub(crate) fn remotes_below_tip(&self, tip: &U256) -> Vec<Arc<SignedTransaction>> {
        self.remotes
            .values()
            .filter(|tx| tx.gas_price() < *tip)
            .cloned()
            .collect()
    }

    pub(crate) fn remote_txs(&self) -> impl Iterator<Item = &Arc<SignedTransaction>> {
        self.remotes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::TX_SLOT_SIZE;
    use axion_types::{Ed25519PublicKey, Ed25519Signature, Transaction};

    fn tx(nonce: u64, payload_len: usize, key: u8) -> Arc<SignedTransaction> {
        Arc::new(SignedTransaction::new(
            Transaction::new(
                nonce,
                Some(Address::from_bytes([9; 20])),
                U256::from(1u64),
                21_000,
                U256::ONE,
                vec![0u8; payload_len],
            ),
            Ed25519Signature::from_bytes([1u8; 64]),
            Ed25519PublicKey::from_bytes([key; 32]),
        ))
    }

    #[test]
    fn test_add_remove_slots() {
        let mut lookup = Lookup::new();
        let small = tx(0, 0, 1);
        let big = tx(1, TX_SLOT_SIZE * 2, 1);

        lookup.add(small.clone(), false);
        lookup.add(big.clone(), false);
        assert_eq!(lookup.slots(), 1 + 3);
        assert_eq!(lookup.count(), 2);

        lookup.remove(&small.hash());
        assert_eq!(lookup.slots(), 3);
        assert_eq!(lookup.count(), 1);
    }

    #[test]
    fn test_local_remote_partition() {
        let mut lookup = Lookup::new();
        lookup.add(tx(0, 0, 1), true);
        lookup.add(tx(1, 0, 2), false);

        assert_eq!(lookup.local_count(), 1);
        assert_eq!(lookup.remote_count(), 1);
    }

    #[test]
    fn test_remote_to_locals() {
        let mut lookup = Lookup::new();
        let remote = tx(0, 0, 3);
        lookup.add(remote.clone(), false);

        let mut locals = AccountSet::new();
        locals.add(remote.sender());
        assert_eq!(lookup.remote_to_locals(&locals), 1);
        assert_eq!(lookup.remote_count(), 0);
        assert_eq!(lookup.local_count(), 1);
    }

    #[test]
    fn test_remotes_below_tip() {
        let mut lookup = Lookup::new();
        let cheap = tx(0, 0, 1);
        lookup.add(cheap.clone(), false);
        let local_cheap = tx(1, 0, 2);
        lookup.add(local_cheap, true);

        let below = lookup.remotes_below_tip(&U256::from(10u64));
        assert_eq!(below.len(), 1);
        assert_eq!(below[0].hash(), cheap.hash());
    }
}
