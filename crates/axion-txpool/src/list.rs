//! Per-account nonce-sorted transaction list.

use axion_types::{SignedTransaction, U256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Nonce-sorted map of one account's transactions with a cached sum of
/// `gas_limit * gas_price + value` over the members.
///
/// Pending lists are *strict*: nonces must stay contiguous, so removing one
/// entry invalidates every later one. Queue lists are gapped by nature.
pub(crate) struct TxList {
    strict: bool,
    txs: BTreeMap<u64, Arc<SignedTransaction>>,
    total_cost: U256,
}

impl TxList {
    pub(crate) fn new(strict: bool) -> Self {
        Self {
            strict,
            txs: BTreeMap::new(),
            total_cost: U256::ZERO,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.txs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub(crate) fn contains(&self, nonce: u64) -> bool {
        self.txs.contains_key(&nonce)
    }

    pub(crate) fn get(&self, nonce: u64) -> Option<&Arc<SignedTransaction>> {
        self.txs.get(&nonce)
    }

    pub(crate) fn last(&self) -> Option<&Arc<SignedTransaction>> {
        self.txs.values().next_back()
    }

    pub(crate) fn total_cost(&self) -> U256 {
        self.total_cost
    }

    fn sub_cost(&mut self, tx: &SignedTransaction) {
        self.total_cost = self.total_cost.saturating_sub(&tx.cost());
    }

    /// Insert a transaction, replacing an existing entry at the same nonce
    /// only when the new price clears the old one by at least `price_bump`
    /// percent. Returns whether the insert happened and the entry it
    /// replaced.
    pub(crate) fn add(
        &mut self,
        tx: Arc<SignedTransaction>,
        price_bump: u64,
    ) -> (bool, Option<Arc<SignedTransaction>>) {
        let nonce = tx.nonce();
        if let Some(old) = self.txs.get(&nonce) {
            if old.gas_price() >= tx.gas_price() {
                return (false, None);
            }
            // threshold = old_price * (100 + price_bump) / 100
            let threshold = old
                .gas_price()
                .saturating_mul(&U256::from(100 + price_bump))
                .div_rem_u64(100)
                .map(|(q, _)| q)
                .unwrap_or(U256::MAX);
            if tx.gas_price() < threshold {
                return (false, None);
            }
        }
        self.total_cost = self.total_cost.saturating_add(&tx.cost());
        let old = self.txs.insert(nonce, tx);
        if let Some(old) = &old {
            self.sub_cost(old);
        }
        (true, old)
    }

    /// Remove every transaction with a nonce lower than the threshold.
    pub(crate) fn forward(&mut self, threshold: u64) -> Vec<Arc<SignedTransaction>> {
        let keep = self.txs.split_off(&threshold);
        let removed: Vec<_> = std::mem::replace(&mut self.txs, keep)
            .into_values()
            .collect();
        for tx in &removed {
            self.sub_cost(tx);
        }
        removed
    }

    /// Remove every transaction whose cost exceeds `cost_limit` or whose gas
    /// exceeds `gas_limit`. In strict mode every transaction above the
    /// lowest removed nonce is invalidated as well and returned separately.
    pub(crate) fn filter(
        &mut self,
        cost_limit: U256,
        gas_limit: u64,
    ) -> (Vec<Arc<SignedTransaction>>, Vec<Arc<SignedTransaction>>) {
        let over: Vec<u64> = self
            .txs
            .iter()
            .filter(|(_, tx)| tx.cost() > cost_limit || tx.gas_limit() > gas_limit)
            .map(|(nonce, _)| *nonce)
            .collect();
        let mut drops = Vec::with_capacity(over.len());
        for nonce in over {
            if let Some(tx) = self.txs.remove(&nonce) {
                self.sub_cost(&tx);
                drops.push(tx);
            }
        }
        let mut invalids = Vec::new();
        if self.strict && !drops.is_empty() {
            let lowest = drops.iter().map(|tx| tx.nonce()).min().unwrap_or(u64::MAX);
            let tail: Vec<u64> = self.txs.range(lowest..).map(|(n, _)| *n).collect();
            for nonce in tail {
                if let Some(tx) = self.txs.remove(&nonce) {
                    self.sub_cost(&tx);
                    invalids.push(tx);
                }
            }
        }
        (drops, invalids)
    }

    /// Trim the list down to `limit` entries, removing the highest nonces.
    pub(crate) fn cap(&mut self, limit: usize) -> Vec<Arc<SignedTransaction>> {
        if self.txs.len() <= limit {
            return Vec::new();
        }
        let mut removed = Vec::with_capacity(self.txs.len() - limit);
        while self.txs.len() > limit {
            if let Some((_, tx)) = self.txs.pop_last() {
                self.sub_cost(&tx);
                removed.push(tx);
            }
        }
        removed
    }

    /// Remove the transaction at `nonce`. In strict mode every later
    /// transaction is returned for demotion.
    pub(crate) fn remove(&mut self, nonce: u64) -> (bool, Vec<Arc<SignedTransaction>>) {
        let Some(tx) = self.txs.remove(&nonce) else {
            return (false, Vec::new());
        };
        self.sub_cost(&tx);
        let mut invalids = Vec::new();
        if self.strict {
            let tail: Vec<u64> = self.txs.range(nonce..).map(|(n, _)| *n).collect();
            for nonce in tail {
                if let Some(tx) = self.txs.remove(&nonce) {
                    self.sub_cost(&tx);
                    invalids.push(tx);
                }
            }
        }
        (true, invalids)
    }

    /// Pop the contiguous run of transactions starting at the lowest stored
    /// nonce, provided that nonce is at most `start`.
    pub(crate) fn ready(&mut self, start: u64) -> Vec<Arc<SignedTransaction>> {
        let Some(first) = self.txs.keys().next().copied() else {
            return Vec::new();
        };
        if first > start {
            return Vec::new();
        }
        let mut ready = Vec::new();
        let mut next = first;
        while let Some(tx) = self.txs.remove(&next) {
            self.sub_cost(&tx);
            ready.push(tx);
            next += 1;
        }
        ready
    }

    /// All transactions sorted by nonce.
    pub(crate) fn flatten(&self) -> Vec<Arc<SignedTransaction>> {
        self.txs.values().cloned().collect()
    }
}
