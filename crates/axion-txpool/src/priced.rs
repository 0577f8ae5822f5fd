//! Price-ordered index over the remote transactions, used to pick eviction
//! victims when the pool is full.

use crate::lookup::Lookup;
use crate::validation::num_slots;
use axion_types::SignedTransaction;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::trace;

const URGENT_RATIO: usize = 4;
const FLOATING_RATIO: usize = 1;

/// Heap entry ordered by gas price, hash as the deterministic tie-break.
struct PricedTx(Arc<SignedTransaction>);

impl PartialEq for PricedTx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PricedTx {}

impl PartialOrd for PricedTx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PricedTx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .gas_price()
            .cmp(&other.0.gas_price())
            .then_with(|| self.0.hash().cmp(&other.0.hash()))
    }
}

/// Two price-sorted min-heaps over the remote transactions. Local
/// transactions are never indexed here and thus never price-evicted.
///
/// Entries are not removed eagerly when a transaction leaves the lookup;
/// they turn stale and are skipped on pop. Once a quarter of the entries are
/// stale the heaps are rebuilt from the lookup.
pub(crate) struct PricedList {
    urgent: BinaryHeap<Reverse<PricedTx>>,
    floating: BinaryHeap<Reverse<PricedTx>>,
    stales: i64,
}

impl PricedList {
    pub(crate) fn new() -> Self {
        Self {
            urgent: BinaryHeap::new(),
            floating: BinaryHeap::new(),
            stales: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.urgent.len() + self.floating.len()
    }

    /// Index a freshly admitted remote transaction.
    pub(crate) fn put(&mut self, tx: Arc<SignedTransaction>, local: bool) {
        if local {
            return;
        }
        self.urgent.push(Reverse(PricedTx(tx)));
    }

    /// Note that `count` indexed transactions left the lookup. Rebuilds the
    /// heaps when too many entries have gone stale.
    pub(crate) fn removed(&mut self, all: &Lookup, count: usize) {
        self.stales += count as i64;
        if self.stales <= (self.len() as i64) / 4 {
            return;
        }
        self.reheap(all);
    }

    /// Whether `tx` is priced at or below the cheapest indexed remote.
    pub(crate) fn underpriced(&mut self, all: &Lookup, tx: &SignedTransaction) -> bool {
        let urgent_under = Self::underpriced_for(&mut self.urgent, &mut self.stales, all, tx);
        let floating_under = Self::underpriced_for(&mut self.floating, &mut self.stales, all, tx);
        (urgent_under || self.urgent.is_empty())
            && (floating_under || self.floating.is_empty())
            && (!self.urgent.is_empty() || !self.floating.is_empty())
    }

    fn underpriced_for(
        heap: &mut BinaryHeap<Reverse<PricedTx>>,
        stales: &mut i64,
        all: &Lookup,
        tx: &SignedTransaction,
    ) -> bool {
        // Clean stale entries off the head
        while let Some(Reverse(head)) = heap.peek() {
            if all.get_remote(&head.0.hash()).is_none() {
                *stales -= 1;
                heap.pop();
                continue;
            }
            break;
        }
        match heap.peek() {
            Some(Reverse(head)) => head.0.gas_price() >= tx.gas_price(),
            None => false,
        }
    }

    /// Free at least `slots` slots by discarding the cheapest remote
    /// transactions. Returns `None` (restoring the candidates) when the goal
    /// cannot be met and `force` is unset.
    pub(crate) fn discard(
        &mut self,
        all: &Lookup,
        slots: u64,
        force: bool,
    ) -> Option<Vec<Arc<SignedTransaction>>> {
        let mut drop: Vec<Arc<SignedTransaction>> = Vec::new();
        let mut slots = slots as i64;
        while slots > 0 {
            if self.urgent.len() * FLOATING_RATIO > self.floating.len() * URGENT_RATIO {
                let Some(Reverse(tx)) = self.urgent.pop() else {
                    break;
                };
                if all.get_remote(&tx.0.hash()).is_none() {
                    self.stales -= 1;
                    continue;
                }
                // Not stale: cascade into the floating heap
                self.floating.push(Reverse(tx));
            } else {
                if self.floating.is_empty() {
                    break;
                }
                let Some(Reverse(tx)) = self.floating.pop() else {
                    break;
                };
                if all.get_remote(&tx.0.hash()).is_none() {
                    self.stales -= 1;
                    continue;
                }
                slots -= num_slots(&tx.0) as i64;
                drop.push(tx.0);
            }
        }
        if slots > 0 && !force {
            self.restore(drop);
            return None;
        }
        Some(drop)
    }

    /// Push candidates back after an aborted discard.
    pub(crate) fn restore(&mut self, txs: Vec<Arc<SignedTransaction>>) {
        for tx in txs {
            self.urgent.push(Reverse(PricedTx(tx)));
        }
    }

    /// Rebuild both heaps from the remote side of the lookup and rebalance:
    /// the cheapest quarter floats, the rest stays urgent.
    pub(crate) fn reheap(&mut self, all: &Lookup) {
        self.stales = 0;
        self.urgent = all
            .remote_txs()
            .map(|tx| Reverse(PricedTx(tx.clone())))
            .collect();
        let floating_count = self.urgent.len() / (URGENT_RATIO + FLOATING_RATIO) * FLOATING_RATIO;
        let mut floating = BinaryHeap::with_capacity(floating_count);
        for _ in 0..floating_count {
            if let Some(tx) = self.urgent.pop() {
                floating.push(tx);
            }
        }
        self.floating = floating;
        trace!(
            urgent = self.urgent.len(),
            floating = self.floating.len(),
            "reheaped priced transaction index"
        );
    }
}
