//! The transaction pool: validation, promotion and demotion, eviction,
//! reorg-aware resets and the background maintenance task.

use crate::chain::{ChainBackend, SharedState};
use crate::config::Config;
use crate::error::PoolError;
use crate::events::{Feed, NewTxsEvent};
use crate::journal::TxJournal;
use crate::list::TxList;
use crate::lookup::{AccountSet, Lookup};
use crate::noncer::Noncer;
use crate::priced::PricedList;
use crate::validation::{intrinsic_gas, num_slots, TX_MAX_SIZE};
use axion_types::{Address, BlockHeader, Hash, SignedTransaction, U256};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Maximum depth of a reorg the pool will replay transactions across.
const MAX_REORG_DEPTH: u64 = 64;

/// Known status of a transaction with respect to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Unknown,
    Pending,
    Queued,
}

enum Request {
    Reset {
        old: Option<BlockHeader>,
        new: Option<BlockHeader>,
        done: oneshot::Sender<()>,
    },
    Promote {
        accounts: HashSet<Address>,
        done: Option<oneshot::Sender<()>>,
    },
    Shutdown,
}

/// Nonce- and price-ordered transaction pool.
///
/// Admission happens inline under the pool lock; promotion, demotion,
/// resets, age eviction and journal rotation run on a background task fed
/// by request channels. `add_*_sync` variants wait for the follow-up
/// maintenance to complete.
pub struct TxPool {
    config: Config,
    chain: Arc<dyn ChainBackend>,
    inner: Arc<RwLock<Inner>>,
    tx_feed: Feed<NewTxsEvent>,
    reorg_tx: mpsc::UnboundedSender<Request>,
    reorg_rx: Mutex<Option<mpsc::UnboundedReceiver<Request>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    ready_tx: watch::Sender<bool>,
}

impl TxPool {
    /// Build the pool against a chain view. The pool is inert until `init`.
    pub fn new(config: Config, chain: Arc<dyn ChainBackend>) -> Result<Self, PoolError> {
        let config = config.sanitize();

        let head = chain.current_block();
        let state = chain.state_at(&head.hash())?;

        let mut locals = AccountSet::new();
        for addr in &config.locals {
            info!(%addr, "setting new local account");
            locals.add(*addr);
        }
        let journal = if !config.no_locals && !config.journal.is_empty() {
            Some(TxJournal::new(&config.journal))
        } else {
            None
        };

        let inner = Inner {
            config: config.clone(),
            chain: chain.clone(),
            gas_tip: U256::from(config.price_limit),
            current_head: head.clone(),
            current_max_gas: head.gas_limit(),
            current_state: state,
            locals,
            journal,
            pending: HashMap::new(),
            queue: HashMap::new(),
            beats: HashMap::new(),
            all: Lookup::new(),
            priced: PricedList::new(),
            pending_nonces: None,
            queued_events: HashMap::new(),
        };

        let (reorg_tx, reorg_rx) = mpsc::unbounded_channel();
        let (ready_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            chain,
            inner: Arc::new(RwLock::new(inner)),
            tx_feed: Feed::new(),
            reorg_tx,
            reorg_rx: Mutex::new(Some(reorg_rx)),
            loop_handle: Mutex::new(None),
            ready_tx,
        })
    }

    /// Set the base parameters, replay the local journal, align the pool
    /// with `head` and start the maintenance task. Readiness is signalled on
    /// the watch channel returned by `ready_signal`.
    pub fn init(&self, gas_tip: U256, head: BlockHeader) -> Result<(), PoolError> {
        {
            let mut inner = self.inner.write();
            inner.gas_tip = gas_tip;
            inner.reset(None, Some(head));
        }

        // Replay and compact the local transaction journal.
        let journal = self.inner.write().journal.take();
        if let Some(mut journal) = journal {
            let mut dirty: HashSet<Address> = HashSet::new();
            let load_result = journal.load(|txs| {
                let mut inner = self.inner.write();
                let (results, replayed) = inner.add_txs_locked(txs, true);
                dirty.extend(replayed);
                results
            });
            if let Err(e) = load_result {
                warn!(error = %e, "failed to load transaction journal");
            }
            if let Err(e) = journal.open() {
                warn!(error = %e, "failed to open transaction journal");
            }
            if let Err(e) = journal.rotate(self.local_txs()) {
                warn!(error = %e, "failed to rotate transaction journal");
            }
            self.inner.write().journal = Some(journal);
            // Promote the replayed transactions before anyone observes the
            // pool.
            run_reorg(&self.inner, &self.tx_feed, None, Some(dirty));
        }

        let rx = self.reorg_rx.lock().take();
        if let Some(rx) = rx {
            let handle = tokio::spawn(maintenance_loop(
                self.inner.clone(),
                self.chain.clone(),
                self.tx_feed.clone(),
                self.config.clone(),
                rx,
            ));
            *self.loop_handle.lock() = Some(handle);
        }
        let _ = self.ready_tx.send(true);
        Ok(())
    }

    /// Watch channel flipping to `true` once `init` has completed.
    pub fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Terminate the maintenance task and flush the journal.
    pub async fn close(&self) {
        let _ = self.reorg_tx.send(Request::Shutdown);
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        if let Some(journal) = self.inner.write().journal.as_mut() {
            journal.close();
        }
        info!("transaction pool stopped");
    }

    // ---- admission ----

    /// Enqueue a batch of transactions if valid. Promotion of newly
    /// executable entries happens asynchronously on the maintenance task.
    pub fn add(
        &self,
        txs: Vec<Arc<SignedTransaction>>,
        local: bool,
    ) -> Vec<Result<(), PoolError>> {
        let (results, _) = self.add_with_promote(txs, local);
        results
    }

    /// Like `add`, but waits until the follow-up promotion pass finished.
    pub async fn add_sync(
        &self,
        txs: Vec<Arc<SignedTransaction>>,
        local: bool,
    ) -> Vec<Result<(), PoolError>> {
        let (results, done) = self.add_with_promote(txs, local);
        if let Some(done) = done {
            let _ = done.await;
        }
        results
    }

    pub fn add_local(&self, tx: Arc<SignedTransaction>) -> Result<(), PoolError> {
        self.add(vec![tx], true).pop().unwrap_or(Ok(()))
    }

    pub async fn add_local_sync(&self, tx: Arc<SignedTransaction>) -> Result<(), PoolError> {
        self.add_sync(vec![tx], true).await.pop().unwrap_or(Ok(()))
    }

    pub fn add_locals(&self, txs: Vec<Arc<SignedTransaction>>) -> Vec<Result<(), PoolError>> {
        self.add(txs, true)
    }

    pub fn add_remote(&self, tx: Arc<SignedTransaction>) -> Result<(), PoolError> {
        self.add(vec![tx], false).pop().unwrap_or(Ok(()))
    }

    pub async fn add_remote_sync(&self, tx: Arc<SignedTransaction>) -> Result<(), PoolError> {
        self.add_sync(vec![tx], false).await.pop().unwrap_or(Ok(()))
    }

    pub fn add_remotes(&self, txs: Vec<Arc<SignedTransaction>>) -> Vec<Result<(), PoolError>> {
        self.add(txs, false)
    }

    pub async fn add_remotes_sync(
        &self,
        txs: Vec<Arc<SignedTransaction>>,
    ) -> Vec<Result<(), PoolError>> {
        self.add_sync(txs, false).await
    }

    fn add_with_promote(
        &self,
        txs: Vec<Arc<SignedTransaction>>,
        local: bool,
    ) -> (Vec<Result<(), PoolError>>, Option<oneshot::Receiver<()>>) {
        // Local handling can be disabled wholesale.
        let local = local && !self.config.no_locals;

        let mut results: Vec<Option<Result<(), PoolError>>> = Vec::new();
        let mut news = Vec::new();
        {
            let inner = self.inner.read();
            for tx in txs {
                if inner.all.contains(&tx.hash()) {
                    results.push(Some(Err(PoolError::AlreadyKnown)));
                    continue;
                }
                if !tx.check_signature() {
                    results.push(Some(Err(PoolError::InvalidSender)));
                    continue;
                }
                results.push(None);
                news.push((results.len() - 1, tx));
            }
        }
        if news.is_empty() {
            let results = results.into_iter().flatten().collect();
            return (results, None);
        }

        let mut dirty = HashSet::new();
        {
            let mut inner = self.inner.write();
            for (slot, tx) in news {
                match inner.add(tx.clone(), local) {
                    Ok(replaced) => {
                        if !replaced {
                            dirty.insert(tx.sender());
                        }
                        results[slot] = Some(Ok(()));
                    }
                    Err(e) => results[slot] = Some(Err(e)),
                }
            }
        }

        // Always schedule a maintenance pass: it promotes the dirty
        // accounts and flushes any queued replacement events.
        let done = Some(self.request_promote(dirty));
        let results = results
            .into_iter()
            .map(|r| r.unwrap_or(Err(PoolError::Closed)))
            .collect();
        (results, done)
    }

    // ---- maintenance requests ----

    /// Ask the maintenance task to realign the pool with a new head. The
    /// returned channel resolves when the reset has been processed.
    pub fn request_reset(
        &self,
        old: Option<BlockHeader>,
        new: Option<BlockHeader>,
    ) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        let _ = self.reorg_tx.send(Request::Reset { old, new, done });
        rx
    }

    /// Ask the maintenance task to run a promotion pass over `accounts`.
    pub fn request_promote(&self, accounts: HashSet<Address>) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        let _ = self.reorg_tx.send(Request::Promote {
            accounts,
            done: Some(done),
        });
        rx
    }

    /// Update the minimum gas tip and drop remote transactions below it.
    pub fn set_gas_tip(&self, tip: U256) {
        let mut inner = self.inner.write();
        let old = inner.gas_tip;
        inner.gas_tip = tip;
        if tip > old {
            let drops = inner.all.remotes_below_tip(&tip);
            for tx in &drops {
                inner.remove_tx(tx.hash(), false);
            }
            let count = drops.len();
            inner.priced_removed(count);
        }
        info!(tip = %tip, "transaction pool tip threshold updated");
    }

    // ---- queries ----

    /// Subscribe to events fired when batches of transactions turn pending.
    pub fn subscribe_transactions(&self) -> broadcast::Receiver<NewTxsEvent> {
        self.tx_feed.subscribe()
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.inner.read().all.contains(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<SignedTransaction>> {
        self.inner.read().all.get(hash).cloned()
    }

    /// Next nonce for an account with all executable pool transactions
    /// applied on top of the chain state.
    pub fn nonce(&self, addr: Address) -> u64 {
        let mut inner = self.inner.write();
        inner.pending_nonce(addr)
    }

    /// (pending count, queued count)
    pub fn stats(&self) -> (usize, usize) {
        let inner = self.inner.read();
        (
            inner.pending.values().map(TxList::len).sum(),
            inner.queue.values().map(TxList::len).sum(),
        )
    }

    pub fn status(&self, hash: &Hash) -> TxStatus {
        let inner = self.inner.read();
        let Some(tx) = inner.all.get(hash) else {
            return TxStatus::Unknown;
        };
        let from = tx.sender();
        let nonce = tx.nonce();
        let in_pending = inner
            .pending
            .get(&from)
            .and_then(|list| list.get(nonce))
            .map_or(false, |t| t.hash() == *hash);
        if in_pending {
            TxStatus::Pending
        } else {
            TxStatus::Queued
        }
    }

    /// The currently executable transactions, grouped by sender and sorted
    /// by nonce. Each account's list is capped to the longest prefix its
    /// balance can actually pay for. With `enforce_tips`, remote entries
    /// below the pool tip are cut off as well — in both cases everything
    /// behind a cut entry goes too, to keep nonces contiguous.
    pub fn pending(&self, enforce_tips: bool) -> HashMap<Address, Vec<Arc<SignedTransaction>>> {
        let inner = self.inner.read();
        let mut out = HashMap::with_capacity(inner.pending.len());
        for (addr, list) in &inner.pending {
            let mut txs = list.flatten();
            if enforce_tips && !inner.locals.contains(addr) {
                if let Some(cut) = txs.iter().position(|tx| tx.gas_price() < inner.gas_tip) {
                    txs.truncate(cut);
                }
            }
            let balance = inner.current_state.write().get_balance(*addr);
            let mut spent = U256::ZERO;
            let affordable = txs
                .iter()
                .position(|tx| {
                    spent = spent.saturating_add(&tx.cost());
                    spent > balance
                })
                .unwrap_or(txs.len());
            txs.truncate(affordable);
            if !txs.is_empty() {
                out.insert(*addr, txs);
            }
        }
        out
    }

    /// Snapshot of both halves of the pool, grouped by sender and sorted by
    /// nonce.
    pub fn content(
        &self,
    ) -> (
        HashMap<Address, Vec<Arc<SignedTransaction>>>,
        HashMap<Address, Vec<Arc<SignedTransaction>>>,
    ) {
        let inner = self.inner.read();
        let pending = inner
            .pending
            .iter()
            .map(|(addr, list)| (*addr, list.flatten()))
            .collect();
        let queued = inner
            .queue
            .iter()
            .map(|(addr, list)| (*addr, list.flatten()))
            .collect();
        (pending, queued)
    }

    pub fn content_from(
        &self,
        addr: Address,
    ) -> (Vec<Arc<SignedTransaction>>, Vec<Arc<SignedTransaction>>) {
        let inner = self.inner.read();
        (
            inner.pending.get(&addr).map(TxList::flatten).unwrap_or_default(),
            inner.queue.get(&addr).map(TxList::flatten).unwrap_or_default(),
        )
    }

    /// Accounts currently considered local.
    pub fn locals(&self) -> Vec<Address> {
        self.inner.read().locals.flatten()
    }

    fn local_txs(&self) -> HashMap<Address, Vec<Arc<SignedTransaction>>> {
        self.inner.read().local_txs()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<RwLock<Inner>> {
        &self.inner
    }
}

pub(crate) struct Inner {
    pub(crate) config: Config,
    chain: Arc<dyn ChainBackend>,
    pub(crate) gas_tip: U256,
    pub(crate) current_head: BlockHeader,
    pub(crate) current_max_gas: u64,
    pub(crate) current_state: SharedState,
    pub(crate) locals: AccountSet,
    pub(crate) journal: Option<TxJournal>,

    pub(crate) pending: HashMap<Address, TxList>,
    pub(crate) queue: HashMap<Address, TxList>,
    pub(crate) beats: HashMap<Address, Instant>,
    pub(crate) all: Lookup,
    pub(crate) priced: PricedList,
    /// Lazily rebuilt after every reset.
    pending_nonces: Option<Noncer>,

    /// Events queued for the next maintenance pass, deduplicated per
    /// (sender, nonce) keeping the latest replacement.
    queued_events: HashMap<Address, BTreeMap<u64, Arc<SignedTransaction>>>,
}

impl Inner {
    fn noncer(&mut self) -> &mut Noncer {
        let state = self.current_state.clone();
        self.pending_nonces.get_or_insert_with(|| Noncer::new(state))
    }

    pub(crate) fn pending_nonce(&mut self, addr: Address) -> u64 {
        self.noncer().get(addr)
    }

    fn priced_removed(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.priced.removed(&self.all, count);
    }

    // ---- validation ----

    fn validate_tx(&mut self, tx: &SignedTransaction, local: bool) -> Result<(), PoolError> {
        if tx.size() > TX_MAX_SIZE {
            return Err(PoolError::OversizedData {
                size: tx.size(),
                limit: TX_MAX_SIZE,
            });
        }
        // Transaction values are unsigned by construction; a wire decoder
        // observing a sign bit surfaces NegativeValue before reaching here.
        if tx.gas_limit() > self.current_max_gas {
            return Err(PoolError::GasLimit {
                have: tx.gas_limit(),
                limit: self.current_max_gas,
            });
        }
        let intrinsic = intrinsic_gas(&tx.tx.payload, tx.is_create())?;
        if tx.gas_limit() < intrinsic {
            return Err(PoolError::IntrinsicGas);
        }
        if !local && tx.gas_price() < self.gas_tip {
            return Err(PoolError::Underpriced);
        }
        let sender = tx.sender();
        let mut state = self.current_state.write();
        if state.get_nonce(sender) > tx.nonce() {
            return Err(PoolError::NonceTooLow);
        }
        if state.get_balance(sender) < tx.cost() {
            return Err(PoolError::InsufficientFunds);
        }
        Ok(())
    }

    /// Whether the transaction would land in the queue rather than pending.
    fn is_future(&mut self, from: &Address, tx: &SignedTransaction) -> bool {
        match self.pending.get(from) {
            None => self.pending_nonce(*from) != tx.nonce(),
            Some(list) => {
                if list.contains(tx.nonce()) {
                    false
                } else {
                    !list.contains(tx.nonce().wrapping_sub(1))
                }
            }
        }
    }

    // ---- admission core ----

    /// Validate and insert one transaction, evicting cheaper remotes when
    /// the pool is full. Returns whether an existing entry was replaced.
    pub(crate) fn add(
        &mut self,
        tx: Arc<SignedTransaction>,
        local: bool,
    ) -> Result<bool, PoolError> {
        let hash = tx.hash();
        if self.all.contains(&hash) {
            trace!(%hash, "discarding already known transaction");
            return Err(PoolError::AlreadyKnown);
        }
        let is_local = local || self.locals.contains_tx(&tx);
        self.validate_tx(&tx, is_local)?;
        let from = tx.sender();

        // If the pool is full by slots, make room or give up.
        if self.all.slots() + num_slots(&tx) > self.config.global_slots + self.config.global_queue {
            if !is_local && self.priced.underpriced(&self.all, &tx) {
                trace!(%hash, price = %tx.gas_price(), "discarding underpriced transaction");
                return Err(PoolError::Underpriced);
            }
            let need =
                self.all.slots() + num_slots(&tx) - (self.config.global_slots + self.config.global_queue);
            let Some(drop) = self.priced.discard(&self.all, need, is_local) else {
                // Could not free enough space for a remote transaction.
                trace!(%hash, "discarding overflown transaction");
                return Err(PoolError::Underpriced);
            };
            // A future transaction must never churn the pending set.
            if !is_local && self.is_future(&from, &tx) {
                let replaces_pending = drop.iter().any(|dropped| {
                    self.pending
                        .get(&dropped.sender())
                        .map_or(false, |list| list.contains(dropped.nonce()))
                });
                if replaces_pending {
                    self.priced.restore(drop);
                    return Err(PoolError::FutureReplacePending);
                }
            }
            for dropped in drop {
                trace!(hash = %dropped.hash(), "discarding freshly underpriced transaction");
                self.remove_tx(dropped.hash(), false);
            }
        }

        // Replacing an already pending transaction?
        let replaces_pending = self
            .pending
            .get(&from)
            .map_or(false, |list| list.contains(tx.nonce()));
        if replaces_pending {
            let (inserted, old) = match self.pending.get_mut(&from) {
                Some(list) => list.add(tx.clone(), self.config.price_bump),
                None => (false, None),
            };
            if !inserted {
                return Err(PoolError::ReplaceUnderpriced);
            }
            let replaced = old.is_some();
            if let Some(old) = old {
                self.all.remove(&old.hash());
                self.priced_removed(1);
            }
            self.all.add(tx.clone(), is_local);
            self.priced.put(tx.clone(), is_local);
            self.journal_tx(from, &tx);
            self.queue_tx_event(tx.clone());
            debug!(%hash, %from, "pooled new executable transaction");
            return Ok(replaced);
        }

        // New or queue-bound transaction.
        let replaced = self.enqueue_tx(hash, tx.clone(), is_local, true)?;

        if local && !self.locals.contains(&from) {
            info!(%from, "setting new local account");
            self.locals.add(from);
            let migrated = self.all.remote_to_locals(&self.locals);
            self.priced_removed(migrated);
        }
        self.journal_tx(from, &tx);
        debug!(%hash, %from, "pooled new future transaction");
        Ok(replaced)
    }

    pub(crate) fn add_txs_locked(
        &mut self,
        txs: Vec<Arc<SignedTransaction>>,
        local: bool,
    ) -> (Vec<Result<(), PoolError>>, HashSet<Address>) {
        let mut dirty = HashSet::new();
        let mut results = Vec::with_capacity(txs.len());
        for tx in txs {
            match self.add(tx.clone(), local) {
                Ok(replaced) => {
                    if !replaced {
                        dirty.insert(tx.sender());
                    }
                    results.push(Ok(()));
                }
                Err(e) => results.push(Err(e)),
            }
        }
        (results, dirty)
    }

    /// Insert a transaction into the queue. `add_all` also registers it in
    /// the lookup and the priced index (reinserts of tracked entries skip
    /// that).
    pub(crate) fn enqueue_tx(
        &mut self,
        hash: Hash,
        tx: Arc<SignedTransaction>,
        local: bool,
        add_all: bool,
    ) -> Result<bool, PoolError> {
        let from = tx.sender();
        let (inserted, old) = self
            .queue
            .entry(from)
            .or_insert_with(|| TxList::new(false))
            .add(tx.clone(), self.config.price_bump);
        if !inserted {
            // An older transaction was better
            return Err(PoolError::ReplaceUnderpriced);
        }
        if let Some(old) = &old {
            self.all.remove(&old.hash());
            self.priced_removed(1);
        }
        if !self.all.contains(&hash) && !add_all {
            warn!(%hash, "missing transaction in lookup set");
        }
        if add_all {
            self.all.add(tx.clone(), local);
            self.priced.put(tx, local);
        }
        self.beats.entry(from).or_insert_with(Instant::now);
        Ok(old.is_some())
    }

    /// Move a transaction into the pending list, displacing a same-nonce
    /// entry when allowed. Updates the expected-nonce projection and the
    /// account heartbeat.
    pub(crate) fn promote_tx(&mut self, addr: Address, hash: Hash, tx: Arc<SignedTransaction>) -> bool {
        let (inserted, old) = self
            .pending
            .entry(addr)
            .or_insert_with(|| TxList::new(true))
            .add(tx.clone(), self.config.price_bump);
        if !inserted {
            // An older transaction was better, discard this one
            self.all.remove(&hash);
            self.priced_removed(1);
            return false;
        }
        if let Some(old) = old {
            self.all.remove(&old.hash());
            self.priced_removed(1);
        }
        let next = tx.nonce() + 1;
        self.noncer().set(addr, next);
        self.beats.insert(addr, Instant::now());
        true
    }

    fn journal_tx(&mut self, from: Address, tx: &SignedTransaction) {
        if !self.locals.contains(&from) {
            return;
        }
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.insert(tx) {
                warn!(error = %e, "failed to journal local transaction");
            }
        }
    }

    fn queue_tx_event(&mut self, tx: Arc<SignedTransaction>) {
        self.queued_events
            .entry(tx.sender())
            .or_default()
            .insert(tx.nonce(), tx);
    }

    pub(crate) fn local_txs(&self) -> HashMap<Address, Vec<Arc<SignedTransaction>>> {
        let mut out = HashMap::new();
        for addr in self.locals.flatten() {
            let mut txs = Vec::new();
            if let Some(list) = self.pending.get(&addr) {
                txs.extend(list.flatten());
            }
            if let Some(list) = self.queue.get(&addr) {
                txs.extend(list.flatten());
            }
            if !txs.is_empty() {
                out.insert(addr, txs);
            }
        }
        out
    }

    // ---- removal ----

    /// Remove a transaction wherever it lives. Successors of a removed
    /// pending entry are postponed back into the queue.
    pub(crate) fn remove_tx(&mut self, hash: Hash, outofbound: bool) {
        let Some(tx) = self.all.get(&hash).cloned() else {
            return;
        };
        let addr = tx.sender();
        let nonce = tx.nonce();

        self.all.remove(&hash);
        if outofbound {
            self.priced_removed(1);
        }

        let mut postponed = Vec::new();
        let mut removed_from_pending = false;
        if let Some(list) = self.pending.get_mut(&addr) {
            let (removed, invalids) = list.remove(nonce);
            if removed {
                removed_from_pending = true;
                postponed = invalids;
                if list.is_empty() {
                    self.pending.remove(&addr);
                }
            }
        }
        if removed_from_pending {
            for tx in postponed {
                let hash = tx.hash();
                if let Err(e) = self.enqueue_tx(hash, tx, false, false) {
                    debug!(%hash, error = %e, "failed to postpone demoted transaction");
                }
            }
            self.noncer().set_if_lower(addr, nonce);
            return;
        }

        let mut gone = false;
        if let Some(list) = self.queue.get_mut(&addr) {
            list.remove(nonce);
            gone = list.is_empty();
        }
        if gone {
            self.queue.remove(&addr);
            self.beats.remove(&addr);
        }
    }

    // ---- promotion / demotion ----

    /// Move transactions that have become executable from the queue into
    /// pending, dropping anything unpayable or stale on the way. Returns the
    /// promoted transactions.
    pub(crate) fn promote_executables(
        &mut self,
        accounts: &[Address],
    ) -> Vec<Arc<SignedTransaction>> {
        let mut promoted = Vec::new();
        for addr in accounts {
            if !self.queue.contains_key(addr) {
                continue;
            }
            let state_nonce = self.current_state.write().get_nonce(*addr);
            let balance = self.current_state.write().get_balance(*addr);
            let start = self.pending_nonce(*addr);

            let (forwards, drops, readies) = match self.queue.get_mut(addr) {
                Some(list) => {
                    let forwards = list.forward(state_nonce);
                    let (drops, _) = list.filter(balance, self.current_max_gas);
                    let readies = list.ready(start);
                    (forwards, drops, readies)
                }
                None => continue,
            };
            for tx in &forwards {
                self.all.remove(&tx.hash());
                trace!(hash = %tx.hash(), "removed old queued transaction");
            }
            for tx in &drops {
                self.all.remove(&tx.hash());
                trace!(hash = %tx.hash(), "removed unpayable queued transaction");
            }
            self.priced_removed(forwards.len() + drops.len());

            for tx in readies {
                let hash = tx.hash();
                if self.promote_tx(*addr, hash, tx.clone()) {
                    promoted.push(tx);
                }
            }

            // Cap the queue of non-local accounts
            if !self.locals.contains(addr) {
                let caps = match self.queue.get_mut(addr) {
                    Some(list) => list.cap(self.config.account_queue as usize),
                    None => Vec::new(),
                };
                for tx in &caps {
                    self.all.remove(&tx.hash());
                    trace!(hash = %tx.hash(), "removed cap-exceeding queued transaction");
                }
                self.priced_removed(caps.len());
            }

            let empty = self.queue.get(addr).map_or(true, TxList::is_empty);
            if empty {
                self.queue.remove(addr);
                self.beats.remove(addr);
            }
        }
        promoted
    }

    /// Drop pending transactions invalidated by the current state (included
    /// nonces, unpayable costs); push gapped survivors back into the queue.
    pub(crate) fn demote_unexecutables(&mut self) {
        let addresses: Vec<Address> = self.pending.keys().copied().collect();
        for addr in addresses {
            let state_nonce = self.current_state.write().get_nonce(addr);
            let balance = self.current_state.write().get_balance(addr);

            let (olds, drops, invalids, gapped, empty) = match self.pending.get_mut(&addr) {
                Some(list) => {
                    let olds = list.forward(state_nonce);
                    let (drops, invalids) = list.filter(balance, self.current_max_gas);
                    // A gap in front means a tracking bug; postpone the rest
                    let gapped = if !list.is_empty() && list.get(state_nonce).is_none() {
                        warn!(%addr, "demoting invalidated transactions past gap");
                        list.cap(0)
                    } else {
                        Vec::new()
                    };
                    let empty = list.is_empty();
                    (olds, drops, invalids, gapped, empty)
                }
                None => continue,
            };

            for tx in &olds {
                self.all.remove(&tx.hash());
                trace!(hash = %tx.hash(), "removed old pending transaction");
            }
            for tx in &drops {
                self.all.remove(&tx.hash());
                trace!(hash = %tx.hash(), "removed unpayable pending transaction");
            }
            for tx in invalids.into_iter().chain(gapped) {
                let hash = tx.hash();
                if let Err(e) = self.enqueue_tx(hash, tx, false, false) {
                    debug!(%hash, error = %e, "failed to demote pending transaction");
                }
            }
            if empty {
                self.pending.remove(&addr);
            }
        }
    }

    // ---- truncation ----

    /// Enforce the global pending cap by repeatedly shaving the biggest
    /// offenders down towards each other, never below the per-account
    /// guarantee. Locals are exempt.
    pub(crate) fn truncate_pending(&mut self) {
        let mut pending: u64 = self.pending.values().map(|l| l.len() as u64).sum();
        if pending <= self.config.global_slots {
            return;
        }

        let mut spammers: std::collections::BinaryHeap<(usize, Address)> =
            std::collections::BinaryHeap::new();
        for (addr, list) in &self.pending {
            if !self.locals.contains(addr) && list.len() as u64 > self.config.account_slots {
                spammers.push((list.len(), *addr));
            }
        }

        let mut offenders: Vec<Address> = Vec::new();
        while pending > self.config.global_slots && !spammers.is_empty() {
            let Some((_, offender)) = spammers.pop() else {
                break;
            };
            offenders.push(offender);

            if offenders.len() > 1 {
                let threshold = self.pending.get(&offender).map_or(0, TxList::len);
                while pending > self.config.global_slots
                    && self
                        .pending
                        .get(&offenders[offenders.len() - 2])
                        .map_or(0, TxList::len)
                        > threshold
                {
                    for addr in offenders[..offenders.len() - 1].to_vec() {
                        self.drop_last_pending(addr);
                        pending -= 1;
                        if pending <= self.config.global_slots {
                            break;
                        }
                    }
                }
            }
        }

        // All offenders equalized; shave them in lockstep down to the
        // per-account guarantee.
        if pending > self.config.global_slots && !offenders.is_empty() {
            while pending > self.config.global_slots
                && self
                    .pending
                    .get(&offenders[offenders.len() - 1])
                    .map_or(0, TxList::len) as u64
                    > self.config.account_slots
            {
                for addr in offenders.clone() {
                    self.drop_last_pending(addr);
                    pending -= 1;
                    if pending <= self.config.global_slots {
                        break;
                    }
                }
            }
        }
    }

    fn drop_last_pending(&mut self, addr: Address) {
        let caps = match self.pending.get_mut(&addr) {
            Some(list) if !list.is_empty() => list.cap(list.len() - 1),
            _ => return,
        };
        for tx in &caps {
            self.all.remove(&tx.hash());
            trace!(hash = %tx.hash(), "removed fairness-exceeding pending transaction");
        }
        let count = caps.len();
        self.priced_removed(count);
        if let Some(tx) = caps.first() {
            self.noncer().set_if_lower(addr, tx.nonce());
        }
    }

    /// Enforce the global queue cap, evicting from the account with the
    /// oldest heartbeat first, highest nonces first within an account.
    pub(crate) fn truncate_queue(&mut self) {
        let queued: u64 = self.queue.values().map(|l| l.len() as u64).sum();
        if queued <= self.config.global_queue {
            return;
        }

        let mut addresses: Vec<(Address, Instant)> = self
            .queue
            .keys()
            .filter(|addr| !self.locals.contains(addr))
            .map(|addr| {
                let beat = self.beats.get(addr).copied().unwrap_or_else(Instant::now);
                (*addr, beat)
            })
            .collect();
        // Youngest heartbeat first so the oldest pops off the tail
        addresses.sort_by(|a, b| b.1.cmp(&a.1));

        let mut drop = queued - self.config.global_queue;
        while drop > 0 {
            let Some((addr, _)) = addresses.pop() else {
                break;
            };
            let txs = match self.queue.get(&addr) {
                Some(list) => list.flatten(),
                None => continue,
            };
            let size = txs.len() as u64;
            if size <= drop {
                for tx in txs {
                    self.remove_tx(tx.hash(), true);
                }
                drop -= size;
                continue;
            }
            for tx in txs.into_iter().rev() {
                if drop == 0 {
                    break;
                }
                self.remove_tx(tx.hash(), true);
                drop -= 1;
            }
        }
    }

    /// Drop queued transactions of non-local accounts whose last promotion
    /// is older than the configured lifetime.
    pub(crate) fn evict_stale(&mut self) {
        let stale: Vec<Address> = self
            .queue
            .keys()
            .filter(|addr| !self.locals.contains(addr))
            .filter(|addr| {
                self.beats
                    .get(addr)
                    .map_or(true, |beat| beat.elapsed() > self.config.lifetime)
            })
            .copied()
            .collect();
        for addr in stale {
            let txs = match self.queue.get(&addr) {
                Some(list) => list.flatten(),
                None => continue,
            };
            debug!(%addr, count = txs.len(), "evicting timed-out queued transactions");
            for tx in txs {
                self.remove_tx(tx.hash(), true);
            }
        }
    }

    pub(crate) fn rotate_journal(&mut self) {
        let local_txs = self.local_txs();
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.rotate(local_txs) {
                warn!(error = %e, "failed to rotate local tx journal");
            }
        }
    }

    // ---- reset ----

    /// Realign the pool with a new head: replay transactions dropped by a
    /// reorg, refresh the state view and the nonce projections.
    pub(crate) fn reset(&mut self, old_head: Option<&BlockHeader>, new_head: Option<BlockHeader>) {
        let new_head = new_head.unwrap_or_else(|| self.chain.current_block());

        let mut reinject: Vec<Arc<SignedTransaction>> = Vec::new();
        if let Some(old) = old_head {
            if old.hash() != new_head.hash() && old.hash() != new_head.parent_hash() {
                let depth = old.number().abs_diff(new_head.number());
                if depth > MAX_REORG_DEPTH {
                    debug!(depth, "skipping deep transaction reorg");
                } else {
                    match self.reorg_difference(old, &new_head) {
                        Some(txs) => reinject = txs,
                        None => return,
                    }
                }
            }
        }

        match self.chain.state_at(&new_head.hash()) {
            Ok(state) => {
                self.current_state = state;
                self.pending_nonces = Some(Noncer::new(self.current_state.clone()));
                self.current_max_gas = new_head.gas_limit();
            }
            Err(e) => {
                warn!(error = %e, "failed to reset txpool state");
                return;
            }
        }
        self.current_head = new_head;

        if !reinject.is_empty() {
            debug!(count = reinject.len(), "reinjecting stale transactions");
            // AlreadyKnown and friends are expected here and ignored.
            self.add_txs_locked(reinject, false);
        }
    }

    /// Transactions included in the old branch but absent from the new one.
    fn reorg_difference(
        &self,
        old_head: &BlockHeader,
        new_head: &BlockHeader,
    ) -> Option<Vec<Arc<SignedTransaction>>> {
        let mut discarded: Vec<Arc<SignedTransaction>> = Vec::new();
        let mut included: HashSet<Hash> = HashSet::new();

        let mut rem = match self.chain.get_block(&old_head.hash(), old_head.number()) {
            Some(block) => block,
            None => {
                warn!(hash = %old_head.hash(), "transaction pool reset with missing old head");
                return None;
            }
        };
        let mut add = match self.chain.get_block(&new_head.hash(), new_head.number()) {
            Some(block) => block,
            None => {
                warn!(hash = %new_head.hash(), "transaction pool reset with missing new head");
                return None;
            }
        };

        while rem.number() > add.number() {
            discarded.extend(rem.transactions().iter().cloned());
            rem = self.parent_of(&rem)?;
        }
        while add.number() > rem.number() {
            included.extend(add.transactions().iter().map(|tx| tx.hash()));
            add = self.parent_of(&add)?;
        }
        while rem.hash() != add.hash() {
            discarded.extend(rem.transactions().iter().cloned());
            included.extend(add.transactions().iter().map(|tx| tx.hash()));
            if rem.number() == 0 || add.number() == 0 {
                warn!("unrooted chains seen by transaction pool");
                return None;
            }
            rem = self.parent_of(&rem)?;
            add = self.parent_of(&add)?;
        }

        discarded.retain(|tx| !included.contains(&tx.hash()));
        Some(discarded)
    }

    fn parent_of(&self, block: &axion_types::Block) -> Option<axion_types::Block> {
        let parent = self
            .chain
            .get_block(&block.parent_hash(), block.number().checked_sub(1)?);
        if parent.is_none() {
            warn!(hash = %block.parent_hash(), "missing ancestor during txpool reset");
        }
        parent
    }

    /// Drop queued events that a reset made stale (nonces now below the
    /// expected one for their sender).
    fn prune_stale_events(&mut self) {
        let mut events = std::mem::take(&mut self.queued_events);
        events.retain(|addr, set| {
            let next = self.pending_nonce(*addr);
            set.retain(|nonce, _| *nonce >= next);
            !set.is_empty()
        });
        self.queued_events = events;
    }

    /// Drain the queued promotion/replacement events.
    pub(crate) fn take_events(&mut self) -> Vec<Arc<SignedTransaction>> {
        std::mem::take(&mut self.queued_events)
            .into_values()
            .flat_map(BTreeMap::into_values)
            .collect()
    }
}

/// One full maintenance pass: optional reset, then promotion, demotion,
/// truncation, finishing with the batched transaction events.
pub(crate) fn run_reorg(
    inner: &RwLock<Inner>,
    feed: &Feed<NewTxsEvent>,
    reset: Option<(Option<BlockHeader>, Option<BlockHeader>)>,
    dirty: Option<HashSet<Address>>,
) {
    let events = {
        let mut inner = inner.write();
        let was_reset = reset.is_some();
        let mut promote: Vec<Address> = dirty.map(|d| d.into_iter().collect()).unwrap_or_default();
        if let Some((old, new)) = reset {
            inner.reset(old.as_ref(), new);
            // Nonces moved; drop the events that became stale and promote
            // everything that queued up.
            inner.prune_stale_events();
            promote = inner.queue.keys().copied().collect();
        } else {
            promote.retain(|addr| inner.queue.contains_key(addr));
        }

        let promoted = inner.promote_executables(&promote);

        if was_reset {
            inner.demote_unexecutables();
            let mut nonces = HashMap::with_capacity(inner.pending.len());
            for (addr, list) in &inner.pending {
                if let Some(highest) = list.last() {
                    nonces.insert(*addr, highest.nonce() + 1);
                }
            }
            inner.noncer().set_all(nonces);
        }

        inner.truncate_pending();
        inner.truncate_queue();

        for tx in promoted {
            inner.queue_tx_event(tx);
        }
        inner.take_events()
    };
    if !events.is_empty() {
        feed.send(NewTxsEvent { txs: events });
    }
}

/// Background task owning all mutating maintenance: reset/promote requests,
/// age-based queue eviction and journal rotation.
async fn maintenance_loop(
    inner: Arc<RwLock<Inner>>,
    chain: Arc<dyn ChainBackend>,
    feed: Feed<NewTxsEvent>,
    config: Config,
    mut requests: mpsc::UnboundedReceiver<Request>,
) {
    let mut head_events = chain.subscribe_chain_head();
    let mut heads_open = true;
    let mut evict = tokio::time::interval(config.eviction_interval);
    evict.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut rejournal = tokio::time::interval(config.rejournal);
    rejournal.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Intervals fire immediately; swallow the initial ticks.
    evict.tick().await;
    rejournal.tick().await;

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(Request::Reset { old, new, done }) => {
                    run_reorg(&inner, &feed, Some((old, new)), None);
                    let _ = done.send(());
                }
                Some(Request::Promote { accounts, done }) => {
                    run_reorg(&inner, &feed, None, Some(accounts));
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
                Some(Request::Shutdown) | None => break,
            },
            head = head_events.recv(), if heads_open => match head {
                Ok(event) => {
                    let old = inner.read().current_head.clone();
                    let new = event.block.header().clone();
                    run_reorg(&inner, &feed, Some((Some(old), Some(new))), None);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "transaction pool lagged behind chain head events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    heads_open = false;
                }
            },
            _ = evict.tick() => {
                inner.write().evict_stale();
            }
            _ = rejournal.tick() => {
                inner.write().rotate_journal();
            }
        }
    }
}
