//! Cached reader/committer over the current-state store.

use crate::error::StateError;
use axion_storage::{schema, AccountMetadata, KvStore, StorageError};
use axion_types::{Address, Hash, StateAccount};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Number of codehash->size associations to keep.
const CODE_SIZE_CACHE_ENTRIES: usize = 100_000;

/// Cache budget granted for caching clean code, in bytes.
const CODE_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Byte-budgeted LRU over code blobs. `lru` only bounds entry counts, so the
/// total is tracked here and the tail evicted until the budget holds.
struct SizeConstrainedCache {
    inner: LruCache<Hash, Vec<u8>>,
    total: usize,
    budget: usize,
}

impl SizeConstrainedCache {
    fn new(budget: usize) -> Self {
        Self {
            inner: LruCache::unbounded(),
            total: 0,
            budget,
        }
    }

    fn get(&mut self, hash: &Hash) -> Option<Vec<u8>> {
        self.inner.get(hash).cloned()
    }

    fn add(&mut self, hash: Hash, code: Vec<u8>) {
        if self.inner.contains(&hash) {
            return;
        }
        self.total += code.len();
        self.inner.push(hash, code);
        while self.total > self.budget {
            match self.inner.pop_lru() {
                Some((_, evicted)) => self.total -= evicted.len(),
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn total_bytes(&self) -> usize {
        self.total
    }
}

/// Caching wrapper around the current-state store: LRU-cached contract code
/// plus the account loader/committer.
pub struct CachingDb {
    disk: Arc<dyn KvStore>,
    code_cache: Mutex<SizeConstrainedCache>,
    code_size_cache: Mutex<LruCache<Hash, usize>>,
}

impl CachingDb {
    pub fn new(disk: Arc<dyn KvStore>) -> Self {
        let entries =
            NonZeroUsize::new(CODE_SIZE_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            disk,
            code_cache: Mutex::new(SizeConstrainedCache::new(CODE_CACHE_BYTES)),
            code_size_cache: Mutex::new(LruCache::new(entries)),
        }
    }

    /// The underlying key-value disk database.
    pub fn disk(&self) -> &Arc<dyn KvStore> {
        &self.disk
    }

    /// Retrieve a contract's code by its Keccak-256 hash. A missing row is an
    /// error — distinct from the empty-code sentinel, which callers resolve
    /// before reaching disk.
    pub fn contract_code(&self, code_hash: &Hash) -> Result<Vec<u8>, StateError> {
        if let Some(code) = self.code_cache.lock().get(code_hash) {
            return Ok(code);
        }
        match self.disk.get(&schema::code_key(code_hash))? {
            Some(code) if !code.is_empty() => {
                self.code_cache.lock().add(*code_hash, code.clone());
                self.code_size_cache.lock().put(*code_hash, code.len());
                Ok(code)
            }
            _ => Err(StateError::CodeNotFound(*code_hash)),
        }
    }

    /// Retrieve a contract code's size.
    pub fn contract_code_size(&self, code_hash: &Hash) -> Result<usize, StateError> {
        if let Some(size) = self.code_size_cache.lock().get(code_hash) {
            return Ok(*size);
        }
        Ok(self.contract_code(code_hash)?.len())
    }

    /// Store a contract's code under its hash and warm the caches.
    pub fn write_code(&self, code_hash: &Hash, code: &[u8]) -> Result<(), StateError> {
        self.disk.put(&schema::code_key(code_hash), code)?;
        self.code_cache.lock().add(*code_hash, code.to_vec());
        self.code_size_cache.lock().put(*code_hash, code.len());
        Ok(())
    }

    /// Load an account and all of its storage rows in one pass over the
    /// address prefix. Returns `None` when no rows exist.
    pub fn get_account(&self, addr: &Address) -> Result<Option<StateAccount>, StateError> {
        let mut account = StateAccount::new();
        let mut seen = false;
        for row in self.disk.iter_prefix(addr.as_bytes(), &[]) {
            let (key, value) = row?;
            if schema::is_metadata_key(addr, &key) {
                let meta = AccountMetadata::from_bytes(&value)?;
                account.nonce = meta.nonce;
                account.balance = meta.balance;
                account.code_hash = meta.code_hash;
                seen = true;
            } else if let Some(slot) = schema::parse_storage_key(addr, &key) {
                let value = Hash::from_slice(&value).map_err(|e| {
                    StorageError::Serialization(format!("storage row for {addr}: {e}"))
                })?;
                account.storage.insert(slot, value);
                seen = true;
            }
            // Rows of other lengths belong to other key spaces; skip them.
        }
        Ok(seen.then_some(account))
    }

    /// Write an account's metadata record and pending storage through one
    /// atomic batch: either every row lands or none do.
    pub fn commit_account(
        &self,
        addr: &Address,
        metadata: &[u8],
        pending_storage: &HashMap<Hash, Hash>,
    ) -> Result<(), StateError> {
        let mut batch = self.disk.new_batch();
        batch.put(&schema::metadata_key(addr), metadata);
        for (slot, value) in pending_storage {
            batch.put(&schema::storage_key(addr, slot), value.as_bytes());
        }
        batch.write()?;
        Ok(())
    }
}
