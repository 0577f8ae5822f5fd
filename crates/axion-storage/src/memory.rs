//! In-memory key/value store used by tests and ephemeral state views.

use crate::error::StorageError;
use crate::kv::{KvBatch, KvIter, KvStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `BTreeMap`-backed store. Batches buffer their operations and apply them
/// under a single write lock, so readers never observe a half-written batch.
#[derive(Default)]
pub struct MemoryKv {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.data.read().contains_key(key))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.data.write().remove(key);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8], start: &[u8]) -> KvIter<'_> {
        let mut from = prefix.to_vec();
        from.extend_from_slice(start);
        let prefix = prefix.to_vec();
        let rows: Vec<(Vec<u8>, Vec<u8>)> = self
            .data
            .read()
            .range(from..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(rows.into_iter().map(Ok))
    }

    fn new_batch(&self) -> Box<dyn KvBatch + '_> {
        Box::new(MemoryBatch {
            store: Arc::clone(&self.data),
            ops: Vec::new(),
        })
    }
}

enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

struct MemoryBatch {
    store: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    ops: Vec<BatchOp>,
}

impl KvBatch for MemoryBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put(key.to_vec(), value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.push(BatchOp::Delete(key.to_vec()));
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    fn write(self: Box<Self>) -> Result<(), StorageError> {
        let mut data = self.store.write();
        for op in self.ops {
            match op {
                BatchOp::Put(k, v) => {
                    data.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    data.remove(&k);
                }
            }
        }
        Ok(())
    }
}
