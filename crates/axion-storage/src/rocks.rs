//! RocksDB-backed key/value store.

use crate::error::StorageError;
use crate::kv::{KvBatch, KvIter, KvStore};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Cache size in MB
    pub cache_size_mb: usize,
    /// Max open files
    pub max_open_files: i32,
    /// Compression type
    pub compression: Compression,
    /// Write buffer size in MB
    pub write_buffer_size_mb: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            cache_size_mb: 512,
            max_open_files: 1024,
            compression: Compression::Lz4,
            write_buffer_size_mb: 64,
        }
    }
}

/// Compression type for the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    fn to_rocksdb(self) -> rocksdb::DBCompressionType {
        match self {
            Compression::None => rocksdb::DBCompressionType::None,
            Compression::Snappy => rocksdb::DBCompressionType::Snappy,
            Compression::Lz4 => rocksdb::DBCompressionType::Lz4,
            Compression::Zstd => rocksdb::DBCompressionType::Zstd,
        }
    }
}

/// RocksDB wrapper exposing the flat `KvStore` key space.
pub struct RocksKv {
    db: Arc<DB>,
}

impl RocksKv {
    /// Open a database at the given path.
    pub fn open(path: &Path, config: &DatabaseConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);

        let cache = rocksdb::Cache::new_lru_cache(config.cache_size_mb * 1024 * 1024);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_block_cache(&cache);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(config.compression.to_rocksdb());
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);

        let db = DB::open(&opts, path)?;
        info!(path = %path.display(), "opened rocksdb store");

        Ok(Self { db: Arc::new(db) })
    }

    /// Compact the whole key space.
    pub fn compact(&self) {
        self.db.compact_range(None::<&[u8]>, None::<&[u8]>);
    }
}

impl KvStore for RocksKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.db.get_pinned(key)?.is_some())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db.delete(key)?;
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8], start: &[u8]) -> KvIter<'_> {
        let mut from = prefix.to_vec();
        from.extend_from_slice(start);
        let prefix = prefix.to_vec();
        let iter = self
            .db
            .iterator(IteratorMode::From(&from, Direction::Forward))
            .map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(StorageError::from)
            })
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&prefix),
                // Surface backend errors to the caller before stopping.
                Err(_) => true,
            });
        Box::new(iter)
    }

    fn new_batch(&self) -> Box<dyn KvBatch + '_> {
        Box::new(RocksBatch {
            db: &self.db,
            inner: rocksdb::WriteBatch::default(),
        })
    }
}

struct RocksBatch<'a> {
    db: &'a DB,
    inner: rocksdb::WriteBatch,
}

impl KvBatch for RocksBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.inner.put(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.inner.delete(key);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn write(self: Box<Self>) -> Result<(), StorageError> {
        self.db.write(self.inner)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (RocksKv, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = RocksKv::open(temp_dir.path(), &DatabaseConfig::default()).unwrap();
        (db, temp_dir)
    }

    #[test]
    fn test_put_and_get() {
        let (db, _temp) = create_test_db();
        db.put(b"test_key", b"test_value").unwrap();
        assert_eq!(db.get(b"test_key").unwrap(), Some(b"test_value".to_vec()));
        assert!(db.has(b"test_key").unwrap());
    }

    #[test]
    fn test_delete() {
        let (db, _temp) = create_test_db();
        db.put(b"test_key", b"test_value").unwrap();
        db.delete(b"test_key").unwrap();
        assert_eq!(db.get(b"test_key").unwrap(), None);
    }

    #[test]
    fn test_batch_write() {
        let (db, _temp) = create_test_db();

        let mut batch = db.new_batch();
        batch.put(b"key1", b"value1");
        batch.put(b"key2", b"value2");
        batch.delete(b"key1");
        batch.write().unwrap();

        assert_eq!(db.get(b"key1").unwrap(), None);
        assert_eq!(db.get(b"key2").unwrap(), Some(b"value2".to_vec()));
    }

    #[test]
    fn test_iter_prefix() {
        let (db, _temp) = create_test_db();
        db.put(b"pfx-1", b"1").unwrap();
        db.put(b"pfx-2", b"2").unwrap();
        db.put(b"other", b"x").unwrap();

        let rows: Vec<_> = db
            .iter_prefix(b"pfx-", b"")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"pfx-1".to_vec());
        assert_eq!(rows[1].0, b"pfx-2".to_vec());
    }
}
