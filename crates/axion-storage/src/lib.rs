//! Axion Storage - Byte-oriented key/value stores and the on-disk schema.
//!
//! The state engine talks to two instances of [`KvStore`]: the current-state
//! store and the append-only history store. [`MemoryKv`] backs tests and
//! ephemeral views, [`RocksKv`] the durable deployment. The [`schema`] module
//! owns every byte layout written to either store.

pub mod error;
pub mod kv;
pub mod memory;
pub mod rocks;
pub mod schema;

pub use error::StorageError;
pub use kv::{KvBatch, KvIter, KvStore};
pub use memory::MemoryKv;
pub use rocks::{Compression, DatabaseConfig, RocksKv};
pub use schema::AccountMetadata;
