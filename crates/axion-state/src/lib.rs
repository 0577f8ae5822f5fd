//! Axion State - The versioned, journaling account-state engine.
//!
//! A [`StateDb`] façade exposes account reads and journaled writes over two
//! byte stores: the current-state store (through the LRU-caching
//! [`CachingDb`]) and the append-only per-transaction [`HistoryDb`]. Every
//! mutation lands in a reversible journal; snapshots are journal offsets and
//! reverting replays entries in LIFO order. `finalise` closes a transaction,
//! `commit` flushes a block and returns the canonical write-set digest.

pub mod access_list;
pub mod cached_db;
pub mod error;
pub mod history;
mod journal;
pub mod object;
pub mod statedb;

#[cfg(test)]
mod statedb_tests;

pub use access_list::{AccessList, AccessListItem};
pub use cached_db::CachingDb;
pub use error::StateError;
pub use history::HistoryDb;
pub use object::StateObject;
pub use statedb::StateDb;
