//! Axion TxPool - The transaction mempool.
//!
//! Incoming transactions are validated against a live view of the state
//! engine, kept in per-account nonce-sorted lists (executable `pending`,
//! gapped `queue`) and indexed globally by hash and by price. A background
//! task owns all mutating maintenance: promotion and demotion, reorg-aware
//! resets, price/age eviction and the on-disk journal of local
//! transactions.

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
mod journal;
mod list;
mod lookup;
mod noncer;
pub mod pool;
mod priced;
pub mod validation;


pub use chain::{ChainBackend, SharedState};
pub use config::Config;
pub use error::PoolError;
pub use events::{
    ChainEvent, ChainHeadEvent, ChainSideEvent, Feed, NewMinedBlockEvent, NewTxsEvent,
};
pub use pool::{TxPool, TxStatus};
pub use validation::{intrinsic_gas, TX_MAX_SIZE, TX_SLOT_SIZE};
