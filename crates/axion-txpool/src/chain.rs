//! The view of the blockchain the pool validates against.

use crate::error::PoolError;
use crate::events::ChainHeadEvent;
use axion_state::StateDb;
use axion_types::{Block, BlockHeader, Hash};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared handle to a state view. The pool reads account nonces and balances
/// through it and must tolerate the state changing underneath between
/// admission and promotion.
pub type SharedState = Arc<RwLock<StateDb>>;

/// Chain access required by the pool: the current head, ancestor blocks for
/// reorg replay, the state at a given head and head-change notifications.
pub trait ChainBackend: Send + Sync + 'static {
    /// Header of the current chain head.
    fn current_block(&self) -> BlockHeader;

    /// Fetch a block by hash and number, if known.
    fn get_block(&self, hash: &Hash, number: u64) -> Option<Block>;

    /// State view at the given block hash.
    fn state_at(&self, hash: &Hash) -> Result<SharedState, PoolError>;

    /// Subscribe to head-change events.
    fn subscribe_chain_head(&self) -> broadcast::Receiver<ChainHeadEvent>;
}
