//! Pool and chain events delivered through a broadcast feed.

use axion_types::{Block, Hash, SignedTransaction};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Posted when a batch of transactions enters the pending set.
#[derive(Clone, Debug)]
pub struct NewTxsEvent {
    pub txs: Vec<Arc<SignedTransaction>>,
}

/// Posted when a new head block is adopted.
#[derive(Clone, Debug)]
pub struct ChainHeadEvent {
    pub block: Block,
}

/// Posted for blocks that ended up on a side chain during a reorg.
#[derive(Clone, Debug)]
pub struct ChainSideEvent {
    pub block: Block,
}

/// Posted when a block has been imported.
#[derive(Clone, Debug)]
pub struct ChainEvent {
    pub block: Block,
    pub hash: Hash,
}

/// Posted when a block produced locally has been sealed.
#[derive(Clone, Debug)]
pub struct NewMinedBlockEvent {
    pub block: Block,
}

const FEED_CAPACITY: usize = 1024;

/// Multi-subscriber event feed. Dropping a receiver unsubscribes it; a send
/// with no subscribers is a no-op.
pub struct Feed<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Feed<T> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Deliver an event to every live subscriber, returning how many
    /// received it.
    pub fn send(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl<T: Clone> Default for Feed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feed_delivers_to_subscribers() {
        let feed: Feed<u32> = Feed::new();
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        assert_eq!(feed.send(7), 2);
        assert_eq!(rx1.recv().await.unwrap(), 7);
        assert_eq!(rx2.recv().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_receiver_unsubscribes() {
        let feed: Feed<u32> = Feed::new();
        let rx = feed.subscribe();
        drop(rx);
        assert_eq!(feed.send(1), 0);
    }
}
