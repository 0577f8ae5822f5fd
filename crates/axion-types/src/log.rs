use crate::address::Address;
use crate::hash::Hash;

/// Event emitted by contract execution, annotated with its position.
#[derive(Clone, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the event
    pub address: Address,
    /// Indexed topics
    pub topics: Vec<Hash>,
    /// Unindexed payload
    pub data: Vec<u8>,
    /// Hash of the transaction that emitted this log
    pub tx_hash: Hash,
    /// Position of the transaction within its block
    pub tx_index: usize,
    /// Number of the block the transaction was included in
    pub block_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_default() {
        let log = Log::default();
        assert!(log.topics.is_empty());
        assert_eq!(log.block_number, 0);
    }
}
