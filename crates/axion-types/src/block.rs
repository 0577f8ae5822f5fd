use crate::hash::Hash;
use crate::transaction::SignedTransaction;
use std::sync::Arc;

/// Block header — the collaborator surface the execution core needs.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BlockHeader {
    hash: Hash,
    parent_hash: Hash,
    number: u64,
    gas_limit: u64,
}

impl BlockHeader {
    pub fn new(hash: Hash, parent_hash: Hash, number: u64, gas_limit: u64) -> Self {
        Self {
            hash,
            parent_hash,
            number,
            gas_limit,
        }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn parent_hash(&self) -> Hash {
        self.parent_hash
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
}

/// Block body and header.
#[derive(Clone, Debug, Default)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Arc<SignedTransaction>>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Arc<SignedTransaction>>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number()
    }

    pub fn transactions(&self) -> &[Arc<SignedTransaction>] {
        &self.transactions
    }
}
