use crate::address::Address;
use crate::hash::Hash;
use crate::signature::{Ed25519PublicKey, Ed25519Signature};
use crate::u256::U256;
use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

/// Unsigned transaction data.
#[derive(Clone, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    /// Sender's nonce (increments with each tx)
    pub nonce: u64,
    /// Recipient address (None = contract creation)
    pub to: Option<Address>,
    /// Value to transfer
    pub value: U256,
    /// Maximum gas units this tx can consume
    pub gas_limit: u64,
    /// Price per gas unit offered to the block producer
    pub gas_price: U256,
    /// Input data (contract call data or init code)
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(
        nonce: u64,
        to: Option<Address>,
        value: U256,
        gas_limit: u64,
        gas_price: U256,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            nonce,
            to,
            value,
            gas_limit,
            gas_price,
            payload,
        }
    }

    /// Check if this is a contract creation transaction
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// Canonical byte encoding of the unsigned fields.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(110 + self.payload.len());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        match self.to {
            Some(to) => {
                data.push(1);
                data.extend_from_slice(to.as_bytes());
            }
            None => data.push(0),
        }
        data.extend_from_slice(&self.value.to_be_bytes());
        data.extend_from_slice(&self.gas_limit.to_le_bytes());
        data.extend_from_slice(&self.gas_price.to_be_bytes());
        data.extend_from_slice(&self.payload);
        data
    }
}

/// Transaction with signature attached.
///
/// The hash, encoded size and sender address are derived lazily and cached
/// on first use; all three are deterministic for a given transaction.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub signature: Ed25519Signature,
    /// Sender public key (included for recovery)
    pub public_key: Ed25519PublicKey,

    #[serde(skip)]
    cached_hash: OnceLock<Hash>,
    #[serde(skip)]
    cached_size: OnceLock<usize>,
    #[serde(skip)]
    cached_sender: OnceLock<Address>,
    #[serde(skip, default = "Instant::now")]
    arrival: Instant,
}

impl SignedTransaction {
    pub fn new(tx: Transaction, signature: Ed25519Signature, public_key: Ed25519PublicKey) -> Self {
        Self {
            tx,
            signature,
            public_key,
            cached_hash: OnceLock::new(),
            cached_size: OnceLock::new(),
            cached_sender: OnceLock::new(),
            arrival: Instant::now(),
        }
    }

    /// Full canonical encoding including signature and public key.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.tx.encode();
        data.extend_from_slice(self.signature.as_bytes());
        data.extend_from_slice(self.public_key.as_bytes());
        data
    }

    /// Compute (and cache) the transaction hash
    pub fn hash(&self) -> Hash {
        *self.cached_hash.get_or_init(|| Hash::compute(&self.encode()))
    }

    /// Serialized size in bytes, used for pool slot accounting
    pub fn size(&self) -> usize {
        *self.cached_size.get_or_init(|| self.encode().len())
    }

    /// Recover (and cache) the sender address
    pub fn sender(&self) -> Address {
        *self
            .cached_sender
            .get_or_init(|| self.public_key.to_address())
    }

    /// When this transaction object was first seen by this process
    pub fn arrival(&self) -> Instant {
        self.arrival
    }

    pub fn nonce(&self) -> u64 {
        self.tx.nonce
    }

    pub fn gas_limit(&self) -> u64 {
        self.tx.gas_limit
    }

    pub fn gas_price(&self) -> U256 {
        self.tx.gas_price
    }

    pub fn value(&self) -> U256 {
        self.tx.value
    }

    pub fn is_create(&self) -> bool {
        self.tx.is_create()
    }

    /// Maximum amount this transaction can take from the sender's balance:
    /// `gas_limit * gas_price + value`
    pub fn cost(&self) -> U256 {
        U256::from(self.tx.gas_limit)
            .saturating_mul(&self.tx.gas_price)
            .saturating_add(&self.tx.value)
    }

    /// Structural sanity of the carried signature material. A real node
    /// verifies the ed25519 signature here; the pool only requires that the
    /// recovery inputs are present.
    pub fn check_signature(&self) -> bool {
        !self.signature.is_zero() && !self.public_key.is_zero()
    }
}

impl Clone for SignedTransaction {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            signature: self.signature,
            public_key: self.public_key,
            cached_hash: self.cached_hash.clone(),
            cached_size: self.cached_size.clone(),
            cached_sender: self.cached_sender.clone(),
            arrival: self.arrival,
        }
    }
}

impl PartialEq for SignedTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.tx == other.tx
            && self.signature == other.signature
            && self.public_key == other.public_key
    }
}

impl Eq for SignedTransaction {}

impl fmt::Display for SignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx {{ hash: {}, nonce: {}, gas_price: {} }}",
            self.hash(),
            self.tx.nonce,
            self.tx.gas_price
        )
    }
}
