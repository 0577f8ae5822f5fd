//! Axion Types - Core type definitions for the Axion execution layer.
//!
//! This crate provides the fundamental value objects shared by the state
//! engine and the transaction pool:
//! - Addresses (20-byte, derived from ed25519 public keys)
//! - Hashes (32-byte; blake3 for identities, Keccak-256 for code and digests)
//! - U256 (256-bit unsigned integer)
//! - Accounts, transactions, blocks, logs, signatures

pub mod account;
pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod log;
pub mod signature;
pub mod transaction;
pub mod u256;

mod serialization;

pub use account::StateAccount;
pub use address::Address;
pub use block::{Block, BlockHeader};
pub use error::TypesError;
pub use hash::{Hash, EMPTY_CODE_HASH};
pub use log::Log;
pub use signature::{Ed25519PublicKey, Ed25519Signature};
pub use transaction::{SignedTransaction, Transaction};
pub use u256::U256;
