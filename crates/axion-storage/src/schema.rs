//! Byte-level key layouts for the current-state and history stores.
//!
//! Current state, for account address `A`:
//! - contract code:  `'c' ‖ code_hash`
//! - metadata:       `A ‖ 'm'`
//! - storage slot:   `A ‖ slot_key`
//!
//! History, keyed additionally by position:
//! - metadata:       `A ‖ 'm' ‖ block_number(8 BE) ‖ tx_index(4 BE)`
//! - storage slot:   `A ‖ slot_key ‖ block_number(8 BE) ‖ tx_index(4 BE)`
//!
//! Row kinds under one address prefix are disambiguated by key length.

use crate::error::StorageError;
use axion_types::{Address, Hash, U256};

/// Prefix byte for content-addressed contract code rows.
pub const CODE_PREFIX: u8 = b'c';

/// Tag byte separating account metadata from storage rows.
pub const METADATA_TAG: u8 = b'm';

const METADATA_KEY_LEN: usize = Address::LEN + 1;
const STORAGE_KEY_LEN: usize = Address::LEN + Hash::LEN;
const HISTORY_SUFFIX_LEN: usize = 8 + 4;

/// Key of a contract code row: `'c' ‖ code_hash`
pub fn code_key(code_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + Hash::LEN);
    key.push(CODE_PREFIX);
    key.extend_from_slice(code_hash.as_bytes());
    key
}

/// Key of the current metadata row: `addr ‖ 'm'`
pub fn metadata_key(addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(METADATA_KEY_LEN);
    key.extend_from_slice(addr.as_bytes());
    key.push(METADATA_TAG);
    key
}

/// Key of a current storage row: `addr ‖ slot`
pub fn storage_key(addr: &Address, slot: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(STORAGE_KEY_LEN);
    key.extend_from_slice(addr.as_bytes());
    key.extend_from_slice(slot.as_bytes());
    key
}

/// Key of a history metadata row: `addr ‖ 'm' ‖ bn ‖ txi`
pub fn history_metadata_key(addr: &Address, block_number: u64, tx_index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(METADATA_KEY_LEN + HISTORY_SUFFIX_LEN);
    key.extend_from_slice(addr.as_bytes());
    key.push(METADATA_TAG);
    key.extend_from_slice(&block_number.to_be_bytes());
    key.extend_from_slice(&tx_index.to_be_bytes());
    key
}

/// Key of a history storage row: `addr ‖ slot ‖ bn ‖ txi`
pub fn history_storage_key(
    addr: &Address,
    slot: &Hash,
    block_number: u64,
    tx_index: u32,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(STORAGE_KEY_LEN + HISTORY_SUFFIX_LEN);
    key.extend_from_slice(addr.as_bytes());
    key.extend_from_slice(slot.as_bytes());
    key.extend_from_slice(&block_number.to_be_bytes());
    key.extend_from_slice(&tx_index.to_be_bytes());
    key
}

/// Recognize a current storage row under `addr`, returning its slot key.
pub fn parse_storage_key(addr: &Address, key: &[u8]) -> Option<Hash> {
    if key.len() != STORAGE_KEY_LEN || !key.starts_with(addr.as_bytes()) {
        return None;
    }
    Hash::from_slice(&key[Address::LEN..]).ok()
}

/// Recognize the current metadata row under `addr`.
pub fn is_metadata_key(addr: &Address, key: &[u8]) -> bool {
    key.len() == METADATA_KEY_LEN
        && key.starts_with(addr.as_bytes())
        && key[Address::LEN] == METADATA_TAG
}

/// Recognize a history metadata row under `addr`, returning (block, tx-index).
pub fn parse_history_metadata_key(addr: &Address, key: &[u8]) -> Option<(u64, u32)> {
    if key.len() != METADATA_KEY_LEN + HISTORY_SUFFIX_LEN
        || !key.starts_with(addr.as_bytes())
        || key[Address::LEN] != METADATA_TAG
    {
        return None;
    }
    let bn = u64::from_be_bytes(key[METADATA_KEY_LEN..METADATA_KEY_LEN + 8].try_into().ok()?);
    let txi = u32::from_be_bytes(key[METADATA_KEY_LEN + 8..].try_into().ok()?);
    Some((bn, txi))
}

/// Recognize a history storage row under `addr`, returning
/// (slot, block, tx-index).
pub fn parse_history_storage_key(addr: &Address, key: &[u8]) -> Option<(Hash, u64, u32)> {
    if key.len() != STORAGE_KEY_LEN + HISTORY_SUFFIX_LEN || !key.starts_with(addr.as_bytes()) {
        return None;
    }
    let slot = Hash::from_slice(&key[Address::LEN..STORAGE_KEY_LEN]).ok()?;
    let bn = u64::from_be_bytes(key[STORAGE_KEY_LEN..STORAGE_KEY_LEN + 8].try_into().ok()?);
    let txi = u32::from_be_bytes(key[STORAGE_KEY_LEN + 8..].try_into().ok()?);
    Some((slot, bn, txi))
}

/// Self-describing account metadata record. Written to the `'m'`-tagged rows
/// of both stores; history rows additionally carry the code blob when it
/// changed in that transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccountMetadata {
    pub nonce: u64,
    pub balance: U256,
    pub code_hash: Hash,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "code_hex")]
    pub code: Option<Vec<u8>>,
}

impl AccountMetadata {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

mod code_hex {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        v.as_deref().map(hex::encode).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
