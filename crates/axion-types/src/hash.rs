use crate::error::TypesError;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// 32-byte hash value.
///
/// Transactions, headers and addresses hash with blake3 (`compute`); the
/// content-addressed code store and the block commitment digest use
/// Keccak-256 (`keccak`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; 32]);

/// Keccak-256 of the empty byte string. Accounts without code carry this
/// sentinel; it is never written to disk as a code row.
pub const EMPTY_CODE_HASH: Hash = Hash([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2,
    0xdc, 0xc7, 0x03, 0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b,
    0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

impl Hash {
    pub const ZERO: Self = Self([0u8; 32]);
    pub const LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from a byte slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != 32 {
            return Err(TypesError::InvalidHashLength(slice.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Pad-left a short byte string into a hash value.
    pub fn from_low_bytes(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        let n = slice.len().min(32);
        bytes[32 - n..].copy_from_slice(&slice[slice.len() - n..]);
        Self(bytes)
    }

    /// Compute blake3 hash of data
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Compute blake3 hash of multiple data slices
    pub fn compute_multi(data: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for chunk in data {
            hasher.update(chunk);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Compute the Keccak-256 hash of data
    pub fn keccak(data: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Check if hash is zero
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl fmt::LowerHex for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_deterministic() {
        assert_eq!(Hash::compute(b"test"), Hash::compute(b"test"));
        assert_ne!(Hash::compute(b"test"), Hash::compute(b"test2"));
    }

    #[test]
    fn test_empty_code_hash() {
        assert_eq!(Hash::keccak(&[]), EMPTY_CODE_HASH);
    }

    #[test]
    fn test_keccak_known_vector() {
        // keccak256("")
        assert_eq!(
            EMPTY_CODE_HASH.to_hex(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_from_low_bytes() {
        let h = Hash::from_low_bytes(&[0x01, 0x02]);
        assert_eq!(h.as_bytes()[30], 0x01);
        assert_eq!(h.as_bytes()[31], 0x02);
        assert!(h.as_bytes()[..30].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_hex_round_trip() {
        let h = Hash::compute(b"round trip");
        let parsed: Hash = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
    }
}
