use crate::address::Address;
use crate::error::TypesError;
use std::fmt;

/// Ed25519 signature (64 bytes) — used for transaction signing.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != 64 {
            return Err(TypesError::InvalidSignatureLength {
                expected: 64,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Default for Ed25519Signature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature(0x{}...)", &hex::encode(&self.0[..8]))
    }
}

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != 32 {
            return Err(TypesError::InvalidPublicKeyLength {
                expected: 32,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derive the account address for this key
    pub fn to_address(&self) -> Address {
        Address::from_public_key(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey(0x{}...)", &hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_from_slice() {
        assert!(Ed25519Signature::from_slice(&[1u8; 64]).is_ok());
        assert!(Ed25519Signature::from_slice(&[1u8; 63]).is_err());
    }

    #[test]
    fn test_public_key_to_address() {
        let pk = Ed25519PublicKey::from_bytes([9u8; 32]);
        assert_eq!(pk.to_address(), Address::from_public_key(&[9u8; 32]));
    }

    #[test]
    fn test_zero_checks() {
        assert!(Ed25519Signature::default().is_zero());
        assert!(!Ed25519Signature::from_bytes([1u8; 64]).is_zero());
        assert!(Ed25519PublicKey::default().is_zero());
    }
}
