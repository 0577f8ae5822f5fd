use thiserror::Error;

/// Errors that can occur in type operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("Invalid address length: expected 20, got {0}")]
    InvalidAddressLength(usize),

    #[error("Invalid hash length: expected 32, got {0}")]
    InvalidHashLength(usize),

    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("Invalid public key length: expected {expected}, got {actual}")]
    InvalidPublicKeyLength { expected: usize, actual: usize },

    #[error("U256 overflow")]
    U256Overflow,

    #[error("U256 underflow")]
    U256Underflow,

    #[error("Invalid U256 string: {0}")]
    InvalidU256String(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        TypesError::InvalidHex(e.to_string())
    }
}

impl From<std::array::TryFromSliceError> for TypesError {
    fn from(_: std::array::TryFromSliceError) -> Self {
        TypesError::Serialization("Slice length mismatch".to_string())
    }
}
