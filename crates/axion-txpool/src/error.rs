use thiserror::Error;

/// Admission and lifecycle errors surfaced by the transaction pool. All of
/// them are non-fatal: the offending transaction is not stored and the pool
/// remains usable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    #[error("already known")]
    AlreadyKnown,

    #[error("invalid sender")]
    InvalidSender,

    #[error("transaction underpriced")]
    Underpriced,

    #[error("replacement transaction underpriced")]
    ReplaceUnderpriced,

    #[error("future transaction tries to replace pending")]
    FutureReplacePending,

    #[error("nonce too low")]
    NonceTooLow,

    #[error("insufficient funds for gas * price + value")]
    InsufficientFunds,

    #[error("intrinsic gas too low")]
    IntrinsicGas,

    #[error("negative value")]
    NegativeValue,

    #[error("oversized data: {size} bytes, limit {limit}")]
    OversizedData { size: usize, limit: usize },

    #[error("exceeds block gas limit: {have} > {limit}")]
    GasLimit { have: u64, limit: u64 },

    #[error("transaction pool is closed")]
    Closed,

    #[error("no state available for head {0}")]
    StateUnavailable(String),

    #[error("journal error: {0}")]
    Journal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert!(PoolError::Underpriced.to_string().contains("underpriced"));
        let err = PoolError::OversizedData {
            size: 200_000,
            limit: 131_072,
        };
        assert!(err.to_string().contains("200000"));
    }
}
