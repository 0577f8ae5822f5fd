use axion_storage::StorageError;
use axion_types::Hash;
use thiserror::Error;

/// Errors that can occur in the state engine.
///
/// The first error observed by a `StateDb` is memoised; later reads return
/// typed-zero values and `commit` aborts with the memo.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("contract code {0} not found")]
    CodeNotFound(Hash),

    #[error("account {0} balance underflow")]
    BalanceUnderflow(String),

    #[error("commit aborted due to earlier error: {0}")]
    CommitAborted(String),
}
