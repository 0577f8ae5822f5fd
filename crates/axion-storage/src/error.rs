use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound("abc".to_string());
        assert!(err.to_string().contains("abc"));
    }
}
