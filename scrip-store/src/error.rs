use thiserror::Error;

/// Result alias for sink operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type surfaced by the persistence sinks.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<heed::Error> for StoreError {
    fn from(value: heed::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
