use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected by cache: {0}")]
    Rejected(String),

    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored data could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn poisoned(what: &str) -> Self {
        StorageError::Unavailable(format!("{} lock poisoned", what))
    }
}
