//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded for key {key}")]
    QuotaExceeded { key: String },

    #[error("Cookie write for {key} did not take effect")]
    WriteRejected { key: String },

    #[error("Stored value for {key} is not valid UTF-8")]
    InvalidEncoding { key: String },
}
