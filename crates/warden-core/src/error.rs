//! Facade error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),

    #[error("Blocker error: {0}")]
    Blocker(#[from] warden_blocker::BlockerError),

    #[error("Document error: {0}")]
    Dom(#[from] warden_dom::DomError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
