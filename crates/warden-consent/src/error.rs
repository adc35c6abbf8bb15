//! Consent error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsentError {
    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),

    #[error("Malformed consent payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("onConsentChange callback failed: {0}")]
    Callback(#[source] anyhow::Error),
}
