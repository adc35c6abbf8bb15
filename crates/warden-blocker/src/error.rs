//! Interception error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockerError {
    #[error("DOM error: {0}")]
    Dom(#[from] warden_dom::DomError),

    #[error("Document has neither head nor body to replay into")]
    NoInsertionTarget,

    #[error("Invalid block pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
