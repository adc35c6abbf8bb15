//! DOM error types

use thiserror::Error;

use crate::Primitive;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(String),

    #[error("Reference node is not a child of the parent")]
    NotFound,

    #[error("Invalid attribute name: {0:?}")]
    InvalidCharacter(String),

    #[error("Primitive is not configurable: {0}")]
    NotConfigurable(Primitive),

    #[error("Invalid document URL: {0}")]
    InvalidUrl(String),

    #[error("Insertion failed: {0}")]
    InsertionFailed(String),
}
