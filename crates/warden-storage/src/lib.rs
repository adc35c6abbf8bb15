//! Warden Storage Layer
//!
//! Consent persistence behind a single `ConsentBackend` trait:
//! - `LocalStorage`: SQLite key/value table, the default backend
//! - `CookieStorage`: a same-site cookie on the host document
//! - `MemoryStorage`: process-local map
//!
//! Every backend stores one value under one named key.

mod backend;
mod cookie;
mod error;
mod local;
mod memory;
mod migrations;

pub use backend::{ConsentBackend, StorageMethod};
pub use cookie::CookieStorage;
pub use error::StorageError;
pub use local::LocalStorage;
pub use memory::MemoryStorage;

pub type Result<T> = std::result::Result<T, StorageError>;
