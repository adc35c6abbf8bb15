//! Warden Consent Store
//!
//! Single source of truth for what the user agreed to:
//! - `ConsentRecord`: category flags plus the time of the decision
//! - `ConsentManager`: read/write through a pluggable backend, expiry check
//! - `ConsentEvents`: synchronous `cookieConsentChanged` fan-out
//!
//! No public operation returns an error or panics on a degraded backend.
//! Failures go to the configured `ErrorReporter` and the call degrades to
//! `None`, `false` or a no-op.

mod error;
mod events;
mod manager;
mod record;
mod report;
mod source;

pub use error::ConsentError;
pub use events::{ConsentChanged, ConsentEvents, ConsentListener, SubscriptionId, CONSENT_CHANGED_EVENT};
pub use manager::{ConsentManager, ConsentOptions, OnConsentChange, CONSENT_KEY, DEFAULT_EXPIRE_DAYS};
pub use record::{category, ConsentChoices, ConsentRecord};
pub use report::{ErrorReporter, MemoryReporter, Report, TracingReporter};
pub use source::ConsentSource;

pub use warden_storage::StorageMethod;

pub type Result<T> = std::result::Result<T, ConsentError>;
