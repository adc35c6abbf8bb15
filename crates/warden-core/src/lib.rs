//! Warden Core
//!
//! Entry point for embedding the consent layer in a page:
//! - `Config`: JSON configuration with the original option names
//! - `CookieBanner`: consent store plus interception layer for one document
//!
//! The banner UI, locale loading and cross-subdomain sync live outside this
//! crate and talk to it through `CookieBanner` and the
//! `cookieConsentChanged` event.

mod banner;
mod config;
mod error;

pub use banner::CookieBanner;
pub use config::Config;
pub use error::CoreError;

// Re-export the building blocks
pub use warden_blocker::{
    BlockPatterns, BlockedCookie, BlockerConfig, BlockerError, CookieBlocker, DeferredAction,
    PreConsentPolicy, ScriptPayload, Surface, Verdict,
};
pub use warden_consent::{
    category, ConsentChanged, ConsentChoices, ConsentListener, ConsentManager, ConsentOptions,
    ConsentRecord, ConsentSource, ErrorReporter, MemoryReporter, Report, SubscriptionId,
    TracingReporter, CONSENT_CHANGED_EVENT, CONSENT_KEY,
};
pub use warden_dom::{Document, DomError, Element, Primitive};
pub use warden_storage::{
    ConsentBackend, CookieStorage, LocalStorage, MemoryStorage, StorageError, StorageMethod,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
