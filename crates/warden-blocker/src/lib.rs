//! Warden Interception Layer
//!
//! Gates third-party scripts and cookies on consent:
//! - Script `src` assignment on elements created through the document
//! - Tree insertion (`appendChild` / `insertBefore`) of script elements
//! - `setAttribute("src", ..)` on script elements
//! - `document.cookie` writes
//!
//! Blocked scripts are kept as deferred actions and replayed through the
//! original primitives once the matching category is granted.

mod blocker;
mod config;
mod deferred;
mod error;
mod patterns;
mod policy;

pub use blocker::{cookie_domains, BlockedCookie, CookieBlocker};
pub use config::{BlockerConfig, PreConsentPolicy};
pub use deferred::{DeferredAction, DeferredQueue, ScriptPayload, Surface};
pub use error::BlockerError;
pub use patterns::{BlockPatterns, InlineSignature};
pub use policy::{cookie_verdict, inline_verdict, script_verdict, Verdict, UNCLASSIFIED};

pub type Result<T> = std::result::Result<T, BlockerError>;
