//! Interception configuration

use serde::{Deserialize, Serialize};

/// How much is blocked before any consent decision exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreConsentPolicy {
    /// Every cookie except the consent cookie itself
    #[default]
    BlockAll,
    /// Only cookies matching a known category pattern
    KnownTrackers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockerConfig {
    /// Start in enforcing mode
    pub enabled: bool,
    pub pre_consent: PreConsentPolicy,
    /// Cookie that is never blocked
    pub consent_cookie_name: String,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pre_consent: PreConsentPolicy::BlockAll,
            consent_cookie_name: warden_consent::CONSENT_KEY.to_string(),
        }
    }
}
