//! Banner configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use warden_blocker::BlockerConfig;
use warden_consent::{
    category, ConsentOptions, ConsentRecord, OnConsentChange, CONSENT_KEY, DEFAULT_EXPIRE_DAYS,
};
use warden_storage::StorageMethod;

use crate::error::CoreError;
use crate::Result;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Where the consent record is kept
    pub storage_method: StorageMethod,
    /// Days before a decision has to be asked for again
    pub expire_days: u32,
    /// SQLite file for the local-storage backend; in-memory when unset
    pub database_path: Option<PathBuf>,
    /// Pre-selected categories shown by the UI
    pub categories: BTreeMap<String, bool>,
    pub blocking: BlockerConfig,
    /// Runs after every successful consent write
    #[serde(skip)]
    pub on_consent_change: Option<OnConsentChange>,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded configuration");
        Self::from_json_str(&json)
    }

    pub fn on_consent_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ConsentRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_consent_change = Some(std::sync::Arc::new(callback));
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.categories.get(category::FUNCTIONAL) == Some(&false) {
            return Err(CoreError::Config(
                "the functional category cannot default to off".to_string(),
            ));
        }
        if self.blocking.consent_cookie_name.trim().is_empty() {
            return Err(CoreError::Config(
                "blocking.consentCookieName must not be empty".to_string(),
            ));
        }
        // The cookie backend always writes CONSENT_KEY
        if self.storage_method == StorageMethod::Cookie
            && self.blocking.consent_cookie_name != CONSENT_KEY
        {
            return Err(CoreError::Config(format!(
                "blocking.consentCookieName must be {CONSENT_KEY} with cookie storage, got {}",
                self.blocking.consent_cookie_name
            )));
        }
        Ok(())
    }

    pub fn consent_options(&self) -> ConsentOptions {
        ConsentOptions {
            storage_method: self.storage_method,
            expire_days: self.expire_days,
            on_consent_change: self.on_consent_change.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let categories = [
            (category::FUNCTIONAL, true),
            (category::ANALYTICS, false),
            (category::MARKETING, false),
        ]
        .into_iter()
        .map(|(name, on)| (name.to_string(), on))
        .collect();

        Self {
            storage_method: StorageMethod::LocalStorage,
            expire_days: DEFAULT_EXPIRE_DAYS,
            database_path: None,
            categories,
            blocking: BlockerConfig::default(),
            on_consent_change: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("storage_method", &self.storage_method)
            .field("expire_days", &self.expire_days)
            .field("database_path", &self.database_path)
            .field("categories", &self.categories)
            .field("blocking", &self.blocking)
            .field("on_consent_change", &self.on_consent_change.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_blocker::PreConsentPolicy;

    #[test]
    fn test_defaults() {
        let config = Config::from_json_str("{}").unwrap();

        assert_eq!(config.storage_method, StorageMethod::LocalStorage);
        assert_eq!(config.expire_days, 365);
        assert!(config.database_path.is_none());
        assert_eq!(config.categories.get("functional"), Some(&true));
        assert_eq!(config.categories.get("analytics"), Some(&false));
        assert!(config.blocking.enabled);
    }

    #[test]
    fn test_camel_case_keys() {
        let config = Config::from_json_str(
            r#"{
                "storageMethod": "cookie",
                "expireDays": 30,
                "databasePath": "/tmp/warden.db",
                "categories": {"functional": true, "analytics": true},
                "blocking": {"enabled": false, "preConsent": "knownTrackers"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.storage_method, StorageMethod::Cookie);
        assert_eq!(config.expire_days, 30);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/warden.db")));
        assert_eq!(config.categories.get("analytics"), Some(&true));
        assert!(!config.blocking.enabled);
        assert_eq!(config.blocking.pre_consent, PreConsentPolicy::KnownTrackers);
    }

    #[test]
    fn test_rejects_functional_off() {
        let result = Config::from_json_str(r#"{"categories": {"functional": false}}"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_cookie_storage_needs_matching_cookie_name() {
        let result = Config::from_json_str(
            r#"{"storageMethod": "cookie", "blocking": {"consentCookieName": "myConsent"}}"#,
        );
        assert!(matches!(result, Err(CoreError::Config(_))));

        // Local storage may exempt any name
        let config = Config::from_json_str(r#"{"blocking": {"consentCookieName": "myConsent"}}"#)
            .unwrap();
        assert_eq!(config.blocking.consent_cookie_name, "myConsent");
    }

    #[test]
    fn test_unknown_storage_method() {
        let result = Config::from_json_str(r#"{"storageMethod": "sessionStorage"}"#);
        assert!(matches!(result, Err(CoreError::Serialization(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.json");
        std::fs::write(&path, r#"{"expireDays": 90}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.expire_days, 90);

        assert!(matches!(
            Config::load(dir.path().join("missing.json")),
            Err(CoreError::Io(_))
        ));
    }
}
