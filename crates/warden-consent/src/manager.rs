//! Consent Manager
//!
//! Reads and writes the consent record through one backend key, stamps every
//! write, and broadcasts the result.

use chrono::{Duration, Utc};
use std::sync::Arc;

use warden_dom::Document;
use warden_storage::{ConsentBackend, CookieStorage, LocalStorage, StorageMethod};

use crate::error::ConsentError;
use crate::events::{ConsentEvents, ConsentListener, SubscriptionId};
use crate::record::{ConsentChoices, ConsentRecord};
use crate::report::{ErrorReporter, TracingReporter};
use crate::source::ConsentSource;

/// Backend key and cookie name holding the record
pub const CONSENT_KEY: &str = "cookieConsent";

pub const DEFAULT_EXPIRE_DAYS: u32 = 365;

/// Consumer callback run after every successful write
pub type OnConsentChange = Arc<dyn Fn(&ConsentRecord) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
pub struct ConsentOptions {
    pub storage_method: StorageMethod,
    pub expire_days: u32,
    pub on_consent_change: Option<OnConsentChange>,
}

impl ConsentOptions {
    pub fn with_storage_method(mut self, method: StorageMethod) -> Self {
        self.storage_method = method;
        self
    }

    pub fn with_expire_days(mut self, days: u32) -> Self {
        self.expire_days = days;
        self
    }

    pub fn on_consent_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ConsentRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_consent_change = Some(Arc::new(callback));
        self
    }

    /// Zero counts as unset and falls back to `DEFAULT_EXPIRE_DAYS`.
    pub fn effective_expire_days(&self) -> u32 {
        match self.expire_days {
            0 => DEFAULT_EXPIRE_DAYS,
            days => days,
        }
    }
}

impl Default for ConsentOptions {
    fn default() -> Self {
        Self {
            storage_method: StorageMethod::LocalStorage,
            expire_days: DEFAULT_EXPIRE_DAYS,
            on_consent_change: None,
        }
    }
}

impl std::fmt::Debug for ConsentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentOptions")
            .field("storage_method", &self.storage_method)
            .field("expire_days", &self.expire_days)
            .field("on_consent_change", &self.on_consent_change.is_some())
            .finish()
    }
}

/// Owns the consent record.
///
/// Listeners run synchronously inside `set_consent`. A listener that calls
/// `set_consent` again re-enters the dispatch; guarding against unbounded
/// recursion is the caller's job.
pub struct ConsentManager {
    options: ConsentOptions,
    backend: Arc<dyn ConsentBackend>,
    events: ConsentEvents,
    reporter: Arc<dyn ErrorReporter>,
}

impl ConsentManager {
    pub fn new(options: ConsentOptions, backend: Arc<dyn ConsentBackend>) -> Self {
        let mut options = options;
        options.expire_days = options.effective_expire_days();

        tracing::info!(
            storage_method = %options.storage_method,
            backend = backend.kind(),
            expire_days = options.expire_days,
            "Created consent manager"
        );

        Self {
            options,
            backend,
            events: ConsentEvents::new(),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Pick the backend named by `options.storage_method`.
    pub fn open(options: ConsentOptions, local: LocalStorage, document: Arc<Document>) -> Self {
        let expire_days = options.effective_expire_days();

        let backend: Arc<dyn ConsentBackend> = match options.storage_method {
            StorageMethod::LocalStorage => Arc::new(local),
            StorageMethod::Cookie => Arc::new(CookieStorage::new(document, expire_days)),
        };

        Self::new(options, backend)
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn options(&self) -> &ConsentOptions {
        &self.options
    }

    pub fn events(&self) -> &ConsentEvents {
        &self.events
    }

    /// Stored record, or `None` if undecided or unreadable.
    pub fn get_consent(&self) -> Option<ConsentRecord> {
        let stored = match self.backend.get(CONSENT_KEY) {
            Ok(stored) => stored?,
            Err(e) => {
                self.report("get_consent", ConsentError::from(e));
                return None;
            }
        };

        match serde_json::from_str(&stored) {
            Ok(record) => Some(record),
            Err(e) => {
                self.report("get_consent", ConsentError::from(e));
                None
            }
        }
    }

    /// Persist `choices` as the new record, then notify listeners and the
    /// `on_consent_change` callback. Returns `None` if the write failed, in
    /// which case nobody is notified.
    pub fn set_consent(&self, choices: &ConsentChoices) -> Option<ConsentRecord> {
        let record = ConsentRecord::from_choices(choices, Utc::now());

        let serialized = match serde_json::to_string(&record) {
            Ok(serialized) => serialized,
            Err(e) => {
                self.report("set_consent", ConsentError::from(e));
                return None;
            }
        };

        if let Err(e) = self.backend.set(CONSENT_KEY, &serialized) {
            self.report("set_consent", ConsentError::from(e));
            return None;
        }

        tracing::info!(
            analytics = record.analytics(),
            marketing = record.marketing(),
            backend = self.backend.kind(),
            "Stored consent"
        );

        self.events.dispatch(&record);

        if let Some(callback) = &self.options.on_consent_change {
            if let Err(e) = callback(&record) {
                self.report("on_consent_change", ConsentError::Callback(e));
            }
        }

        Some(record)
    }

    pub fn has_consent(&self, category: &str) -> bool {
        self.get_consent()
            .map(|record| record.get(category))
            .unwrap_or(false)
    }

    /// True when there is no record, no timestamp, or the record is older
    /// than `expire_days`. Advisory only: `get_consent` still returns it.
    pub fn is_consent_expired(&self) -> bool {
        let Some(timestamp) = self.get_consent().and_then(|record| record.timestamp()) else {
            return true;
        };

        match timestamp.checked_add_signed(Duration::days(i64::from(self.options.expire_days))) {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }

    /// Remove the record, returning to "undecided".
    pub fn clear_consent(&self) {
        match self.backend.remove(CONSENT_KEY) {
            Ok(()) => tracing::info!(backend = self.backend.kind(), "Cleared consent"),
            Err(e) => self.report("clear_consent", ConsentError::from(e)),
        }
    }

    pub fn subscribe(&self, listener: ConsentListener) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn report(&self, context: &'static str, error: ConsentError) {
        self.reporter.report(context, &error);
    }
}

impl ConsentSource for ConsentManager {
    fn get_consent(&self) -> Option<ConsentRecord> {
        ConsentManager::get_consent(self)
    }

    fn has_consent(&self, category: &str) -> bool {
        ConsentManager::has_consent(self, category)
    }

    fn subscribe(&self, listener: ConsentListener) -> SubscriptionId {
        ConsentManager::subscribe(self, listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        ConsentManager::unsubscribe(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConsentChanged;
    use crate::report::MemoryReporter;
    use chrono::{DateTime, SecondsFormat};
    use parking_lot::Mutex;
    use warden_storage::{MemoryStorage, StorageError};

    /// Backend whose every primitive fails, like disabled storage
    struct BrokenStorage;

    impl ConsentBackend for BrokenStorage {
        fn get(&self, _key: &str) -> warden_storage::Result<Option<String>> {
            Err(StorageError::Unavailable("storage disabled".to_string()))
        }

        fn set(&self, key: &str, _value: &str) -> warden_storage::Result<()> {
            Err(StorageError::QuotaExceeded {
                key: key.to_string(),
            })
        }

        fn remove(&self, _key: &str) -> warden_storage::Result<()> {
            Err(StorageError::Unavailable("storage disabled".to_string()))
        }

        fn kind(&self) -> &'static str {
            "broken"
        }
    }

    fn memory_manager(options: ConsentOptions) -> (ConsentManager, MemoryStorage, MemoryReporter) {
        let storage = MemoryStorage::new();
        let reporter = MemoryReporter::new();
        let manager = ConsentManager::new(options, Arc::new(storage.clone()))
            .with_reporter(Arc::new(reporter.clone()));
        (manager, storage, reporter)
    }

    fn stored_with_age(storage: &MemoryStorage, days: i64) {
        let timestamp = (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Millis, true);
        storage
            .set(
                CONSENT_KEY,
                &format!(r#"{{"functional":true,"analytics":true,"timestamp":"{}"}}"#, timestamp),
            )
            .unwrap();
    }

    #[test]
    fn test_defaults() {
        let options = ConsentOptions::default();
        assert_eq!(options.storage_method, StorageMethod::LocalStorage);
        assert_eq!(options.expire_days, 365);
        assert!(options.on_consent_change.is_none());

        let unset = ConsentOptions::default().with_expire_days(0);
        assert_eq!(unset.effective_expire_days(), DEFAULT_EXPIRE_DAYS);
        assert_eq!(ConsentOptions::default().with_expire_days(30).effective_expire_days(), 30);

        let (manager, _, _) = memory_manager(unset);
        assert_eq!(manager.options().expire_days, DEFAULT_EXPIRE_DAYS);
    }

    #[test]
    fn test_undecided_by_default() {
        let (manager, _, reporter) = memory_manager(ConsentOptions::default());
        assert!(manager.get_consent().is_none());
        assert!(!manager.has_consent("functional"));
        assert!(manager.is_consent_expired());
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn test_set_consent_example() {
        let (manager, storage, _) = memory_manager(ConsentOptions::default());

        let record = manager
            .set_consent(&ConsentChoices::new().analytics(true).marketing(false))
            .unwrap();

        assert!(record.functional());
        assert!(record.analytics());
        assert!(!record.marketing());
        let timestamp = record.timestamp().unwrap();
        assert!((Utc::now() - timestamp).num_seconds() < 5);

        assert!(manager.has_consent("analytics"));
        assert!(!manager.has_consent("marketing"));
        assert!(!manager.has_consent("unknown"));

        let stored = storage.get(CONSENT_KEY).unwrap().unwrap();
        assert!(stored.contains(r#""functional":true"#));
        assert_eq!(manager.get_consent(), Some(record));
    }

    #[test]
    fn test_functional_cannot_be_declined() {
        let (manager, _, _) = memory_manager(ConsentOptions::default());
        manager.set_consent(&ConsentChoices::from([("functional", false)]));

        assert!(manager.has_consent("functional"));
        assert!(manager.get_consent().unwrap().functional());
    }

    #[test]
    fn test_declined_is_not_undecided() {
        let (manager, _, _) = memory_manager(ConsentOptions::default());
        manager.set_consent(&ConsentChoices::new().analytics(false).marketing(false));

        let record = manager.get_consent().unwrap();
        assert!(!record.analytics());
        assert!(!record.marketing());

        manager.clear_consent();
        assert!(manager.get_consent().is_none());
    }

    #[test]
    fn test_malformed_payload_reads_as_undecided() {
        let (manager, storage, reporter) = memory_manager(ConsentOptions::default());
        storage.set(CONSENT_KEY, "{not json").unwrap();

        assert!(manager.get_consent().is_none());
        assert!(!manager.has_consent("analytics"));
        assert_eq!(reporter.contexts()[0], "get_consent");
    }

    #[test]
    fn test_expiry_boundary() {
        let (manager, storage, _) = memory_manager(ConsentOptions::default().with_expire_days(365));

        stored_with_age(&storage, 366);
        assert!(manager.is_consent_expired());
        // Expired records are still returned
        assert!(manager.get_consent().is_some());

        stored_with_age(&storage, 364);
        assert!(!manager.is_consent_expired());
    }

    #[test]
    fn test_no_timestamp_counts_as_expired() {
        let (manager, storage, _) = memory_manager(ConsentOptions::default());
        storage.set(CONSENT_KEY, r#"{"functional":true}"#).unwrap();

        assert!(manager.is_consent_expired());
    }

    #[test]
    fn test_listener_sees_record_before_return() {
        let (manager, _, _) = memory_manager(ConsentOptions::default());
        let seen: Arc<Mutex<Option<ConsentRecord>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        manager.subscribe(Arc::new(move |event: &ConsentChanged| {
            *slot.lock() = Some(event.detail.clone());
        }));

        let record = manager.set_consent(&ConsentChoices::new().analytics(true));
        assert_eq!(*seen.lock(), record);
    }

    #[test]
    fn test_callback_runs_after_listeners() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let callback_order = Arc::clone(&order);
        let options = ConsentOptions::default().on_consent_change(move |record| {
            assert!(record.functional());
            callback_order.lock().push("callback");
            Ok(())
        });
        let (manager, _, _) = memory_manager(options);

        let listener_order = Arc::clone(&order);
        manager.subscribe(Arc::new(move |_: &ConsentChanged| {
            listener_order.lock().push("listener");
        }));

        manager.set_consent(&ConsentChoices::new());
        assert_eq!(*order.lock(), vec!["listener", "callback"]);
    }

    #[test]
    fn test_failing_callback_is_reported() {
        let options =
            ConsentOptions::default().on_consent_change(|_| Err(anyhow::anyhow!("consumer bug")));
        let (manager, _, reporter) = memory_manager(options);

        let record = manager.set_consent(&ConsentChoices::new().analytics(true));

        assert!(record.is_some());
        assert!(manager.has_consent("analytics"));
        assert_eq!(reporter.contexts(), vec!["on_consent_change"]);
    }

    #[test]
    fn test_backend_failure_degrades() {
        let reporter = MemoryReporter::new();
        let called = Arc::new(Mutex::new(false));

        let flag = Arc::clone(&called);
        let options = ConsentOptions::default().on_consent_change(move |_| {
            *flag.lock() = true;
            Ok(())
        });
        let manager = ConsentManager::new(options, Arc::new(BrokenStorage))
            .with_reporter(Arc::new(reporter.clone()));

        let notified = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&notified);
        manager.subscribe(Arc::new(move |_: &ConsentChanged| *flag.lock() = true));

        assert!(manager.set_consent(&ConsentChoices::new().analytics(true)).is_none());
        assert!(manager.get_consent().is_none());
        assert!(!manager.has_consent("analytics"));
        assert!(manager.is_consent_expired());
        manager.clear_consent();

        assert!(!*called.lock());
        assert!(!*notified.lock());
        assert_eq!(
            reporter.contexts(),
            vec![
                "set_consent",
                "get_consent",
                "get_consent",
                "get_consent",
                "clear_consent"
            ]
        );
    }

    #[test]
    fn test_cookie_backend_roundtrip() {
        let document = Document::new("https://www.example.com/").unwrap();
        let local = LocalStorage::open_in_memory("https://www.example.com").unwrap();
        let manager = ConsentManager::open(
            ConsentOptions::default().with_storage_method(StorageMethod::Cookie),
            local.clone(),
            document.clone(),
        );

        let record = manager
            .set_consent(&ConsentChoices::new().analytics(true))
            .unwrap();

        assert!(document.cookie().starts_with("cookieConsent=%7B"));
        assert_eq!(manager.get_consent(), Some(record));
        assert_eq!(local.get(CONSENT_KEY).unwrap(), None);

        manager.clear_consent();
        assert!(manager.get_consent().is_none());
        assert_eq!(document.cookie(), "");
    }

    #[test]
    fn test_local_backend_roundtrip() {
        let document = Document::new("https://www.example.com/").unwrap();
        let local = LocalStorage::open_in_memory("https://www.example.com").unwrap();
        let manager = ConsentManager::open(ConsentOptions::default(), local.clone(), document.clone());

        let record = manager
            .set_consent(&ConsentChoices::new().marketing(true).with("video", true))
            .unwrap();

        assert_eq!(manager.get_consent(), Some(record.clone()));
        assert!(record.get("video"));
        assert!(local.get(CONSENT_KEY).unwrap().is_some());
        assert_eq!(document.cookie(), "");

        let stamped: DateTime<Utc> = record.timestamp().unwrap();
        assert_eq!(stamped.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
