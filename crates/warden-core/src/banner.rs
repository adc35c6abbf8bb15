//! Cookie banner facade
//!
//! One `CookieBanner` per page: it owns the consent store for the page's
//! origin and the interception layer bound to the page's document.

use std::sync::Arc;

use warden_blocker::CookieBlocker;
use warden_consent::{
    category, ConsentChoices, ConsentListener, ConsentManager, ConsentRecord, ConsentSource,
    ErrorReporter, SubscriptionId, TracingReporter,
};
use warden_dom::Document;
use warden_storage::{ConsentBackend, CookieStorage, LocalStorage, StorageMethod};

use crate::config::Config;
use crate::Result;

pub struct CookieBanner {
    config: Config,
    document: Arc<Document>,
    consent: Arc<ConsentManager>,
    blocker: CookieBlocker,
}

impl CookieBanner {
    /// Open the configured backend and wire the store to the blocker.
    pub fn new(config: Config, document: Arc<Document>) -> Result<Self> {
        config.validate()?;
        let backend = open_backend(&config, &document)?;
        Ok(Self::with_backend(
            config,
            document,
            backend,
            Arc::new(TracingReporter),
        ))
    }

    /// Use a caller-supplied backend and error channel.
    pub fn with_backend(
        config: Config,
        document: Arc<Document>,
        backend: Arc<dyn ConsentBackend>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let consent = Arc::new(
            ConsentManager::new(config.consent_options(), backend)
                .with_reporter(Arc::clone(&reporter)),
        );

        let blocker = CookieBlocker::new(
            Arc::clone(&document),
            Arc::clone(&consent) as Arc<dyn ConsentSource>,
            config.blocking.clone(),
        )
        .with_reporter(reporter);

        Self {
            config,
            document,
            consent,
            blocker,
        }
    }

    /// Install interception and announce an existing decision.
    ///
    /// Returns whether the user has to be asked.
    pub fn initialize(&self) -> bool {
        self.blocker.init();

        match self.consent.get_consent() {
            Some(record) if !self.consent.is_consent_expired() => {
                self.consent.events().dispatch(&record);
                tracing::info!(location = %self.document.location(), "Existing consent restored");
                false
            }
            _ => {
                tracing::info!(location = %self.document.location(), "Consent prompt required");
                true
            }
        }
    }

    // === Consent ===

    pub fn get_consent(&self) -> Option<ConsentRecord> {
        self.consent.get_consent()
    }

    pub fn set_consent(&self, choices: &ConsentChoices) -> Option<ConsentRecord> {
        self.consent.set_consent(choices)
    }

    pub fn has_consent(&self, category: &str) -> bool {
        self.consent.has_consent(category)
    }

    pub fn clear_consent(&self) {
        self.consent.clear_consent()
    }

    pub fn is_consent_expired(&self) -> bool {
        self.consent.is_consent_expired()
    }

    /// No decision on record, or the decision is too old
    pub fn needs_prompt(&self) -> bool {
        self.consent.is_consent_expired()
    }

    /// Grant every configured category
    pub fn accept_all(&self) -> Option<ConsentRecord> {
        self.set_consent(&self.choices_with(true))
    }

    /// Decline everything except functional
    pub fn reject_all(&self) -> Option<ConsentRecord> {
        self.set_consent(&self.choices_with(false))
    }

    /// Category defaults for the UI; functional is always on.
    pub fn default_choices(&self) -> ConsentChoices {
        let mut choices = ConsentChoices::new();
        for (name, allowed) in &self.config.categories {
            choices.set(name, *allowed);
        }
        choices.set(category::FUNCTIONAL, true);
        choices
    }

    fn choices_with(&self, allowed: bool) -> ConsentChoices {
        let mut choices = self.default_choices();
        for name in self.config.categories.keys() {
            if name != category::FUNCTIONAL {
                choices.set(name, allowed);
            }
        }
        choices
    }

    // === Events ===

    pub fn subscribe(&self, listener: ConsentListener) -> SubscriptionId {
        self.consent.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.consent.unsubscribe(id)
    }

    // === Components ===

    pub fn consent(&self) -> &Arc<ConsentManager> {
        &self.consent
    }

    pub fn blocker(&self) -> &CookieBlocker {
        &self.blocker
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for CookieBanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieBanner")
            .field("location", &self.document.location().as_str())
            .field("storage_method", &self.config.storage_method)
            .field("blocker", &self.blocker)
            .finish()
    }
}

fn open_backend(config: &Config, document: &Arc<Document>) -> Result<Arc<dyn ConsentBackend>> {
    let backend: Arc<dyn ConsentBackend> = match config.storage_method {
        StorageMethod::Cookie => {
            let expire_days = config.consent_options().effective_expire_days();
            Arc::new(CookieStorage::new(Arc::clone(document), expire_days))
        }
        StorageMethod::LocalStorage => {
            let origin = document.location().origin().ascii_serialization();
            let local = match &config.database_path {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    LocalStorage::open(path, &origin)?
                }
                None => LocalStorage::open_in_memory(&origin)?,
            };
            Arc::new(local)
        }
    };

    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use warden_consent::{ConsentChanged, MemoryReporter};
    use warden_dom::Primitive;
    use warden_storage::StorageError;

    const GA: &str = "https://www.google-analytics.com/analytics.js";
    const PIXEL: &str = "https://connect.facebook.net/en_US/fbevents.js";

    /// Storage that refuses every operation
    struct DisabledStorage;

    impl ConsentBackend for DisabledStorage {
        fn get(&self, _key: &str) -> warden_storage::Result<Option<String>> {
            Err(StorageError::Unavailable("blocked by browser settings".to_string()))
        }

        fn set(&self, key: &str, _value: &str) -> warden_storage::Result<()> {
            Err(StorageError::QuotaExceeded {
                key: key.to_string(),
            })
        }

        fn remove(&self, _key: &str) -> warden_storage::Result<()> {
            Err(StorageError::Unavailable("blocked by browser settings".to_string()))
        }

        fn kind(&self) -> &'static str {
            "disabled"
        }
    }

    fn document() -> Arc<Document> {
        Document::new("https://shop.example.com/checkout").unwrap()
    }

    fn banner() -> CookieBanner {
        let banner = CookieBanner::new(Config::default(), document()).unwrap();
        banner.initialize();
        banner
    }

    fn load_script(doc: &Document, src: &str) -> warden_dom::Element {
        let script = doc.create_element("script");
        script.set_src(src);
        doc.append_child(doc.body().unwrap(), &script).unwrap();
        script
    }

    #[test]
    fn test_block_then_replay() {
        let banner = banner();
        let doc = banner.document();

        let script = load_script(doc, GA);
        assert!(script.parent().is_none());
        assert!(doc.body().unwrap().children().is_empty());
        assert!(!doc.was_executed(GA));

        banner
            .set_consent(&ConsentChoices::new().analytics(true))
            .unwrap();

        let head = doc.head().unwrap().children();
        assert_eq!(head.len(), 1);
        assert_eq!(head[0].get_attribute("src").as_deref(), Some(GA));
        assert!(doc.was_executed(GA));
    }

    #[test]
    fn test_category_isolation() {
        let banner = banner();
        let doc = banner.document();

        load_script(doc, GA);
        load_script(doc, PIXEL);

        banner
            .set_consent(&ConsentChoices::new().analytics(false).marketing(true))
            .unwrap();

        assert!(doc.was_executed(PIXEL));
        assert!(!doc.was_executed(GA));

        let pending = banner.blocker().get_blocked();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, warden_blocker::ScriptPayload::Source(GA.to_string()));
    }

    #[test]
    fn test_cookie_gating() {
        let banner = banner();
        let doc = banner.document();

        doc.set_cookie("_ga=GA1.2.1;path=/");
        assert!(!doc.cookie().contains("_ga"));

        banner
            .set_consent(&ConsentChoices::new().analytics(true))
            .unwrap();
        assert!(banner.has_consent("analytics"));

        doc.set_cookie("_ga=GA1.2.1;path=/");
        assert!(doc.cookie().contains("_ga=GA1.2.1"));
    }

    #[test]
    fn test_concrete_example() {
        let banner = banner();

        let record = banner
            .set_consent(&ConsentChoices::new().analytics(true).marketing(false))
            .unwrap();

        assert!(record.functional());
        assert!(record.analytics());
        assert!(!record.marketing());
        assert!(!banner.has_consent("marketing"));
        assert!(banner.has_consent("analytics"));
        assert!(!banner.needs_prompt());

        let json = serde_json::to_value(&record).unwrap();
        let timestamp = json["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }

    #[test]
    fn test_undecided_vs_declined() {
        let banner = banner();
        assert!(banner.needs_prompt());

        let declined = banner.reject_all().unwrap();
        assert!(!declined.analytics());
        assert!(!declined.marketing());
        assert!(banner.get_consent().is_some());

        banner.clear_consent();
        assert!(banner.get_consent().is_none());
        assert!(banner.needs_prompt());
    }

    #[test]
    fn test_failing_backend_never_panics() {
        let reporter = MemoryReporter::new();
        let banner = CookieBanner::with_backend(
            Config::default(),
            document(),
            Arc::new(DisabledStorage),
            Arc::new(reporter.clone()),
        );
        assert!(banner.initialize());

        assert!(banner.set_consent(&ConsentChoices::new().analytics(true)).is_none());
        assert!(banner.get_consent().is_none());
        assert!(!banner.has_consent("analytics"));
        assert!(banner.is_consent_expired());
        banner.clear_consent();

        assert!(reporter.contexts().contains(&"set_consent"));
        assert!(reporter.contexts().contains(&"clear_consent"));

        // Undecided means trackers stay blocked
        let doc = banner.document();
        load_script(doc, GA);
        assert!(!doc.was_executed(GA));
    }

    #[test]
    fn test_cookie_storage_survives_blocking() {
        let config = Config {
            storage_method: StorageMethod::Cookie,
            ..Config::default()
        };
        let banner = CookieBanner::new(config, document()).unwrap();
        banner.initialize();

        banner
            .set_consent(&ConsentChoices::new().marketing(true))
            .unwrap();

        assert!(banner.document().cookie().starts_with("cookieConsent="));
        assert!(banner.has_consent("marketing"));
        assert!(banner.blocker().blocked_cookies().is_empty());
    }

    #[test]
    fn test_mismatched_consent_cookie_name_is_rejected() {
        let mut config = Config {
            storage_method: StorageMethod::Cookie,
            ..Config::default()
        };
        config.blocking.consent_cookie_name = "myConsent".to_string();

        assert!(matches!(
            CookieBanner::new(config, document()),
            Err(crate::CoreError::Config(_))
        ));
    }

    #[test]
    fn test_suppressed_consent_cookie_is_not_a_success() {
        let mut config = Config {
            storage_method: StorageMethod::Cookie,
            ..Config::default()
        };
        config.blocking.consent_cookie_name = "myConsent".to_string();

        let doc = document();
        let reporter = MemoryReporter::new();
        let banner = CookieBanner::with_backend(
            config,
            Arc::clone(&doc),
            Arc::new(CookieStorage::new(Arc::clone(&doc), 365)),
            Arc::new(reporter.clone()),
        );
        banner.initialize();

        let notified = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&notified);
        banner.subscribe(Arc::new(move |_: &ConsentChanged| *counter.lock() += 1));

        assert!(banner
            .set_consent(&ConsentChoices::new().analytics(true))
            .is_none());
        assert_eq!(*notified.lock(), 0);
        assert!(banner.get_consent().is_none());
        assert_eq!(reporter.contexts(), vec!["set_consent"]);
    }

    #[test]
    fn test_initialize_announces_existing_consent() {
        let doc = document();
        let storage = Arc::new(warden_storage::MemoryStorage::new());
        let first = CookieBanner::with_backend(
            Config::default(),
            Arc::clone(&doc),
            storage.clone(),
            Arc::new(TracingReporter),
        );
        first.accept_all().unwrap();

        let second = CookieBanner::with_backend(
            Config::default(),
            Document::new("https://shop.example.com/").unwrap(),
            storage,
            Arc::new(TracingReporter),
        );

        let seen: Arc<Mutex<Vec<ConsentRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        second.subscribe(Arc::new(move |event: &ConsentChanged| {
            sink.lock().push(event.detail.clone());
        }));

        assert!(!second.initialize());
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].marketing());
    }

    #[test]
    fn test_accept_all_uses_configured_categories() {
        let mut config = Config::default();
        config.categories.insert("social".to_string(), false);
        let banner = CookieBanner::new(config, document()).unwrap();

        let defaults = banner.default_choices();
        assert_eq!(defaults.get("functional"), Some(true));
        assert_eq!(defaults.get("social"), Some(false));

        let record = banner.accept_all().unwrap();
        assert!(record.analytics());
        assert!(record.marketing());
        assert!(record.get("social"));
    }

    #[test]
    fn test_on_consent_change_callback() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let config = Config::default().on_consent_change(move |record| {
            assert!(record.functional());
            *counter.lock() += 1;
            Ok(())
        });

        let banner = CookieBanner::new(config, document()).unwrap();
        banner.accept_all().unwrap();
        banner.reject_all().unwrap();

        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn test_sealed_cookie_accessor() {
        let doc = document();
        doc.seal(Primitive::Cookie);

        let banner = CookieBanner::new(Config::default(), Arc::clone(&doc)).unwrap();
        banner.initialize();

        assert!(banner.blocker().is_active());
        load_script(&doc, GA);
        assert!(!doc.was_executed(GA));
    }

    #[test]
    fn test_persisted_across_page_loads() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: Some(dir.path().join("profile").join("consent.db")),
            ..Config::default()
        };

        {
            let banner = CookieBanner::new(config.clone(), document()).unwrap();
            banner
                .set_consent(&ConsentChoices::new().analytics(true))
                .unwrap();
        }

        let banner = CookieBanner::new(config, document()).unwrap();
        assert!(!banner.initialize());
        assert!(banner.has_consent("analytics"));

        // Replay is not needed: the tracker loads directly
        let doc = banner.document();
        load_script(doc, GA);
        assert!(doc.was_executed(GA));
    }
}
