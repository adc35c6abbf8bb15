//! Consent-gated interception of scripts and cookies

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use warden_consent::{
    category, ConsentChanged, ConsentRecord, ConsentSource, ErrorReporter, SubscriptionId,
    TracingReporter,
};
use warden_dom::{
    CookieAccessor, Document, Element, Primitive, Primitives, SetCookie, WeakElement,
};

use crate::config::BlockerConfig;
use crate::deferred::{DeferredAction, DeferredQueue, ScriptPayload, Surface};
use crate::error::BlockerError;
use crate::patterns::BlockPatterns;
use crate::policy::{cookie_verdict, inline_verdict, script_verdict, Verdict};
use crate::Result;

const CATEGORY_ATTRIBUTE: &str = "data-category";
const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// A suppressed `document.cookie` write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedCookie {
    pub name: String,
    pub category: String,
    pub blocked_at: DateTime<Utc>,
}

/// Everything `init` changed, so `reset` can undo it
struct Installation {
    originals: Primitives,
    patched: Vec<Primitive>,
    subscription: SubscriptionId,
}

struct Inner {
    document: Arc<Document>,
    consent: Arc<dyn ConsentSource>,
    config: BlockerConfig,
    patterns: RwLock<BlockPatterns>,
    reporter: RwLock<Arc<dyn ErrorReporter>>,
    enforcing: AtomicBool,
    queue: DeferredQueue,
    blocked_cookies: Mutex<Vec<BlockedCookie>>,
    hooked: Mutex<Vec<WeakElement>>,
    installation: Mutex<Option<Installation>>,
}

/// Interception layer bound to one document.
///
/// Cloning shares the same state. Installed wrappers only hold a weak
/// reference, so dropping every handle turns them into plain pass-throughs.
#[derive(Clone)]
pub struct CookieBlocker {
    inner: Arc<Inner>,
}

impl CookieBlocker {
    pub fn new(
        document: Arc<Document>,
        consent: Arc<dyn ConsentSource>,
        config: BlockerConfig,
    ) -> Self {
        let enforcing = config.enabled;
        Self {
            inner: Arc::new(Inner {
                document,
                consent,
                config,
                patterns: RwLock::new(BlockPatterns::builtin()),
                reporter: RwLock::new(Arc::new(TracingReporter)),
                enforcing: AtomicBool::new(enforcing),
                queue: DeferredQueue::new(),
                blocked_cookies: Mutex::new(Vec::new()),
                hooked: Mutex::new(Vec::new()),
                installation: Mutex::new(None),
            }),
        }
    }

    pub fn with_patterns(self, patterns: BlockPatterns) -> Self {
        *self.inner.patterns.write() = patterns;
        self
    }

    pub fn with_reporter(self, reporter: Arc<dyn ErrorReporter>) -> Self {
        *self.inner.reporter.write() = reporter;
        self
    }

    pub fn config(&self) -> &BlockerConfig {
        &self.inner.config
    }

    pub fn patterns(&self) -> BlockPatterns {
        self.inner.patterns.read().clone()
    }

    /// Change the registry in place; affects decisions made afterwards.
    pub fn update_patterns<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut BlockPatterns) -> Result<()>,
    {
        update(&mut self.inner.patterns.write())
    }

    // === Lifecycle ===

    /// Install the wrappers and start listening for consent changes.
    ///
    /// Calling this again while active does nothing. A primitive that cannot
    /// be replaced is skipped with a warning.
    pub fn init(&self) {
        let mut installation = self.inner.installation.lock();
        if installation.is_some() {
            tracing::debug!("Cookie blocker already initialized");
            return;
        }

        let originals = self.inner.document.primitives();
        self.inner.expire_blocked_cookies(&originals);

        let mut patched = Vec::new();
        for primitive in Primitive::ALL {
            match self.install(primitive, &originals) {
                Ok(()) => patched.push(primitive),
                Err(e) => {
                    tracing::warn!(primitive = %primitive, error = %e, "Skipping interception point")
                }
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let subscription = self
            .inner
            .consent
            .subscribe(Arc::new(move |event: &ConsentChanged| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_consent_change(&event.detail);
                }
            }));

        tracing::info!(
            patched = patched.len(),
            enforcing = self.is_enforcing(),
            "Cookie blocker initialized"
        );

        *installation = Some(Installation {
            originals,
            patched,
            subscription,
        });
    }

    /// Undo `init`: restore primitives, drop pending actions and the listener.
    pub fn reset(&self) {
        let Some(installation) = self.inner.installation.lock().take() else {
            tracing::debug!("Cookie blocker not initialized, nothing to reset");
            return;
        };

        for primitive in &installation.patched {
            if let Err(e) = self
                .inner
                .document
                .restore(*primitive, &installation.originals)
            {
                tracing::warn!(primitive = %primitive, error = %e, "Failed to restore primitive");
            }
        }

        self.inner.consent.unsubscribe(installation.subscription);

        for element in self.inner.hooked.lock().drain(..) {
            if let Some(element) = element.upgrade() {
                element.clear_src_setter();
            }
        }

        let dropped = self.inner.queue.clear();
        self.inner.blocked_cookies.lock().clear();

        tracing::info!(dropped = dropped.len(), "Cookie blocker reset");
    }

    pub fn is_active(&self) -> bool {
        self.inner.installation.lock().is_some()
    }

    // === Modes ===

    pub fn enable(&self) {
        self.inner.enforcing.store(true, Ordering::SeqCst);
        tracing::info!("Cookie blocking enabled");
    }

    /// Switch to passthrough: every intercepted call goes straight through.
    pub fn disable(&self) {
        self.inner.enforcing.store(false, Ordering::SeqCst);
        tracing::info!("Cookie blocking disabled");
    }

    pub fn is_enforcing(&self) -> bool {
        self.inner.is_enforcing()
    }

    // === Inspection ===

    /// Scripts currently waiting for consent
    pub fn get_blocked(&self) -> Vec<DeferredAction> {
        self.inner.queue.snapshot()
    }

    pub fn blocked_cookies(&self) -> Vec<BlockedCookie> {
        self.inner.blocked_cookies.lock().clone()
    }

    // === Installation ===

    fn install(&self, primitive: Primitive, originals: &Primitives) -> Result<()> {
        let document = &self.inner.document;
        let weak = Arc::downgrade(&self.inner);

        match primitive {
            Primitive::CreateElement => {
                let original = originals.create_element.clone();
                document.replace_create_element(Arc::new(move |doc: &Document, tag: &str| {
                    let element = original(doc, tag);
                    if element.is_script() {
                        if let Some(inner) = weak.upgrade() {
                            inner.hook_src(&element);
                        }
                    }
                    element
                }))?;
            }
            Primitive::AppendChild => {
                let original = originals.append_child.clone();
                document.replace_append_child(Arc::new(
                    move |doc: &Document, parent: &Element, child: &Element| {
                        if let Some(inner) = weak.upgrade() {
                            if inner.hold_insertion(child) {
                                return Ok(child.clone());
                            }
                        }
                        original(doc, parent, child)
                    },
                ))?;
            }
            Primitive::InsertBefore => {
                let original = originals.insert_before.clone();
                document.replace_insert_before(Arc::new(
                    move |doc: &Document,
                          parent: &Element,
                          child: &Element,
                          reference: Option<&Element>| {
                        if let Some(inner) = weak.upgrade() {
                            if inner.hold_insertion(child) {
                                return Ok(child.clone());
                            }
                        }
                        original(doc, parent, child, reference)
                    },
                ))?;
            }
            Primitive::SetAttribute => {
                let original = originals.set_attribute.clone();
                document.replace_set_attribute(Arc::new(
                    move |doc: &Document, element: &Element, name: &str, value: &str| {
                        if let Some(inner) = weak.upgrade() {
                            if inner.hold_src_attribute(element, name, value) {
                                return Ok(());
                            }
                        }
                        original(doc, element, name, value)
                    },
                ))?;
            }
            Primitive::Cookie => {
                let original_set = originals.cookie.set.clone();
                document.replace_cookie_accessor(CookieAccessor {
                    get: originals.cookie.get.clone(),
                    set: Arc::new(move |doc: &Document, assignment: &str| {
                        if let Some(inner) = weak.upgrade() {
                            if inner.suppress_cookie(assignment) {
                                return;
                            }
                        }
                        original_set(doc, assignment)
                    }),
                })?;
            }
        }

        tracing::debug!(primitive = %primitive, "Installed interception point");
        Ok(())
    }
}

impl std::fmt::Debug for CookieBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieBlocker")
            .field("active", &self.is_active())
            .field("enforcing", &self.is_enforcing())
            .field("pending", &self.inner.queue.len())
            .finish()
    }
}

impl Inner {
    fn is_enforcing(&self) -> bool {
        self.enforcing.load(Ordering::SeqCst)
    }

    fn report(&self, context: &'static str, error: &BlockerError) {
        let reporter = self.reporter.read().clone();
        reporter.report(context, error);
    }

    fn defer(&self, element: &Element, category: &str, payload: ScriptPayload, surface: Surface) {
        let target = match &payload {
            ScriptPayload::Source(src) => src.clone(),
            ScriptPayload::Inline(_) => "<inline>".to_string(),
        };

        let fresh = self
            .queue
            .upsert(DeferredAction::new(category, payload, surface, element));

        tracing::info!(
            category = category,
            script = %target,
            surface = ?surface,
            new = fresh,
            "Blocked script pending consent"
        );
    }

    // === Scripts ===

    fn hook_src(self: &Arc<Self>, element: &Element) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        element.set_src_setter(Arc::new(move |element: &Element, value: &str| {
            match weak.upgrade() {
                Some(inner) => inner.on_src_set(element, value),
                None => element.write_src(value),
            }
        }));
        let mut hooked = self.hooked.lock();
        hooked.retain(|weak| weak.upgrade().is_some());
        hooked.push(element.downgrade());
    }

    fn on_src_set(&self, element: &Element, value: &str) {
        if !self.is_enforcing() {
            element.write_src(value);
            return;
        }

        let consent = self.consent.get_consent();
        let declared = element.get_attribute(CATEGORY_ATTRIBUTE);
        let verdict = script_verdict(
            &self.patterns.read(),
            consent.as_ref(),
            value,
            declared.as_deref(),
        );

        match verdict {
            Verdict::Allow => {
                self.queue.discard(element);
                element.write_src(value);
            }
            Verdict::Block { category } => {
                element.hold_src(value);
                self.defer(
                    element,
                    &category,
                    ScriptPayload::Source(value.to_string()),
                    Surface::SrcSetter,
                );
            }
        }
    }

    /// Returns true if the insertion must not happen.
    fn hold_insertion(&self, child: &Element) -> bool {
        if !self.is_enforcing() || !child.is_script() {
            return false;
        }

        let consent = self.consent.get_consent();
        let declared = child.get_attribute(CATEGORY_ATTRIBUTE);
        let patterns = self.patterns.read();

        let src = child
            .src()
            .or_else(|| child.get_attribute("src"))
            .filter(|src| !src.trim().is_empty());
        let text = child.text();

        let (verdict, payload) = match src {
            Some(src) => (
                script_verdict(&patterns, consent.as_ref(), &src, declared.as_deref()),
                ScriptPayload::Source(src),
            ),
            None if !text.trim().is_empty() => (
                inline_verdict(&patterns, consent.as_ref(), &text, declared.as_deref()),
                ScriptPayload::Inline(text),
            ),
            None => return false,
        };
        drop(patterns);

        match verdict {
            Verdict::Allow => false,
            Verdict::Block { category } => {
                self.defer(child, &category, payload, Surface::Insertion);
                true
            }
        }
    }

    /// Returns true if the attribute write must not happen.
    fn hold_src_attribute(&self, element: &Element, name: &str, value: &str) -> bool {
        if !self.is_enforcing() || !element.is_script() || !name.eq_ignore_ascii_case("src") {
            return false;
        }

        let consent = self.consent.get_consent();
        let declared = element.get_attribute(CATEGORY_ATTRIBUTE);
        let verdict = script_verdict(
            &self.patterns.read(),
            consent.as_ref(),
            value,
            declared.as_deref(),
        );

        match verdict {
            Verdict::Allow => false,
            Verdict::Block { category } => {
                element.hold_src(value);
                self.defer(
                    element,
                    &category,
                    ScriptPayload::Source(value.to_string()),
                    Surface::SetAttribute,
                );
                true
            }
        }
    }

    // === Cookies ===

    /// Returns true if the cookie write must be dropped.
    fn suppress_cookie(&self, assignment: &str) -> bool {
        if !self.is_enforcing() {
            return false;
        }

        let Some(set) = SetCookie::parse(assignment) else {
            return false;
        };

        let now = Utc::now();
        if set.is_deletion(now) {
            return false;
        }

        let consent = self.consent.get_consent();
        let verdict = cookie_verdict(&self.patterns.read(), &self.config, consent.as_ref(), &set.name);

        match verdict {
            Verdict::Allow => false,
            Verdict::Block { category } => {
                tracing::info!(cookie = %set.name, category = %category, "Blocked cookie write");
                // One entry per cookie name, holding the latest attempt
                let mut blocked = self.blocked_cookies.lock();
                match blocked.iter_mut().find(|entry| entry.name == set.name) {
                    Some(entry) => {
                        entry.category = category;
                        entry.blocked_at = now;
                    }
                    None => blocked.push(BlockedCookie {
                        name: set.name,
                        category,
                        blocked_at: now,
                    }),
                }
                true
            }
        }
    }

    /// Delete stored cookies that would be blocked now, host-only and at
    /// every parent domain down to the root.
    fn expire_blocked_cookies(&self, originals: &Primitives) {
        if !self.is_enforcing() {
            return;
        }

        let document: &Document = &self.document;
        let consent = self.consent.get_consent();
        let domains: Vec<String> = cookie_domains(document.hostname())
            .into_iter()
            .map(str::to_string)
            .collect();
        let now = Utc::now();

        let jar = document.cookie_jar();
        let mut names: Vec<&str> = jar
            .all()
            .iter()
            .filter(|cookie| !cookie.is_expired(now))
            .map(|cookie| cookie.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();

        let patterns = self.patterns.read();
        let mut expired = 0;
        for name in names {
            if !cookie_verdict(&patterns, &self.config, consent.as_ref(), name).is_blocked() {
                continue;
            }
            for domain in &domains {
                (originals.cookie.set)(
                    document,
                    &format!("{name}=; expires={EXPIRED}; path=/; domain={domain}"),
                );
            }
            (originals.cookie.set)(document, &format!("{name}=; expires={EXPIRED}; path=/"));
            expired += 1;
        }

        if expired > 0 {
            tracing::info!(expired = expired, domains = ?domains, "Expired existing blocked cookies");
        }
    }

    // === Replay ===

    fn handle_consent_change(&self, record: &ConsentRecord) {
        let ready = self
            .queue
            .take_granted(|granted| granted == category::FUNCTIONAL || record.get(granted));

        if ready.is_empty() {
            return;
        }

        let originals = match self.installation.lock().as_ref() {
            Some(installation) => installation.originals.clone(),
            None => return,
        };

        for action in ready {
            match self.replay(&originals, &action) {
                Ok(element) => tracing::info!(
                    category = %action.category,
                    element_id = element.id(),
                    "Replayed blocked script"
                ),
                Err(e) => self.report("replay", &e),
            }
        }
    }

    fn replay(&self, originals: &Primitives, action: &DeferredAction) -> Result<Element> {
        let document: &Document = &self.document;
        let element = (originals.create_element)(document, "script");

        for (name, value) in action.attributes() {
            (originals.set_attribute)(document, &element, &name, &value)?;
        }

        match &action.payload {
            ScriptPayload::Source(src) => (originals.set_attribute)(document, &element, "src", src)?,
            ScriptPayload::Inline(text) => element.set_text(text),
        }

        let target = document
            .head()
            .or_else(|| document.body())
            .ok_or(BlockerError::NoInsertionTarget)?;

        Ok((originals.append_child)(document, target, &element)?)
    }
}

/// Domain scopes a cookie readable on `host` can live under, from the host
/// itself up to the label below the top-level domain:
/// `www.shop.example.de` -> `www.shop.example.de`, `shop.example.de`,
/// `example.de`. IP addresses and single labels yield only themselves.
pub fn cookie_domains(host: &str) -> Vec<&str> {
    if host.parse::<IpAddr>().is_ok() {
        return vec![host];
    }

    let mut domains = Vec::new();
    let mut rest = host;
    while let Some((_, parent)) = rest.split_once('.') {
        domains.push(rest);
        rest = parent;
    }

    if domains.is_empty() {
        domains.push(host);
    }
    domains
}
