//! Block decisions
//!
//! Pure functions over the pattern registry and a consent snapshot. With a
//! record present a script is blocked only when its category is not granted.
//! Without one, known trackers and explicitly categorised scripts are held
//! back, and cookies follow the configured `PreConsentPolicy`.

use warden_consent::{category, ConsentRecord};

use crate::config::{BlockerConfig, PreConsentPolicy};
use crate::patterns::BlockPatterns;

/// Category reported for a cookie that is blocked without matching any pattern
pub const UNCLASSIFIED: &str = "unclassified";

/// Category assumed for a known tracker that no category pattern claims
const FALLBACK_CATEGORY: &str = category::ANALYTICS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block { category: String },
}

impl Verdict {
    fn block(category: &str) -> Self {
        Verdict::Block {
            category: category.to_string(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Verdict::Allow => None,
            Verdict::Block { category } => Some(category),
        }
    }
}

/// Decide a script `src`. `declared` is the element's `data-category`.
pub fn script_verdict(
    patterns: &BlockPatterns,
    consent: Option<&ConsentRecord>,
    url: &str,
    declared: Option<&str>,
) -> Verdict {
    let declared = declared.map(str::trim).filter(|c| !c.is_empty());
    if declared == Some(category::FUNCTIONAL) {
        return Verdict::Allow;
    }

    match consent {
        Some(record) => match declared.or_else(|| patterns.classify(url)) {
            Some(category) => granted_or_block(record, category),
            None => Verdict::Allow,
        },
        None => {
            if let Some(category) = declared {
                Verdict::block(category)
            } else if patterns.is_known_tracker(url) {
                Verdict::block(patterns.classify(url).unwrap_or(FALLBACK_CATEGORY))
            } else {
                Verdict::Allow
            }
        }
    }
}

/// Decide an inline script body.
pub fn inline_verdict(
    patterns: &BlockPatterns,
    consent: Option<&ConsentRecord>,
    text: &str,
    declared: Option<&str>,
) -> Verdict {
    let declared = declared.map(str::trim).filter(|c| !c.is_empty());
    if declared == Some(category::FUNCTIONAL) {
        return Verdict::Allow;
    }

    let category = declared.or_else(|| {
        patterns
            .classify_inline(text)
            .map(|signature| signature.category.as_str())
    });

    match (consent, category) {
        (_, None) => Verdict::Allow,
        (Some(record), Some(category)) => granted_or_block(record, category),
        (None, Some(category)) => Verdict::block(category),
    }
}

/// Decide a cookie write by name.
pub fn cookie_verdict(
    patterns: &BlockPatterns,
    config: &BlockerConfig,
    consent: Option<&ConsentRecord>,
    name: &str,
) -> Verdict {
    if name == config.consent_cookie_name {
        return Verdict::Allow;
    }

    match consent {
        Some(record) => patterns
            .cookie_categories(name)
            .find(|matched| *matched != category::FUNCTIONAL && !record.get(matched))
            .map(Verdict::block)
            .unwrap_or(Verdict::Allow),
        None => match (config.pre_consent, patterns.classify_cookie(name)) {
            (_, Some(category)) => Verdict::block(category),
            (PreConsentPolicy::BlockAll, None) => Verdict::block(UNCLASSIFIED),
            (PreConsentPolicy::KnownTrackers, None) => Verdict::Allow,
        },
    }
}

fn granted_or_block(record: &ConsentRecord, category: &str) -> Verdict {
    if category == category::FUNCTIONAL || record.get(category) {
        Verdict::Allow
    } else {
        Verdict::block(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_consent::ConsentChoices;

    const GA: &str = "https://www.google-analytics.com/analytics.js";
    const FB: &str = "https://connect.facebook.net/en_US/fbevents.js";
    const APP: &str = "https://cdn.example.com/app.js";

    fn consent(choices: ConsentChoices) -> ConsentRecord {
        ConsentRecord::from_choices(&choices, Utc::now())
    }

    #[test]
    fn test_scripts_without_consent() {
        let patterns = BlockPatterns::builtin();

        assert_eq!(
            script_verdict(&patterns, None, GA, None),
            Verdict::Block { category: "analytics".into() }
        );
        assert_eq!(script_verdict(&patterns, None, APP, None), Verdict::Allow);

        // An explicit category is enough to hold a script back
        assert_eq!(
            script_verdict(&patterns, None, APP, Some("marketing")),
            Verdict::Block { category: "marketing".into() }
        );
        assert_eq!(script_verdict(&patterns, None, GA, Some("functional")), Verdict::Allow);
    }

    #[test]
    fn test_scripts_with_consent() {
        let patterns = BlockPatterns::builtin();
        let record = consent(ConsentChoices::new().analytics(true).marketing(false));

        assert_eq!(script_verdict(&patterns, Some(&record), GA, None), Verdict::Allow);
        assert_eq!(
            script_verdict(&patterns, Some(&record), FB, None),
            Verdict::Block { category: "marketing".into() }
        );
        assert_eq!(script_verdict(&patterns, Some(&record), APP, None), Verdict::Allow);
    }

    #[test]
    fn test_declared_category_wins() {
        let patterns = BlockPatterns::builtin();
        let record = consent(ConsentChoices::new().analytics(true).marketing(false));

        // Analytics URL declared as marketing follows the declaration
        assert_eq!(
            script_verdict(&patterns, Some(&record), GA, Some("marketing")),
            Verdict::Block { category: "marketing".into() }
        );
        assert_eq!(script_verdict(&patterns, Some(&record), FB, Some("analytics")), Verdict::Allow);
    }

    #[test]
    fn test_inline_scripts() {
        let patterns = BlockPatterns::builtin();
        let record = consent(ConsentChoices::new().analytics(true));

        let snippet = "gtag('config', 'G-XYZ');";
        assert!(inline_verdict(&patterns, None, snippet, None).is_blocked());
        assert_eq!(inline_verdict(&patterns, Some(&record), snippet, None), Verdict::Allow);

        let pixel = "fbq('track', 'PageView');";
        assert_eq!(
            inline_verdict(&patterns, Some(&record), pixel, None).category(),
            Some("marketing")
        );

        assert_eq!(inline_verdict(&patterns, None, "console.log(1)", None), Verdict::Allow);
    }

    #[test]
    fn test_cookies_without_consent() {
        let patterns = BlockPatterns::builtin();
        let mut config = BlockerConfig::default();

        assert_eq!(
            cookie_verdict(&patterns, &config, None, "_ga"),
            Verdict::Block { category: "analytics".into() }
        );
        assert_eq!(
            cookie_verdict(&patterns, &config, None, "session_id"),
            Verdict::Block { category: UNCLASSIFIED.into() }
        );
        assert_eq!(cookie_verdict(&patterns, &config, None, "cookieConsent"), Verdict::Allow);

        config.pre_consent = PreConsentPolicy::KnownTrackers;
        assert_eq!(cookie_verdict(&patterns, &config, None, "session_id"), Verdict::Allow);
        assert!(cookie_verdict(&patterns, &config, None, "_fbp").is_blocked());
    }

    #[test]
    fn test_cookies_with_consent() {
        let patterns = BlockPatterns::builtin();
        let config = BlockerConfig::default();
        let record = consent(ConsentChoices::new().analytics(true).marketing(false));

        assert_eq!(cookie_verdict(&patterns, &config, Some(&record), "_ga"), Verdict::Allow);
        assert_eq!(
            cookie_verdict(&patterns, &config, Some(&record), "_fbp"),
            Verdict::Block { category: "marketing".into() }
        );
        assert_eq!(cookie_verdict(&patterns, &config, Some(&record), "session_id"), Verdict::Allow);
    }
}
