//! Block pattern registry
//!
//! Pure lookups over script URLs, inline script bodies and cookie names.
//! Nothing here reads consent or touches a document.

use regex::Regex;

use warden_consent::category;

use crate::error::BlockerError;
use crate::Result;

/// Script hosts and paths by category
const SCRIPT_PATTERNS: &[(&str, &[&str])] = &[
    (
        category::ANALYTICS,
        &[
            r"google-analytics\.com",
            r"googletagmanager\.com",
            r"hotjar\.com",
            r"mixpanel\.com",
            r"segment\.(com|io)",
            r"amplitude\.com",
            r"fullstory\.com",
        ],
    ),
    (
        category::MARKETING,
        &[r"doubleclick\.net", r"facebook\.net", r"facebook\.com.*/tr"],
    ),
    (
        category::SOCIAL,
        &[r"twitter\.com.*/analytics", r"linkedin\.com.*/analytics"],
    ),
];

/// Cross-category signatures used while no decision exists
const KNOWN_TRACKERS: &[&str] = &[
    r"google-analytics\.com",
    r"googletagmanager\.com",
    r"doubleclick\.net",
    r"facebook\.net",
    r"facebook\.com.*/tr",
    r"twitter\.com.*/analytics",
    r"linkedin\.com.*/analytics",
    r"hotjar\.com",
    r"mixpanel\.com",
    r"segment\.com",
    r"amplitude\.com",
    r"fullstory\.com",
    r"_ga_",
    r"_gid",
    r"_gat",
    r"fbp",
    r"fbc",
];

/// Inline invocations of common tracking globals: (category, label, pattern)
const INLINE_SIGNATURES: &[(&str, &str, &str)] = &[
    (category::ANALYTICS, "ga(", r"\bga\s*\("),
    (category::ANALYTICS, "gtag(", r"\bgtag\s*\("),
    (category::ANALYTICS, "_gaq.push", r"\b_gaq\.push\b"),
    (category::ANALYTICS, "dataLayer.push", r"\bdataLayer\.push\s*\("),
    (category::ANALYTICS, "hj(", r"\bhj\s*\("),
    (category::ANALYTICS, "mixpanel.", r"\bmixpanel\.\w"),
    (category::ANALYTICS, "amplitude.", r"\bamplitude\.\w"),
    (category::MARKETING, "fbq(", r"\bfbq\s*\("),
    (category::MARKETING, "_fbq", r"\b_fbq\b"),
    (category::MARKETING, "twq(", r"\btwq\s*\("),
    (category::MARKETING, "_linkedin_partner_id", r"\b_linkedin_partner_id\b"),
];

/// Cookie names by category
const COOKIE_PATTERNS: &[(&str, &[&str])] = &[
    (
        category::ANALYTICS,
        &[
            "^_ga", "^_gid", "^_gat", "^_utm", "^__utma", "^__utmb", "^__utmc", "^__utmt",
            "^__utmz", "^_dc_gtm",
        ],
    ),
    (
        category::MARKETING,
        &[
            "^_fbp",
            "^_fbc",
            "^fr",
            "^tr",
            "^IDE",
            "^test_cookie",
            "^ads-id",
            "^_gcl_",
            "^__Secure-3PAPISID",
            "^__Secure-3PSID",
        ],
    ),
    (
        category::SOCIAL,
        &[
            "^__twitter_sess",
            "^li_at",
            "^li_gc",
            "^bcookie",
            "^bscookie",
            "^lang",
            "^lidc",
        ],
    ),
];

#[derive(Debug, Clone)]
struct CategoryPatterns {
    category: String,
    patterns: Vec<Regex>,
}

#[derive(Debug, Clone)]
pub struct InlineSignature {
    pub category: String,
    pub label: String,
    pattern: Regex,
}

impl InlineSignature {
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

#[derive(Debug, Clone)]
pub struct BlockPatterns {
    scripts: Vec<CategoryPatterns>,
    known_trackers: Vec<Regex>,
    inline: Vec<InlineSignature>,
    cookies: Vec<CategoryPatterns>,
}

impl BlockPatterns {
    /// A registry with no patterns at all
    pub fn empty() -> Self {
        Self {
            scripts: Vec::new(),
            known_trackers: Vec::new(),
            inline: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// The built-in tracker lists
    pub fn builtin() -> Self {
        let mut patterns = Self::empty();

        for (category, sources) in SCRIPT_PATTERNS {
            for source in *sources {
                push_pattern(&mut patterns.scripts, category, builtin_regex(source));
            }
        }

        patterns.known_trackers = KNOWN_TRACKERS.iter().map(|s| builtin_regex(s)).collect();

        patterns.inline = INLINE_SIGNATURES
            .iter()
            .map(|(category, label, source)| InlineSignature {
                category: category.to_string(),
                label: label.to_string(),
                pattern: builtin_regex(source),
            })
            .collect();

        for (category, sources) in COOKIE_PATTERNS {
            for source in *sources {
                push_pattern(&mut patterns.cookies, category, builtin_regex(source));
            }
        }

        patterns
    }

    // === Extension ===

    pub fn add_script_pattern(&mut self, category: &str, pattern: &str) -> Result<()> {
        let regex = compile(pattern)?;
        push_pattern(&mut self.scripts, category, regex);
        Ok(())
    }

    pub fn add_known_tracker(&mut self, pattern: &str) -> Result<()> {
        self.known_trackers.push(compile(pattern)?);
        Ok(())
    }

    pub fn add_inline_signature(&mut self, category: &str, label: &str, pattern: &str) -> Result<()> {
        self.inline.push(InlineSignature {
            category: category.to_string(),
            label: label.to_string(),
            pattern: compile(pattern)?,
        });
        Ok(())
    }

    pub fn add_cookie_pattern(&mut self, category: &str, pattern: &str) -> Result<()> {
        let regex = compile(pattern)?;
        push_pattern(&mut self.cookies, category, regex);
        Ok(())
    }

    // === Lookups ===

    /// Category a script URL belongs to, if any pattern matches
    pub fn classify(&self, url: &str) -> Option<&str> {
        first_category(&self.scripts, url)
    }

    /// Whether a URL matches any known tracker signature
    pub fn is_known_tracker(&self, url: &str) -> bool {
        self.known_trackers.iter().any(|p| p.is_match(url))
            || self.classify(url).is_some()
    }

    /// First inline signature found in a script body
    pub fn classify_inline(&self, text: &str) -> Option<&InlineSignature> {
        self.inline.iter().find(|sig| sig.is_match(text))
    }

    /// First category whose cookie patterns match `name`
    pub fn classify_cookie(&self, name: &str) -> Option<&str> {
        first_category(&self.cookies, name)
    }

    /// Every category whose cookie patterns match `name`
    pub fn cookie_categories<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.cookies
            .iter()
            .filter(move |group| group.patterns.iter().any(|p| p.is_match(name)))
            .map(|group| group.category.as_str())
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self
            .scripts
            .iter()
            .chain(self.cookies.iter())
            .map(|group| group.category.as_str())
            .chain(self.inline.iter().map(|sig| sig.category.as_str()))
            .collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }
}

impl Default for BlockPatterns {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_regex(source: &str) -> Regex {
    Regex::new(source).expect("valid built-in block pattern")
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| BlockerError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn push_pattern(groups: &mut Vec<CategoryPatterns>, category: &str, regex: Regex) {
    match groups.iter_mut().find(|group| group.category == category) {
        Some(group) => group.patterns.push(regex),
        None => groups.push(CategoryPatterns {
            category: category.to_string(),
            patterns: vec![regex],
        }),
    }
}

fn first_category<'a>(groups: &'a [CategoryPatterns], input: &str) -> Option<&'a str> {
    groups
        .iter()
        .find(|group| group.patterns.iter().any(|p| p.is_match(input)))
        .map(|group| group.category.as_str())
}
