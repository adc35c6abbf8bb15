//! Cookie jar behind `document.cookie`
//!
//! Follows the RFC 6265 storage model closely enough for consent gating:
//! cookies are keyed by (name, domain, path), a past expiry deletes, and the
//! getter only yields cookies that match the document host and path.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name part of a `document.cookie` assignment, trimmed.
///
/// `"_ga=GA1.2.1; path=/"` yields `"_ga"`. An assignment without `=` has an
/// empty name.
pub fn cookie_name(assignment: &str) -> &str {
    let pair = assignment.split(';').next().unwrap_or("");
    match pair.split_once('=') {
        Some((name, _)) => name.trim(),
        None => "",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub host_only: bool,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub same_site: Option<String>,
    pub secure: bool,
}

impl Cookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at <= now).unwrap_or(false)
    }

    fn matches_host(&self, host: &str) -> bool {
        if self.host_only {
            self.domain == host
        } else {
            domain_match(host, &self.domain)
        }
    }
}

/// A parsed `document.cookie = "..."` assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub same_site: Option<String>,
    pub secure: bool,
}

impl SetCookie {
    /// Parse an assignment string. Returns `None` when there is nothing to store.
    pub fn parse(assignment: &str) -> Option<Self> {
        let mut parts = assignment.split(';');
        let pair = parts.next()?.trim();

        let (name, value) = match pair.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => ("", pair),
        };

        if name.is_empty() && value.is_empty() {
            return None;
        }

        let mut cookie = SetCookie {
            name: name.to_string(),
            value: value.to_string(),
            expires: None,
            max_age: None,
            domain: None,
            path: None,
            same_site: None,
            secure: false,
        };

        for attribute in parts {
            let attribute = attribute.trim();
            let (key, val) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attribute, ""),
            };

            match key.to_ascii_lowercase().as_str() {
                "expires" => cookie.expires = parse_http_date(val),
                "max-age" => cookie.max_age = val.parse().ok(),
                "domain" if !val.is_empty() => {
                    cookie.domain = Some(val.trim_start_matches('.').to_ascii_lowercase())
                }
                "path" if val.starts_with('/') => cookie.path = Some(val.to_string()),
                "samesite" => cookie.same_site = Some(val.to_string()),
                "secure" => cookie.secure = true,
                _ => {}
            }
        }

        Some(cookie)
    }

    /// Whether applying this assignment deletes rather than stores
    pub fn is_deletion(&self, now: DateTime<Utc>) -> bool {
        self.expiry(now).map(|at| at <= now).unwrap_or(false)
    }

    fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Max-Age wins over Expires
        match self.max_age {
            Some(seconds) if seconds <= 0 => Some(now - Duration::seconds(1)),
            Some(seconds) => now.checked_add_signed(Duration::seconds(seconds)),
            None => self.expires,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or delete a cookie. Returns false if the assignment was rejected
    /// (foreign domain).
    pub fn apply(&mut self, set: SetCookie, host: &str, request_path: &str, now: DateTime<Utc>) -> bool {
        let (domain, host_only) = match &set.domain {
            Some(domain) => {
                if !domain_match(host, domain) {
                    tracing::debug!(cookie = %set.name, domain = %domain, host = %host, "Rejected cookie for foreign domain");
                    return false;
                }
                (domain.clone(), false)
            }
            None => (host.to_string(), true),
        };

        let path = set
            .path
            .clone()
            .unwrap_or_else(|| default_path(request_path));
        let expires = set.expiry(now);

        self.cookies
            .retain(|c| !(c.name == set.name && c.domain == domain && c.path == path));

        if expires.map(|at| at <= now).unwrap_or(false) {
            return true;
        }

        self.cookies.push(Cookie {
            name: set.name,
            value: set.value,
            domain,
            host_only,
            path,
            expires,
            same_site: set.same_site,
            secure: set.secure,
        });

        true
    }

    /// `name=value; name2=value2` for cookies visible at `host` + `request_path`
    pub fn header(&self, host: &str, request_path: &str, now: DateTime<Utc>) -> String {
        self.visible(host, request_path, now)
            .map(|c| {
                if c.name.is_empty() {
                    c.value.clone()
                } else {
                    format!("{}={}", c.name, c.value)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn visible<'a>(
        &'a self,
        host: &'a str,
        request_path: &'a str,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a Cookie> + 'a {
        self.cookies.iter().filter(move |c| {
            !c.is_expired(now) && c.matches_host(host) && path_match(request_path, &c.path)
        })
    }

    pub fn all(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => request_path[..index].to_string(),
    }
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Parse an HTTP date such as `Thu, 01 Jan 1970 00:00:00 GMT`.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.trim().replace(" UTC", " GMT");

    if let Ok(parsed) = DateTime::parse_from_rfc2822(&normalized) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Netscape-style dashes: Thu, 01-Jan-1970 00:00:00 GMT
    NaiveDateTime::parse_from_str(&normalized, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format an instant the way cookie `expires` attributes expect.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
