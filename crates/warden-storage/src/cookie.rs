//! Same-site cookie storage on the host document
//!
//! Values are percent-encoded the way `encodeURIComponent` does it, so a
//! record written here reads back identically from page scripts.

use chrono::{Duration, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;

use warden_dom::{format_http_date, Document};

use crate::backend::ConsentBackend;
use crate::error::StorageError;
use crate::Result;

/// Characters `encodeURIComponent` leaves alone
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

pub struct CookieStorage {
    document: Arc<Document>,
    expire_days: u32,
}

impl CookieStorage {
    pub fn new(document: Arc<Document>, expire_days: u32) -> Self {
        Self {
            document,
            expire_days,
        }
    }

    pub fn expire_days(&self) -> u32 {
        self.expire_days
    }

    /// Raw (still encoded) value of the named cookie
    fn raw_value(&self, key: &str) -> Option<String> {
        self.document.cookie().split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name.trim() == key && !value.is_empty()).then(|| value.to_string())
        })
    }
}

impl ConsentBackend for CookieStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.raw_value(key) {
            Some(raw) => {
                let decoded = percent_decode_str(&raw)
                    .decode_utf8()
                    .map_err(|_| StorageError::InvalidEncoding {
                        key: key.to_string(),
                    })?;
                Ok(Some(decoded.into_owned()))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let expires = Utc::now()
            .checked_add_signed(Duration::days(i64::from(self.expire_days)))
            .ok_or_else(|| StorageError::Unavailable("cookie expiry out of range".to_string()))?;

        let encoded = utf8_percent_encode(value, URI_COMPONENT).to_string();
        self.document.set_cookie(&format!(
            "{}={}; expires={}; path=/; SameSite=Lax",
            key,
            encoded,
            format_http_date(expires)
        ));

        // The accessor may be wrapped and drop the write silently
        if self.raw_value(key).as_deref() != Some(encoded.as_str()) {
            return Err(StorageError::WriteRejected {
                key: key.to_string(),
            });
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.document
            .set_cookie(&format!("{}=; expires={}; path=/; SameSite=Lax", key, EXPIRED));
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "cookie"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (Arc<Document>, CookieStorage) {
        let document = Document::new("https://www.example.com/").unwrap();
        let storage = CookieStorage::new(document.clone(), 365);
        (document, storage)
    }

    #[test]
    fn test_value_is_uri_encoded() {
        let (document, storage) = storage();
        storage
            .set("cookieConsent", r#"{"functional":true,"note":"a b"}"#)
            .unwrap();

        let header = document.cookie();
        assert_eq!(
            header,
            "cookieConsent=%7B%22functional%22%3Atrue%2C%22note%22%3A%22a%20b%22%7D"
        );
        assert_eq!(
            storage.get("cookieConsent").unwrap().as_deref(),
            Some(r#"{"functional":true,"note":"a b"}"#)
        );
    }

    #[test]
    fn test_cookie_attributes() {
        let (document, storage) = storage();
        storage.set("cookieConsent", "{}").unwrap();

        let jar = document.cookie_jar();
        let cookie = &jar.all()[0];
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));

        let days = (cookie.expires.unwrap() - Utc::now()).num_days();
        assert!((363..=365).contains(&days));
    }

    #[test]
    fn test_exact_name_match() {
        let (document, storage) = storage();
        document.set_cookie("xcookieConsent=other; path=/");

        assert_eq!(storage.get("cookieConsent").unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let (document, storage) = storage();
        storage.set("cookieConsent", "{}").unwrap();
        storage.remove("cookieConsent").unwrap();

        assert_eq!(storage.get("cookieConsent").unwrap(), None);
        assert!(document.cookie_jar().is_empty());
    }

    #[test]
    fn test_rejected_write_is_an_error() {
        let (document, storage) = storage();
        document
            .replace_cookie_accessor(warden_dom::CookieAccessor {
                get: document.primitives().cookie.get,
                set: Arc::new(|_: &Document, _: &str| {}),
            })
            .unwrap();

        assert!(matches!(
            storage.set("cookieConsent", "{}"),
            Err(StorageError::WriteRejected { .. })
        ));
        assert_eq!(storage.get("cookieConsent").unwrap(), None);
    }

    #[test]
    fn test_invalid_encoding() {
        let (document, storage) = storage();
        document.set_cookie("cookieConsent=%FF%FE; path=/");

        assert!(matches!(
            storage.get("cookieConsent"),
            Err(StorageError::InvalidEncoding { .. })
        ));
    }
}
