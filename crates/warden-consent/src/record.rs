//! Consent record and caller-supplied choices

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Well-known category names
pub mod category {
    pub const FUNCTIONAL: &str = "functional";
    pub const ANALYTICS: &str = "analytics";
    pub const MARKETING: &str = "marketing";
    pub const SOCIAL: &str = "social";
}

/// The persisted decision.
///
/// Serialized flat, e.g.
/// `{"analytics":true,"functional":true,"marketing":false,"timestamp":"2026-10-18T09:30:00.000Z"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    #[serde(flatten)]
    categories: BTreeMap<String, bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    timestamp: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    /// Merge `choices` over `{functional: true}` and stamp the decision time.
    pub fn from_choices(choices: &ConsentChoices, now: DateTime<Utc>) -> Self {
        let mut categories = choices.0.clone();
        categories.insert(category::FUNCTIONAL.to_string(), true);

        Self {
            categories,
            timestamp: Some(truncate_to_millis(now)),
        }
    }

    /// Flag for `category`; unknown categories are `false`.
    pub fn get(&self, category: &str) -> bool {
        self.categories.get(category).copied().unwrap_or(false)
    }

    pub fn functional(&self) -> bool {
        self.get(category::FUNCTIONAL)
    }

    pub fn analytics(&self) -> bool {
        self.get(category::ANALYTICS)
    }

    pub fn marketing(&self) -> bool {
        self.get(category::MARKETING)
    }

    pub fn categories(&self) -> &BTreeMap<String, bool> {
        &self.categories
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Timestamp comparison used to settle conflicting copies; a record
    /// without a timestamp is never newer.
    pub fn is_newer_than(&self, other: &ConsentRecord) -> bool {
        match (self.timestamp, other.timestamp) {
            (Some(mine), Some(theirs)) => mine > theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Category choices passed to `set_consent`.
///
/// There is no way to pass a timestamp, and `functional` is forced on when
/// the record is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentChoices(BTreeMap<String, bool>);

impl ConsentChoices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: &str, allowed: bool) -> Self {
        self.set(category, allowed);
        self
    }

    pub fn analytics(self, allowed: bool) -> Self {
        self.with(category::ANALYTICS, allowed)
    }

    pub fn marketing(self, allowed: bool) -> Self {
        self.with(category::MARKETING, allowed)
    }

    pub fn set(&mut self, category: &str, allowed: bool) {
        self.0.insert(category.to_string(), allowed);
    }

    pub fn get(&self, category: &str) -> Option<bool> {
        self.0.get(category).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, bool); N]> for ConsentChoices {
    fn from(pairs: [(&str, bool); N]) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |choices, (category, allowed)| {
                choices.with(category, allowed)
            })
    }
}

impl From<&ConsentRecord> for ConsentChoices {
    fn from(record: &ConsentRecord) -> Self {
        Self(record.categories.clone())
    }
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

fn serialize_timestamp<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    })
    .transpose()
}
