//! Backend abstraction

use serde::{Deserialize, Serialize};

use crate::Result;

/// Get/set/remove of a single named value.
///
/// Implementations must not panic on failure; errors are returned so the
/// consent store can degrade to "undecided".
pub trait ConsentBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Short name used in log fields
    fn kind(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMethod {
    #[default]
    #[serde(rename = "localStorage")]
    LocalStorage,
    #[serde(rename = "cookie")]
    Cookie,
}

impl StorageMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMethod::LocalStorage => "localStorage",
            StorageMethod::Cookie => "cookie",
        }
    }
}

impl std::fmt::Display for StorageMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StorageMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "localStorage" | "local_storage" => Ok(StorageMethod::LocalStorage),
            "cookie" => Ok(StorageMethod::Cookie),
            _ => Err(format!("Unknown storage method: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_method_names() {
        assert_eq!(StorageMethod::default(), StorageMethod::LocalStorage);
        assert_eq!("cookie".parse::<StorageMethod>(), Ok(StorageMethod::Cookie));
        assert!("sessionStorage".parse::<StorageMethod>().is_err());
        assert_eq!(
            serde_json::to_string(&StorageMethod::LocalStorage).unwrap(),
            "\"localStorage\""
        );
    }
}
