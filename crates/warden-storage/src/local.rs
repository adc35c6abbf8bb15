//! SQLite-backed local storage

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::backend::ConsentBackend;
use crate::error::StorageError;
use crate::migrations::run_migrations;
use crate::Result;

/// Largest value accepted for a single key, like a browser's per-origin quota
const MAX_VALUE_BYTES: usize = 5 * 1024 * 1024;

pub struct LocalStorage {
    conn: Arc<Mutex<Connection>>,
    origin: String,
}

impl LocalStorage {
    pub fn open<P: AsRef<Path>>(path: P, origin: &str) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            origin: origin.to_string(),
        })
    }

    pub fn open_in_memory(origin: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            origin: origin.to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Every key stored for this origin
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT key FROM local_storage WHERE origin = ?1 ORDER BY key")?;
            let keys = stmt
                .query_map([&self.origin], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }
}

impl ConsentBackend for LocalStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM local_storage WHERE origin = ?1 AND key = ?2",
                    rusqlite::params![self.origin, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if value.len() > MAX_VALUE_BYTES {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
            });
        }

        let updated_at = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO local_storage (origin, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![self.origin, key, value, updated_at],
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM local_storage WHERE origin = ?1 AND key = ?2",
                rusqlite::params![self.origin, key],
            )?;
            Ok(())
        })
    }

    fn kind(&self) -> &'static str {
        "localStorage"
    }
}

impl Clone for LocalStorage {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            origin: self.origin.clone(),
        }
    }
}
