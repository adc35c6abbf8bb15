//! Schema migrations for the local storage database

use rusqlite::{Connection, OptionalExtension};

use crate::Result;

const SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let current: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?
        .unwrap_or(0);

    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    if current < 1 {
        migrate_v1(conn)?;
    }

    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [SCHEMA_VERSION])?;
    tracing::debug!(from = current, to = SCHEMA_VERSION, "Local storage schema upgraded");
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Running migration v1: local storage table");

    // One row per origin-scoped key, mirroring window.localStorage
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS local_storage (
            origin TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (origin, key)
        );
    "#,
    )?;

    Ok(())
}
