//! Database schema migrations for SQLite.
//!
//! Versioned migrations: each version is applied once, inside one
//! transaction, and recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Safe to call repeatedly.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Block heights are stored as the two's-complement `i64` of the `u64`
/// value, so the full range round-trips.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE categories (
            label TEXT PRIMARY KEY
        );

        -- Single-row flags, e.g. 'categories_initialized'
        CREATE TABLE registry_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );

        CREATE TABLE consents (
            granter TEXT NOT NULL,
            grantee TEXT NOT NULL,
            category TEXT NOT NULL,
            expiry INTEGER NOT NULL,
            active INTEGER NOT NULL,
            granted_at INTEGER NOT NULL,
            granted_by TEXT NOT NULL,
            PRIMARY KEY (granter, grantee, category)
        );

        -- One row per delegate; position keeps insertion order
        CREATE TABLE delegations (
            granter TEXT NOT NULL,
            position INTEGER NOT NULL,
            delegate TEXT NOT NULL,
            PRIMARY KEY (granter, position),
            UNIQUE (granter, delegate)
        );

        CREATE TABLE templates (
            name TEXT PRIMARY KEY,
            categories BLOB NOT NULL,         -- CBOR array of labels
            duration INTEGER NOT NULL,
            description TEXT NOT NULL
        );

        CREATE TABLE history (
            granter TEXT NOT NULL,
            grantee TEXT NOT NULL,
            category TEXT NOT NULL,
            seq INTEGER NOT NULL,
            at INTEGER NOT NULL,
            action INTEGER NOT NULL,
            details TEXT NOT NULL,
            prev_digest BLOB NOT NULL,        -- 32 bytes
            digest BLOB NOT NULL,             -- 32 bytes
            PRIMARY KEY (granter, grantee, category, seq)
        );

        CREATE TABLE history_heads (
            granter TEXT NOT NULL,
            grantee TEXT NOT NULL,
            category TEXT NOT NULL,
            next_seq INTEGER NOT NULL,
            head BLOB NOT NULL,
            PRIMARY KEY (granter, grantee, category)
        );

        CREATE INDEX idx_consents_grantee ON consents(grantee);
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "categories",
            "consents",
            "delegations",
            "history",
            "history_heads",
            "registry_meta",
            "schema_migrations",
            "templates",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
