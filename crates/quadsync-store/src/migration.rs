//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! string that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            tracing::info!(version, "applying schema migration");
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
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
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Detected divergences between library views of an entity
        CREATE TABLE conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,            -- table-name form ("items", ...)
            entity_key TEXT NOT NULL,
            source TEXT NOT NULL,                 -- reference library
            target TEXT NOT NULL,                 -- diverging library
            source_payload TEXT,                  -- JSON, NULL = record absent
            target_payload TEXT,                  -- JSON, NULL = record absent
            status TEXT NOT NULL DEFAULT 'open',
            detected_at TEXT NOT NULL,            -- RFC 3339
            detected_on TEXT NOT NULL,            -- calendar date, coalescing key
            resolved_at TEXT,
            resolution_strategy TEXT,
            resolved_payload TEXT                 -- winning value, audit only
        );

        -- Run history
        CREATE TABLE sync_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mode TEXT NOT NULL,                   -- scheduled | manual
            environment TEXT NOT NULL,
            targets TEXT NOT NULL,                -- JSON array of library ids
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL,                 -- running | succeeded | failed
            records_processed INTEGER NOT NULL DEFAULT 0,
            conflicts_found INTEGER NOT NULL DEFAULT 0
        );

        -- Per-date aggregate counters for the dashboard
        CREATE TABLE daily_stats (
            stat_date TEXT PRIMARY KEY,           -- YYYY-MM-DD
            sync_success INTEGER NOT NULL DEFAULT 0,
            sync_conflicts INTEGER NOT NULL DEFAULT 0,
            ai_requests INTEGER NOT NULL DEFAULT 0,
            inventory_changes INTEGER NOT NULL DEFAULT 0
        );

        -- Indexes for common queries
        CREATE INDEX idx_conflicts_status ON conflicts(status);
        CREATE INDEX idx_conflicts_detected ON conflicts(detected_at);
        CREATE INDEX idx_runs_started ON sync_runs(started_at);

        -- Backstop for the coalescing critical section: at most one open
        -- conflict per identity per detection day.
        CREATE UNIQUE INDEX idx_conflicts_open_identity
            ON conflicts(entity_type, entity_key, source, target, detected_on)
            WHERE status = 'open';
        "#,
    )?;

    Ok(())
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

        assert!(tables.contains(&"conflicts".to_string()));
        assert!(tables.contains(&"sync_runs".to_string()));
        assert!(tables.contains(&"daily_stats".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
