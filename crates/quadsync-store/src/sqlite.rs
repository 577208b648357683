//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the quadsync engine. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use quadsync_core::{
    Conflict, ConflictId, ConflictStatus, DailyStat, EntityKey, EntityType, NewConflict,
    RecordPayload, ResolutionStrategy, RunId, RunMode, RunStatus, SourceId, SyncRun,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{RecordOutcome, ResolveOutcome, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime; the per-connection mutex also
/// makes the coalescing check-then-insert and the resolve check-then-set
/// single critical sections.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation against the connection on the blocking
    /// thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Runtime(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Runtime(format!("spawn_blocking failed: {e}")))?
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Row mapping helpers
// ─────────────────────────────────────────────────────────────────────────

fn invalid(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(idx, format!("bad timestamp {s:?}: {e}")))
}

fn parse_payload(idx: usize, s: Option<String>) -> rusqlite::Result<Option<RecordPayload>> {
    s.map(|json| {
        serde_json::from_str(&json).map_err(|e| invalid(idx, format!("bad payload json: {e}")))
    })
    .transpose()
}

fn row_to_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conflict> {
    let entity_type: String = row.get("entity_type")?;
    let status: String = row.get("status")?;
    let detected_at: String = row.get("detected_at")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;
    let strategy: Option<String> = row.get("resolution_strategy")?;

    Ok(Conflict {
        id: ConflictId(row.get("id")?),
        entity_type: EntityType::parse(&entity_type)
            .ok_or_else(|| invalid(1, format!("unknown entity type {entity_type:?}")))?,
        entity_key: EntityKey::new(row.get::<_, String>("entity_key")?),
        source: SourceId::new(row.get::<_, String>("source")?),
        target: SourceId::new(row.get::<_, String>("target")?),
        source_payload: parse_payload(5, row.get("source_payload")?)?,
        target_payload: parse_payload(6, row.get("target_payload")?)?,
        status: ConflictStatus::parse(&status)
            .ok_or_else(|| invalid(7, format!("unknown conflict status {status:?}")))?,
        detected_at: parse_timestamp(8, &detected_at)?,
        resolved_at: resolved_at
            .map(|s| parse_timestamp(10, &s))
            .transpose()?,
        resolution_strategy: strategy
            .map(|s| {
                ResolutionStrategy::parse(&s)
                    .ok_or_else(|| invalid(11, format!("unknown strategy {s:?}")))
            })
            .transpose()?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRun> {
    let mode: String = row.get("mode")?;
    let status: String = row.get("status")?;
    let targets_json: String = row.get("targets")?;
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(SyncRun {
        id: RunId(row.get("id")?),
        mode: RunMode::parse(&mode).ok_or_else(|| invalid(1, format!("unknown mode {mode:?}")))?,
        environment: row.get("environment")?,
        targets: serde_json::from_str(&targets_json)
            .map_err(|e| invalid(3, format!("bad targets json: {e}")))?,
        started_at: parse_timestamp(4, &started_at)?,
        completed_at: completed_at
            .map(|s| parse_timestamp(5, &s))
            .transpose()?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| invalid(6, format!("unknown run status {status:?}")))?,
        records_processed: row.get::<_, i64>("records_processed")? as u64,
        conflicts_found: row.get::<_, i64>("conflicts_found")? as u64,
    })
}

fn row_to_stat(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyStat> {
    let date: String = row.get("stat_date")?;
    Ok(DailyStat {
        date: date
            .parse::<NaiveDate>()
            .map_err(|e| invalid(0, format!("bad stat date {date:?}: {e}")))?,
        sync_success: row.get::<_, i64>("sync_success")? as u64,
        sync_conflicts: row.get::<_, i64>("sync_conflicts")? as u64,
        ai_requests: row.get::<_, i64>("ai_requests")? as u64,
        inventory_changes: row.get::<_, i64>("inventory_changes")? as u64,
    })
}

fn encode_payload(payload: Option<&RecordPayload>) -> Result<Option<String>> {
    payload
        .map(|p| serde_json::to_string(p).map_err(StoreError::from))
        .transpose()
}

const CONFLICT_COLUMNS: &str = "id, entity_type, entity_key, source, target, source_payload, \
     target_payload, status, detected_at, detected_on, resolved_at, resolution_strategy";

const RUN_COLUMNS: &str = "id, mode, environment, targets, started_at, completed_at, status, \
     records_processed, conflicts_found";

#[async_trait]
impl Store for SqliteStore {
    async fn record_conflict(&self, new: &NewConflict) -> Result<RecordOutcome> {
        let new = new.clone();
        self.with_conn(move |conn| {
            let detected_on = new.detected_at.date_naive().to_string();

            // Coalescing check-then-insert; atomic under the connection mutex.
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM conflicts
                     WHERE status = 'open' AND entity_type = ?1 AND entity_key = ?2
                       AND source = ?3 AND target = ?4 AND detected_on = ?5",
                    params![
                        new.entity_type.as_str(),
                        new.entity_key.as_str(),
                        new.source.as_str(),
                        new.target.as_str(),
                        detected_on,
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                return Ok(RecordOutcome::Coalesced(ConflictId(id)));
            }

            conn.execute(
                "INSERT INTO conflicts (
                    entity_type, entity_key, source, target,
                    source_payload, target_payload, status, detected_at, detected_on
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?8)",
                params![
                    new.entity_type.as_str(),
                    new.entity_key.as_str(),
                    new.source.as_str(),
                    new.target.as_str(),
                    encode_payload(new.source_payload.as_ref())?,
                    encode_payload(new.target_payload.as_ref())?,
                    new.detected_at.to_rfc3339(),
                    detected_on,
                ],
            )?;

            Ok(RecordOutcome::Recorded(ConflictId(conn.last_insert_rowid())))
        })
        .await
    }

    async fn get_conflict(&self, id: ConflictId) -> Result<Option<Conflict>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?1"),
                params![id.0],
                row_to_conflict,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<Conflict>> {
        self.with_conn(move |conn| {
            let (sql, filter) = match status {
                Some(s) => (
                    format!(
                        "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE status = ?1
                         ORDER BY detected_at DESC, id DESC"
                    ),
                    Some(s.as_str()),
                ),
                None => (
                    format!(
                        "SELECT {CONFLICT_COLUMNS} FROM conflicts
                         ORDER BY detected_at DESC, id DESC"
                    ),
                    None,
                ),
            };

            let mut stmt = conn.prepare(&sql)?;
            let rows = match filter {
                Some(s) => stmt.query_map(params![s], row_to_conflict)?,
                None => stmt.query_map([], row_to_conflict)?,
            };
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn count_conflicts(&self, status: ConflictStatus) -> Result<u64> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conflicts WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn resolve_conflict(
        &self,
        id: ConflictId,
        strategy: ResolutionStrategy,
        resolved_payload: &RecordPayload,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        let payload_json = serde_json::to_string(resolved_payload)?;
        self.with_conn(move |conn| {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM conflicts WHERE id = ?1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?;

            match status.as_deref() {
                None => Ok(ResolveOutcome::NotFound),
                Some("resolved") => Ok(ResolveOutcome::AlreadyResolved),
                Some(_) => {
                    conn.execute(
                        "UPDATE conflicts
                         SET status = 'resolved', resolved_at = ?2,
                             resolution_strategy = ?3, resolved_payload = ?4
                         WHERE id = ?1 AND status = 'open'",
                        params![
                            id.0,
                            resolved_at.to_rfc3339(),
                            strategy.as_str(),
                            payload_json,
                        ],
                    )?;
                    Ok(ResolveOutcome::Resolved)
                }
            }
        })
        .await
    }

    async fn create_run(
        &self,
        mode: RunMode,
        environment: &str,
        targets: &[SourceId],
        started_at: DateTime<Utc>,
    ) -> Result<RunId> {
        let environment = environment.to_string();
        let targets_json = serde_json::to_string(targets)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_runs (mode, environment, targets, started_at, status)
                 VALUES (?1, ?2, ?3, ?4, 'running')",
                params![
                    mode.as_str(),
                    environment,
                    targets_json,
                    started_at.to_rfc3339(),
                ],
            )?;
            Ok(RunId(conn.last_insert_rowid()))
        })
        .await
    }

    async fn complete_run(
        &self,
        id: RunId,
        status: RunStatus,
        records_processed: u64,
        conflicts_found: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE sync_runs
                 SET status = ?2, records_processed = ?3, conflicts_found = ?4,
                     completed_at = ?5
                 WHERE id = ?1",
                params![
                    id.0,
                    status.as_str(),
                    records_processed as i64,
                    conflicts_found as i64,
                    completed_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_run(&self, id: RunId) -> Result<Option<SyncRun>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = ?1"),
                params![id.0],
                row_to_run,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn last_run(&self) -> Result<Option<SyncRun>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM sync_runs
                     ORDER BY started_at DESC, id DESC LIMIT 1"
                ),
                [],
                row_to_run,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM sync_runs
                 ORDER BY started_at DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_run)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn apply_run_outcome(
        &self,
        date: NaiveDate,
        success_delta: u64,
        conflict_delta: u64,
    ) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO daily_stats (stat_date, sync_success, sync_conflicts)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(stat_date) DO UPDATE SET
                     sync_success = sync_success + excluded.sync_success,
                     sync_conflicts = sync_conflicts + excluded.sync_conflicts",
                params![
                    date.to_string(),
                    success_delta as i64,
                    conflict_delta as i64
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_daily_stat(&self, date: NaiveDate) -> Result<Option<DailyStat>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT stat_date, sync_success, sync_conflicts, ai_requests, inventory_changes
                 FROM daily_stats WHERE stat_date = ?1",
                params![date.to_string()],
                row_to_stat,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_daily_stats(&self, limit: usize) -> Result<Vec<DailyStat>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT stat_date, sync_success, sync_conflicts, ai_requests, inventory_changes
                 FROM daily_stats ORDER BY stat_date DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_stat)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }
}
