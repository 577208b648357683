//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use quadsync_core::{
    Conflict, ConflictId, ConflictStatus, DailyStat, NewConflict, RecordPayload,
    ResolutionStrategy, RunId, RunMode, RunStatus, SourceId, SyncRun,
};

use crate::error::Result;
use crate::traits::{RecordOutcome, ResolveOutcome, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// coalescing and resolve checks run entirely inside the write lock, so
/// they are atomic with respect to each other.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    conflicts: BTreeMap<ConflictId, Conflict>,
    /// Winning payloads kept for audit, keyed by resolved conflict id.
    resolved_payloads: HashMap<ConflictId, RecordPayload>,
    next_conflict_id: i64,

    runs: BTreeMap<RunId, SyncRun>,
    next_run_id: i64,

    stats: BTreeMap<NaiveDate, DailyStat>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                conflicts: BTreeMap::new(),
                resolved_payloads: HashMap::new(),
                next_conflict_id: 1,
                runs: BTreeMap::new(),
                next_run_id: 1,
                stats: BTreeMap::new(),
            }),
        }
    }

    /// The audit payload recorded when a conflict was resolved, if any.
    pub fn resolved_payload(&self, id: ConflictId) -> Option<RecordPayload> {
        let inner = self.inner.read().unwrap();
        inner.resolved_payloads.get(&id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn record_conflict(&self, new: &NewConflict) -> Result<RecordOutcome> {
        let mut inner = self.inner.write().unwrap();

        // Coalesce with a matching open conflict from the same detection day.
        let detection_day = new.detected_at.date_naive();
        let existing = inner.conflicts.values().find(|c| {
            c.status == ConflictStatus::Open
                && c.entity_type == new.entity_type
                && c.entity_key == new.entity_key
                && c.source == new.source
                && c.target == new.target
                && c.detected_at.date_naive() == detection_day
        });
        if let Some(conflict) = existing {
            return Ok(RecordOutcome::Coalesced(conflict.id));
        }

        let id = ConflictId(inner.next_conflict_id);
        inner.next_conflict_id += 1;
        inner
            .conflicts
            .insert(id, Conflict::from_new(id, new.clone()));

        Ok(RecordOutcome::Recorded(id))
    }

    async fn get_conflict(&self, id: ConflictId) -> Result<Option<Conflict>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.conflicts.get(&id).cloned())
    }

    async fn list_conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<Conflict>> {
        let inner = self.inner.read().unwrap();

        let mut conflicts: Vec<Conflict> = inner
            .conflicts
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();

        // Most recent detection first; id breaks ties deterministically.
        conflicts.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(conflicts)
    }

    async fn count_conflicts(&self, status: ConflictStatus) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .conflicts
            .values()
            .filter(|c| c.status == status)
            .count() as u64)
    }

    async fn resolve_conflict(
        &self,
        id: ConflictId,
        strategy: ResolutionStrategy,
        resolved_payload: &RecordPayload,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        let mut inner = self.inner.write().unwrap();

        let Some(conflict) = inner.conflicts.get_mut(&id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        if conflict.status == ConflictStatus::Resolved {
            return Ok(ResolveOutcome::AlreadyResolved);
        }

        conflict.status = ConflictStatus::Resolved;
        conflict.resolved_at = Some(resolved_at);
        conflict.resolution_strategy = Some(strategy);
        inner.resolved_payloads.insert(id, resolved_payload.clone());

        Ok(ResolveOutcome::Resolved)
    }

    async fn create_run(
        &self,
        mode: RunMode,
        environment: &str,
        targets: &[SourceId],
        started_at: DateTime<Utc>,
    ) -> Result<RunId> {
        let mut inner = self.inner.write().unwrap();

        let id = RunId(inner.next_run_id);
        inner.next_run_id += 1;
        inner.runs.insert(
            id,
            SyncRun {
                id,
                mode,
                environment: environment.to_string(),
                targets: targets.to_vec(),
                started_at,
                completed_at: None,
                status: RunStatus::Running,
                records_processed: 0,
                conflicts_found: 0,
            },
        );

        Ok(id)
    }

    async fn complete_run(
        &self,
        id: RunId,
        status: RunStatus,
        records_processed: u64,
        conflicts_found: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        if let Some(run) = inner.runs.get_mut(&id) {
            run.status = status;
            run.records_processed = records_processed;
            run.conflicts_found = conflicts_found;
            run.completed_at = Some(completed_at);
        }

        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<SyncRun>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.runs.get(&id).cloned())
    }

    async fn last_run(&self) -> Result<Option<SyncRun>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.runs.values().max_by_key(|r| (r.started_at, r.id)).cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
        let inner = self.inner.read().unwrap();

        let mut runs: Vec<SyncRun> = inner.runs.values().cloned().collect();
        runs.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        runs.truncate(limit);
        Ok(runs)
    }

    async fn apply_run_outcome(
        &self,
        date: NaiveDate,
        success_delta: u64,
        conflict_delta: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        let stat = inner
            .stats
            .entry(date)
            .or_insert_with(|| DailyStat::empty(date));
        stat.sync_success += success_delta;
        stat.sync_conflicts += conflict_delta;

        Ok(())
    }

    async fn get_daily_stat(&self, date: NaiveDate) -> Result<Option<DailyStat>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.stats.get(&date).cloned())
    }

    async fn list_daily_stats(&self, limit: usize) -> Result<Vec<DailyStat>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.stats.values().rev().take(limit).cloned().collect())
    }
}
