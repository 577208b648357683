//! Store trait: the abstract interface for conflict, run, and stat
//! persistence.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use quadsync_core::{
    Conflict, ConflictId, ConflictStatus, DailyStat, NewConflict, RecordPayload,
    ResolutionStrategy, RunId, RunMode, RunStatus, SourceId, SyncRun,
};

use crate::error::Result;

/// Result of recording a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new conflict row was created.
    Recorded(ConflictId),
    /// An open conflict with the same identity already exists for this
    /// detection day; no new row (idempotent - not an error).
    Coalesced(ConflictId),
}

impl RecordOutcome {
    /// The id of the conflict row, new or existing.
    pub fn id(&self) -> ConflictId {
        match self {
            RecordOutcome::Recorded(id) | RecordOutcome::Coalesced(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

/// Result of attempting to close a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The conflict transitioned open → resolved.
    Resolved,
    /// No conflict with that id.
    NotFound,
    /// The conflict was already resolved (benign idempotent-retry signal).
    AlreadyResolved,
}

/// The Store trait: async interface for engine persistence.
///
/// All methods are async to support both blocking (SQLite) and in-memory
/// backends. For SQLite, `spawn_blocking` is used internally to avoid
/// blocking the runtime.
///
/// # Design Notes
///
/// - **Coalescing record**: an open conflict with identical
///   `(entity_type, entity_key, source, target, detection day)` absorbs a
///   re-detection instead of duplicating; the check-then-insert is a
///   single critical section.
/// - **One-shot resolve**: the resolution fields are set exactly once;
///   a second attempt observes `AlreadyResolved`.
/// - **Ownership**: conflicts, runs, and daily stats are each written only
///   through this interface; nothing mutates them from outside.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────
    // Conflict Operations
    // ─────────────────────────────────────────────────────────────────────

    /// Record a detected conflict, coalescing with a matching open one.
    async fn record_conflict(&self, new: &NewConflict) -> Result<RecordOutcome>;

    /// Get a conflict by id.
    async fn get_conflict(&self, id: ConflictId) -> Result<Option<Conflict>>;

    /// List conflicts, optionally filtered by status, most recent
    /// `detected_at` first.
    async fn list_conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<Conflict>>;

    /// Count conflicts in the given status.
    async fn count_conflicts(&self, status: ConflictStatus) -> Result<u64>;

    /// Close a conflict, recording the strategy, the winning payload, and
    /// the resolution time. The payload is kept for audit only.
    async fn resolve_conflict(
        &self,
        id: ConflictId,
        strategy: ResolutionStrategy,
        resolved_payload: &RecordPayload,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome>;

    // ─────────────────────────────────────────────────────────────────────
    // Run History
    // ─────────────────────────────────────────────────────────────────────

    /// Create a run row in the `Running` state and allocate its id.
    async fn create_run(
        &self,
        mode: RunMode,
        environment: &str,
        targets: &[SourceId],
        started_at: DateTime<Utc>,
    ) -> Result<RunId>;

    /// Move a run to a terminal status and record its counters.
    async fn complete_run(
        &self,
        id: RunId,
        status: RunStatus,
        records_processed: u64,
        conflicts_found: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Get a run by id.
    async fn get_run(&self, id: RunId) -> Result<Option<SyncRun>>;

    /// The most recently started run, if any.
    async fn last_run(&self) -> Result<Option<SyncRun>>;

    /// Run history, most recently started first.
    async fn list_runs(&self, limit: usize) -> Result<Vec<SyncRun>>;

    // ─────────────────────────────────────────────────────────────────────
    // Daily Stats
    // ─────────────────────────────────────────────────────────────────────

    /// Additively upsert the sync counters for a date, creating the row if
    /// absent. The AI and inventory counters are left untouched; the sync
    /// engine never produces them.
    async fn apply_run_outcome(
        &self,
        date: NaiveDate,
        success_delta: u64,
        conflict_delta: u64,
    ) -> Result<()>;

    /// Get the stat row for a date.
    async fn get_daily_stat(&self, date: NaiveDate) -> Result<Option<DailyStat>>;

    /// Stat rows, most recent date first.
    async fn list_daily_stats(&self, limit: usize) -> Result<Vec<DailyStat>>;
}
