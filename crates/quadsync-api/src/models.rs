//! Wire models for the HTTP surface.
//!
//! Field names follow what the admin dashboard consumes: conflicts are
//! presented as `table`/`record_id` rows, daily stats as plain
//! `sync_success`/`sync_conflicts` counters, and the status view carries
//! `last_run` as a bare timestamp.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use quadsync_core::{Conflict, DailyStat, RecordPayload, SyncRun};
use quadsync_engine::success_rate;

/// One conflict row as the dashboard shows it.
#[derive(Debug, Serialize)]
pub struct ConflictView {
    pub id: i64,
    pub table: String,
    pub record_id: String,
    pub source: String,
    pub target: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_strategy: Option<String>,
}

impl From<Conflict> for ConflictView {
    fn from(c: Conflict) -> Self {
        Self {
            id: c.id.0,
            table: c.entity_type.as_str().to_string(),
            record_id: c.entity_key.as_str().to_string(),
            source: c.source.as_str().to_string(),
            target: c.target.as_str().to_string(),
            status: c.status.as_str().to_string(),
            created_at: c.detected_at,
            resolved_at: c.resolved_at,
            resolution_strategy: c.resolution_strategy.map(|s| s.as_str().to_string()),
        }
    }
}

/// One sync run for the status view and the run log.
#[derive(Debug, Serialize)]
pub struct RunView {
    pub id: i64,
    pub mode: String,
    pub environment: String,
    pub targets: Vec<String>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: u64,
    pub conflicts_found: u64,
}

impl From<SyncRun> for RunView {
    fn from(r: SyncRun) -> Self {
        Self {
            id: r.id.0,
            mode: r.mode.as_str().to_string(),
            environment: r.environment,
            targets: r.targets.iter().map(|s| s.as_str().to_string()).collect(),
            status: r.status.as_str().to_string(),
            started_at: r.started_at,
            completed_at: r.completed_at,
            records_processed: r.records_processed,
            conflicts_found: r.conflicts_found,
        }
    }
}

/// Daily counters plus the derived success rate.
#[derive(Debug, Serialize)]
pub struct DailyStatView {
    pub date: NaiveDate,
    pub sync_success: u64,
    pub sync_conflicts: u64,
    pub ai_requests: u64,
    pub inventory_changes: u64,
    pub success_rate: f64,
}

impl From<DailyStat> for DailyStatView {
    fn from(s: DailyStat) -> Self {
        let rate = success_rate(&s);
        Self {
            date: s.date,
            sync_success: s.sync_success,
            sync_conflicts: s.sync_conflicts,
            ai_requests: s.ai_requests,
            inventory_changes: s.inventory_changes,
            success_rate: rate,
        }
    }
}

/// GET /sync/status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub targets: Vec<String>,
    pub mode: &'static str,
    pub environment: String,
    /// Open conflicts right now.
    pub conflicts: u64,
    /// When the most recent run finished (or started, while running).
    pub last_run: Option<DateTime<Utc>>,
    pub daily_stat: DailyStatView,
}

/// POST /sync/run response, status 202.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: i64,
}

/// POST /sync/conflicts/{id}/resolve request body.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub strategy: String,
    #[serde(default)]
    pub payload: Option<RecordPayload>,
}

/// GET /sync/conflicts query string.
#[derive(Debug, Default, Deserialize)]
pub struct ConflictsQuery {
    pub status: Option<String>,
}

/// Shared limit parameter for the dashboard lists.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    30
}
