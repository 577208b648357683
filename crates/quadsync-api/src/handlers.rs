//! Request handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use quadsync_core::{ConflictId, ConflictStatus, DailyStat, EngineError, ResolutionStrategy, RunMode};

use crate::error::ApiError;
use crate::models::{
    ConflictView, ConflictsQuery, DailyStatView, LimitQuery, ResolveRequest, RunView,
    StatusResponse, TriggerResponse,
};
use crate::router::ApiState;

/// Reported sync mode; runs also fire on the interval loop, not only on
/// manual triggers.
const SYNC_MODE: &str = "interval";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /sync/status
pub async fn sync_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let conflicts = state
        .store
        .count_conflicts(ConflictStatus::Open)
        .await
        .map_err(EngineError::from)?;
    let last_run = state.store.last_run().await.map_err(EngineError::from)?;

    let today = Utc::now().date_naive();
    let stat = state
        .store
        .get_daily_stat(today)
        .await
        .map_err(EngineError::from)?
        .unwrap_or_else(|| DailyStat::empty(today));

    Ok(Json(StatusResponse {
        targets: state
            .targets
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        mode: SYNC_MODE,
        environment: state.environment.clone(),
        conflicts,
        last_run: last_run.map(|r| r.completed_at.unwrap_or(r.started_at)),
        daily_stat: DailyStatView::from(stat),
    }))
}

/// GET /sync/conflicts
///
/// Lists open conflicts by default; `?status=` selects a status
/// explicitly.
pub async fn list_conflicts(
    State(state): State<ApiState>,
    Query(query): Query<ConflictsQuery>,
) -> Result<Json<Vec<ConflictView>>, ApiError> {
    let status = match query.status.as_deref() {
        None => ConflictStatus::Open,
        Some(s) => ConflictStatus::parse(s).ok_or_else(|| {
            EngineError::InvalidArgument(format!("unknown conflict status {s:?}"))
        })?,
    };

    let conflicts = state
        .store
        .list_conflicts(Some(status))
        .await
        .map_err(EngineError::from)?;
    Ok(Json(conflicts.into_iter().map(ConflictView::from).collect()))
}

/// POST /sync/run
///
/// Admits a manual run and returns 202 with the run id; the run itself
/// continues in the background. 409 when a run is already in flight.
pub async fn trigger_run(
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let run_id = state.scheduler.trigger(RunMode::Manual).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse { run_id: run_id.0 }),
    ))
}

/// POST /sync/conflicts/{id}/resolve
pub async fn resolve_conflict(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ConflictView>, ApiError> {
    let strategy = ResolutionStrategy::parse(&request.strategy).ok_or_else(|| {
        EngineError::InvalidArgument(format!("unknown strategy {:?}", request.strategy))
    })?;

    let conflict = state
        .resolution
        .resolve(ConflictId(id), strategy, request.payload)
        .await?;
    Ok(Json(ConflictView::from(conflict)))
}

/// GET /dashboard/daily-stats
pub async fn daily_stats(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<DailyStatView>>, ApiError> {
    let stats = state
        .store
        .list_daily_stats(query.limit)
        .await
        .map_err(EngineError::from)?;
    Ok(Json(stats.into_iter().map(DailyStatView::from).collect()))
}

/// GET /dashboard/sync-logs
pub async fn sync_logs(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RunView>>, ApiError> {
    let runs = state
        .store
        .list_runs(query.limit)
        .await
        .map_err(EngineError::from)?;
    Ok(Json(runs.into_iter().map(RunView::from).collect()))
}
