//! The sync orchestrator: one full reconciliation pass over all libraries.
//!
//! A run fetches every entity type from every reachable library
//! concurrently, diffs the snapshot per entity type, persists the resulting
//! conflicts (coalescing repeats), and finishes by writing the run row and
//! the daily counters exactly once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use quadsync_core::{
    diff_entity_type, CanonicalRecord, EngineError, EntityType, Result, RunId, RunMode, RunStatus,
    SourceId,
};
use quadsync_store::Store;

use crate::adapter::SourceAdapter;
use crate::config::EngineConfig;
use crate::stats::StatsAggregator;

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Distinct entity keys seen, summed over entity types.
    pub records_processed: u64,
    /// Keys that produced at least one divergence.
    pub conflicts_found: u64,
    /// Conflict rows created this run.
    pub new_conflicts: u64,
    /// Divergences absorbed by an existing open conflict.
    pub coalesced_conflicts: u64,
    /// Libraries that could not be reached at any point of the run.
    pub unreachable: Vec<SourceId>,
}

/// Drives reconciliation runs against a set of source adapters.
pub struct SyncOrchestrator {
    store: Arc<dyn Store>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    stats: StatsAggregator,
    config: EngineConfig,
}

impl SyncOrchestrator {
    /// Adapters are kept in lexical source order so run targets and fetch
    /// scheduling are deterministic.
    pub fn new(
        store: Arc<dyn Store>,
        mut adapters: Vec<Arc<dyn SourceAdapter>>,
        config: EngineConfig,
    ) -> Self {
        adapters.sort_by(|a, b| a.source_id().cmp(b.source_id()));
        Self {
            stats: StatsAggregator::new(Arc::clone(&store)),
            store,
            adapters,
            config,
        }
    }

    /// The libraries this orchestrator reconciles, in lexical order.
    pub fn targets(&self) -> Vec<SourceId> {
        self.adapters
            .iter()
            .map(|a| a.source_id().clone())
            .collect()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the run row in the `Running` state and allocate its id.
    ///
    /// Split from [`run_to_completion`] so callers can hand the id back
    /// before the heavy part starts.
    pub async fn begin(&self, mode: RunMode) -> Result<RunId> {
        let run_id = self
            .store
            .create_run(mode, &self.config.environment, &self.targets(), Utc::now())
            .await?;
        info!(run_id = %run_id, mode = mode.as_str(), "sync run admitted");
        Ok(run_id)
    }

    /// Execute a previously admitted run through to its terminal status.
    pub async fn run_to_completion(&self, run_id: RunId) -> Result<RunReport> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("run {run_id} vanished")))?;

        let mut records_processed = 0u64;
        let mut conflicts_found = 0u64;
        let mut new_conflicts = 0u64;
        let mut coalesced_conflicts = 0u64;
        let mut ever_reachable: BTreeSet<SourceId> = BTreeSet::new();

        for entity_type in EntityType::ALL {
            let snapshot = self.fetch_snapshot(entity_type).await;
            ever_reachable.extend(snapshot.keys().cloned());

            let outcome = diff_entity_type(
                entity_type,
                &snapshot,
                &self.config.primary,
                self.config.policy_for(entity_type),
                Utc::now(),
            );
            debug!(
                entity_type = %entity_type,
                keys = outcome.keys_processed,
                conflicted = outcome.conflicted_keys,
                "entity type diffed"
            );

            records_processed += outcome.keys_processed;
            conflicts_found += outcome.conflicted_keys;

            for conflict in &outcome.conflicts {
                let recorded = self.store.record_conflict(conflict).await?;
                if recorded.is_new() {
                    new_conflicts += 1;
                } else {
                    coalesced_conflicts += 1;
                }
            }
        }

        // A run only fails outright when no library answered at all; a
        // partial outage degrades the snapshot instead.
        let status = if ever_reachable.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        self.store
            .complete_run(
                run_id,
                status,
                records_processed,
                conflicts_found,
                Utc::now(),
            )
            .await?;

        self.stats
            .record_run_outcome(
                run.started_at.date_naive(),
                records_processed,
                conflicts_found,
            )
            .await?;

        let unreachable: Vec<SourceId> = self
            .targets()
            .into_iter()
            .filter(|s| !ever_reachable.contains(s))
            .collect();

        info!(
            run_id = %run_id,
            status = status.as_str(),
            records = records_processed,
            conflicts = conflicts_found,
            coalesced = coalesced_conflicts,
            "sync run finished"
        );

        Ok(RunReport {
            run_id,
            status,
            records_processed,
            conflicts_found,
            new_conflicts,
            coalesced_conflicts,
            unreachable,
        })
    }

    /// Admit and execute a run in one call. Used by tests and one-shot
    /// invocations; the scheduler splits the two phases instead.
    pub async fn run_once(&self, mode: RunMode) -> Result<RunReport> {
        let run_id = self.begin(mode).await?;
        self.run_to_completion(run_id).await
    }

    /// Fetch one entity type from every adapter concurrently.
    ///
    /// Sources that fail or time out are logged and left out of the
    /// snapshot, so the differ never mistakes their silence for absence.
    async fn fetch_snapshot(
        &self,
        entity_type: EntityType,
    ) -> BTreeMap<SourceId, Vec<CanonicalRecord>> {
        let mut tasks = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let source = adapter.source_id().clone();
            let timeout = self.config.fetch_timeout;
            tasks.push((
                source,
                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, adapter.fetch(entity_type)).await {
                        Ok(result) => result,
                        Err(_) => Err(EngineError::SourceUnavailable {
                            library: adapter.source_id().clone(),
                            reason: format!("fetch timed out after {timeout:?}"),
                        }),
                    }
                }),
            ));
        }

        let mut snapshot = BTreeMap::new();
        for (source, task) in tasks {
            match task.await {
                Ok(Ok(records)) => {
                    snapshot.insert(source, records);
                }
                Ok(Err(e)) => {
                    warn!(
                        source = %source,
                        entity_type = %entity_type,
                        error = %e,
                        "source fetch failed; excluded from snapshot"
                    );
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "fetch task aborted");
                }
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::{MemoryHub, MemorySource};
    use quadsync_core::{ConflictStatus, EntityKey, FieldBag, ItemFields, RecordPayload};
    use quadsync_store::MemoryStore;

    fn item(price_cents: i64) -> RecordPayload {
        RecordPayload::Item(ItemFields {
            title: "graphing calculator".into(),
            price_cents,
            stock: 1,
            category: "electronics".into(),
            tags: Default::default(),
            extra: FieldBag::new(),
        })
    }

    async fn fixture(names: &[&str]) -> (Arc<MemoryStore>, Vec<MemorySource>, SyncOrchestrator) {
        let store = Arc::new(MemoryStore::new());
        let hub = MemoryHub::new();
        let mut sources = Vec::new();
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for name in names {
            let source = hub.create_source(SourceId::new(name)).await;
            adapters.push(Arc::new(source.clone()));
            sources.push(source);
        }
        let config = EngineConfig::new("test", SourceId::new(names[0]));
        let orchestrator =
            SyncOrchestrator::new(store.clone() as Arc<dyn Store>, adapters, config);
        (store, sources, orchestrator)
    }

    #[tokio::test]
    async fn test_agreeing_sources_clean_run() {
        let (store, sources, orchestrator) = fixture(&["mysql", "postgres", "sqlite"]).await;
        for source in &sources {
            source
                .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
                .await;
        }

        let report = orchestrator.run_once(RunMode::Manual).await.unwrap();
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.records_processed, 1);
        assert_eq!(report.conflicts_found, 0);
        assert_eq!(
            store.count_conflicts(ConflictStatus::Open).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_divergence_recorded_once_per_target() {
        let (store, sources, orchestrator) = fixture(&["mysql", "postgres", "sqlite"]).await;
        sources[0]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
            .await;
        sources[1]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
            .await;
        sources[2]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(120))
            .await;

        let report = orchestrator.run_once(RunMode::Manual).await.unwrap();
        assert_eq!(report.conflicts_found, 1);
        assert_eq!(report.new_conflicts, 1);

        let open = store.list_conflicts(Some(ConflictStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].source, SourceId::new("mysql"));
        assert_eq!(open[0].target, SourceId::new("sqlite"));
    }

    #[tokio::test]
    async fn test_rerun_coalesces_same_divergence() {
        let (store, sources, orchestrator) = fixture(&["mysql", "postgres"]).await;
        sources[0]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
            .await;
        sources[1]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(150))
            .await;

        let first = orchestrator.run_once(RunMode::Manual).await.unwrap();
        let second = orchestrator.run_once(RunMode::Manual).await.unwrap();

        assert_eq!(first.new_conflicts, 1);
        assert_eq!(second.new_conflicts, 0);
        assert_eq!(second.coalesced_conflicts, 1);
        assert_eq!(
            store.count_conflicts(ConflictStatus::Open).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_partial_outage_still_succeeds() {
        let (_store, sources, orchestrator) = fixture(&["mysql", "postgres", "sqlite"]).await;
        sources[0]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
            .await;
        sources[1]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
            .await;
        // sqlite down; its missing key must not count as divergence even
        // under RequireAll.
        sources[2].set_unreachable(true);

        let report = orchestrator.run_once(RunMode::Scheduled).await.unwrap();
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.conflicts_found, 0);
        assert_eq!(report.unreachable, vec![SourceId::new("sqlite")]);
    }

    #[tokio::test]
    async fn test_total_outage_fails_run() {
        let (store, sources, orchestrator) = fixture(&["mysql", "postgres"]).await;
        for source in &sources {
            source.set_unreachable(true);
        }

        let report = orchestrator.run_once(RunMode::Scheduled).await.unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.records_processed, 0);

        let run = store.get_run(report.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_run_updates_daily_counters_once() {
        let (store, sources, orchestrator) = fixture(&["mysql", "postgres"]).await;
        sources[0]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
            .await;
        sources[0]
            .seed(EntityType::Item, EntityKey::new("item-2"), item(200))
            .await;
        sources[1]
            .seed(EntityType::Item, EntityKey::new("item-1"), item(100))
            .await;
        sources[1]
            .seed(EntityType::Item, EntityKey::new("item-2"), item(999))
            .await;

        let report = orchestrator.run_once(RunMode::Manual).await.unwrap();
        assert_eq!(report.records_processed, 2);
        assert_eq!(report.conflicts_found, 1);

        let run = store.get_run(report.run_id).await.unwrap().unwrap();
        let stat = store
            .get_daily_stat(run.started_at.date_naive())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stat.sync_success, 1);
        assert_eq!(stat.sync_conflicts, 1);
    }
}
