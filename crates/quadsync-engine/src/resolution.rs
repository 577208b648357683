//! Conflict resolution.
//!
//! Resolving a conflict picks a winning payload, pushes it to the losing
//! library (or both, for manual values), and closes the conflict row. The
//! write-back happens before the row closes, so a failed push leaves the
//! conflict open for a retry.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use quadsync_core::{
    Conflict, ConflictId, EngineError, RecordPayload, ResolutionStrategy, Result, SourceId,
};
use quadsync_store::{ResolveOutcome, Store};

use crate::adapter::SourceAdapter;

/// Applies resolution decisions to conflicts.
pub struct ResolutionService {
    store: Arc<dyn Store>,
    adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter>>,
    /// Serializes resolution attempts. Resolutions are rare admin actions;
    /// a coarse lock keeps the read-write-close sequence atomic without
    /// per-conflict bookkeeping.
    op_lock: Mutex<()>,
}

impl ResolutionService {
    pub fn new(store: Arc<dyn Store>, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|a| (a.source_id().clone(), a))
            .collect();
        Self {
            store,
            adapters,
            op_lock: Mutex::new(()),
        }
    }

    /// Resolve one conflict with the given strategy.
    ///
    /// `manual_payload` is required for `Manual` and rejected otherwise.
    /// Returns the closed conflict row. Concurrent attempts on the same
    /// conflict serialize; the loser observes `AlreadyResolved`.
    pub async fn resolve(
        &self,
        id: ConflictId,
        strategy: ResolutionStrategy,
        manual_payload: Option<RecordPayload>,
    ) -> Result<Conflict> {
        if strategy != ResolutionStrategy::Manual && manual_payload.is_some() {
            return Err(EngineError::InvalidArgument(
                "a payload is only accepted with the manual strategy".into(),
            ));
        }

        let _guard = self.op_lock.lock().await;

        let conflict = self
            .store
            .get_conflict(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        if !conflict.is_open() {
            return Err(EngineError::AlreadyResolved(id));
        }

        let (winner, writes) = self.plan(&conflict, strategy, manual_payload)?;

        for (side, recorded) in writes {
            // `recorded` is the payload captured when the conflict was
            // detected, not the library's live value. When a manual value
            // matches one side's recorded payload that side needs no write;
            // a stale skip is harmless because `apply` is an upsert and the
            // next run re-detects any remaining divergence.
            if recorded.as_ref() == Some(&winner) {
                debug!(conflict_id = %id, side = %side, "recorded payload already matches winner");
                continue;
            }
            let adapter = self.adapters.get(&side).ok_or_else(|| {
                EngineError::Internal(format!("no adapter registered for library {side}"))
            })?;
            adapter
                .apply(conflict.entity_type, &conflict.entity_key, &winner)
                .await?;
        }

        match self
            .store
            .resolve_conflict(id, strategy, &winner, Utc::now())
            .await?
        {
            ResolveOutcome::Resolved => {}
            ResolveOutcome::NotFound => return Err(EngineError::NotFound(id)),
            ResolveOutcome::AlreadyResolved => return Err(EngineError::AlreadyResolved(id)),
        }

        info!(
            conflict_id = %id,
            strategy = strategy.as_str(),
            entity_key = %conflict.entity_key,
            "conflict resolved"
        );

        self.store
            .get_conflict(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Decide the winning payload and which sides need the write-back.
    ///
    /// Each write is paired with the payload recorded for that side at
    /// detection time so callers can skip sides that already agreed then.
    #[allow(clippy::type_complexity)]
    fn plan(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
        manual_payload: Option<RecordPayload>,
    ) -> Result<(RecordPayload, Vec<(SourceId, Option<RecordPayload>)>)> {
        match strategy {
            ResolutionStrategy::Source => {
                let winner = conflict.source_payload.clone().ok_or_else(|| {
                    EngineError::InvalidArgument(
                        "source side holds no record; choose target or supply a manual value"
                            .into(),
                    )
                })?;
                Ok((
                    winner,
                    vec![(conflict.target.clone(), conflict.target_payload.clone())],
                ))
            }
            ResolutionStrategy::Target => {
                let winner = conflict.target_payload.clone().ok_or_else(|| {
                    EngineError::InvalidArgument(
                        "target side holds no record; choose source or supply a manual value"
                            .into(),
                    )
                })?;
                Ok((
                    winner,
                    vec![(conflict.source.clone(), conflict.source_payload.clone())],
                ))
            }
            ResolutionStrategy::Manual => {
                let winner = manual_payload.ok_or_else(|| {
                    EngineError::InvalidArgument("manual resolution requires a payload".into())
                })?;
                if !winner.matches(conflict.entity_type) {
                    return Err(EngineError::InvalidArgument(format!(
                        "manual payload does not match entity type {}",
                        conflict.entity_type
                    )));
                }
                Ok((
                    winner,
                    vec![
                        (conflict.source.clone(), conflict.source_payload.clone()),
                        (conflict.target.clone(), conflict.target_payload.clone()),
                    ],
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::{MemoryHub, MemorySource};
    use quadsync_core::{ConflictStatus, EntityKey, EntityType, FieldBag, ItemFields, NewConflict};
    use quadsync_store::MemoryStore;

    fn item(price_cents: i64) -> RecordPayload {
        RecordPayload::Item(ItemFields {
            title: "desk".into(),
            price_cents,
            stock: 1,
            category: "furniture".into(),
            tags: Default::default(),
            extra: FieldBag::new(),
        })
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        mysql: MemorySource,
        sqlite: MemorySource,
        service: Arc<ResolutionService>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let hub = MemoryHub::new();
        let mysql = hub.create_source(SourceId::new("mysql")).await;
        let sqlite = hub.create_source(SourceId::new("sqlite")).await;
        let service = Arc::new(ResolutionService::new(
            store.clone() as Arc<dyn Store>,
            vec![Arc::new(mysql.clone()), Arc::new(sqlite.clone())],
        ));
        Fixture {
            store,
            mysql,
            sqlite,
            service,
        }
    }

    /// Seed both libraries with diverging values and record the conflict.
    async fn seed_conflict(fx: &Fixture) -> ConflictId {
        let key = EntityKey::new("item-1");
        fx.mysql
            .seed(EntityType::Item, key.clone(), item(10_000))
            .await;
        fx.sqlite
            .seed(EntityType::Item, key.clone(), item(12_000))
            .await;
        fx.store
            .record_conflict(&NewConflict {
                entity_type: EntityType::Item,
                entity_key: key,
                source: SourceId::new("mysql"),
                target: SourceId::new("sqlite"),
                source_payload: Some(item(10_000)),
                target_payload: Some(item(12_000)),
                detected_at: Utc::now(),
            })
            .await
            .unwrap()
            .id()
    }

    #[tokio::test]
    async fn test_source_strategy_pushes_to_target() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;

        let resolved = fx
            .service
            .resolve(id, ResolutionStrategy::Source, None)
            .await
            .unwrap();

        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(
            resolved.resolution_strategy,
            Some(ResolutionStrategy::Source)
        );
        // The losing library now holds the primary's value.
        assert_eq!(
            fx.sqlite
                .get(EntityType::Item, &EntityKey::new("item-1"))
                .await,
            Some(item(10_000))
        );
        // The winning side is untouched.
        assert_eq!(
            fx.mysql
                .get(EntityType::Item, &EntityKey::new("item-1"))
                .await,
            Some(item(10_000))
        );
    }

    #[tokio::test]
    async fn test_target_strategy_pushes_to_source() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;

        fx.service
            .resolve(id, ResolutionStrategy::Target, None)
            .await
            .unwrap();

        assert_eq!(
            fx.mysql
                .get(EntityType::Item, &EntityKey::new("item-1"))
                .await,
            Some(item(12_000))
        );
    }

    #[tokio::test]
    async fn test_manual_strategy_pushes_to_both() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;

        fx.service
            .resolve(id, ResolutionStrategy::Manual, Some(item(11_000)))
            .await
            .unwrap();

        let key = EntityKey::new("item-1");
        assert_eq!(
            fx.mysql.get(EntityType::Item, &key).await,
            Some(item(11_000))
        );
        assert_eq!(
            fx.sqlite.get(EntityType::Item, &key).await,
            Some(item(11_000))
        );
    }

    #[tokio::test]
    async fn test_manual_skips_side_with_matching_recorded_payload() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;
        // mysql's recorded payload already equals the manual value, so the
        // service never writes to it; a rejecting mysql proves the skip.
        fx.mysql.set_rejecting(true);

        fx.service
            .resolve(id, ResolutionStrategy::Manual, Some(item(10_000)))
            .await
            .unwrap();

        let key = EntityKey::new("item-1");
        assert_eq!(
            fx.sqlite.get(EntityType::Item, &key).await,
            Some(item(10_000))
        );
        let conflict = fx.store.get_conflict(id).await.unwrap().unwrap();
        assert_eq!(conflict.status, ConflictStatus::Resolved);
    }

    #[tokio::test]
    async fn test_second_resolve_sees_already_resolved() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;

        fx.service
            .resolve(id, ResolutionStrategy::Source, None)
            .await
            .unwrap();
        let err = fx
            .service
            .resolve(id, ResolutionStrategy::Target, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyResolved(c) if c == id));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_serialize() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;

        let a = {
            let service = Arc::clone(&fx.service);
            tokio::spawn(async move { service.resolve(id, ResolutionStrategy::Source, None).await })
        };
        let b = {
            let service = Arc::clone(&fx.service);
            tokio::spawn(async move { service.resolve(id, ResolutionStrategy::Source, None).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let already = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::AlreadyResolved(_))))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(already, 1);
    }

    #[tokio::test]
    async fn test_unknown_conflict_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .service
            .resolve(ConflictId(999), ResolutionStrategy::Source, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_manual_without_payload_is_invalid() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;
        let err = fx
            .service
            .resolve(id, ResolutionStrategy::Manual, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_payload_with_source_strategy_is_invalid() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;
        let err = fx
            .service
            .resolve(id, ResolutionStrategy::Source, Some(item(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        // The conflict is untouched.
        let conflict = fx.store.get_conflict(id).await.unwrap().unwrap();
        assert!(conflict.is_open());
    }

    #[tokio::test]
    async fn test_failed_write_back_leaves_conflict_open() {
        let fx = fixture().await;
        let id = seed_conflict(&fx).await;
        fx.sqlite.set_rejecting(true);

        let err = fx
            .service
            .resolve(id, ResolutionStrategy::Source, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SourceRejected { .. }));

        let conflict = fx.store.get_conflict(id).await.unwrap().unwrap();
        assert!(conflict.is_open());

        // Retry succeeds once the library accepts writes again.
        fx.sqlite.set_rejecting(false);
        fx.service
            .resolve(id, ResolutionStrategy::Source, None)
            .await
            .unwrap();
    }
}
