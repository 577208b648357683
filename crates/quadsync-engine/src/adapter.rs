//! Source adapter abstraction.
//!
//! An adapter wraps one of the synchronized libraries and presents its rows
//! as normalized canonical records. Implementations exist for standalone
//! SQLite library files and for an in-memory double used in tests.

use async_trait::async_trait;

use quadsync_core::{CanonicalRecord, EntityKey, EntityType, RecordPayload, Result, SourceId};

/// Adapter for one synchronized library.
///
/// Implementations must be thread-safe (Send + Sync). `fetch` returns the
/// library's full view of one entity type; `apply` writes a winning value
/// back during conflict resolution.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The library this adapter fronts.
    fn source_id(&self) -> &SourceId;

    /// Fetch all records of one entity type, normalized.
    ///
    /// Fails with `SourceUnavailable` when the library cannot be reached;
    /// the orchestrator excludes the source from that snapshot instead of
    /// aborting the run.
    async fn fetch(&self, entity_type: EntityType) -> Result<Vec<CanonicalRecord>>;

    /// Write a winning payload back to the library, upserting by key.
    ///
    /// Fails with `SourceRejected` when the library's own validation
    /// refuses the value.
    async fn apply(
        &self,
        entity_type: EntityType,
        entity_key: &EntityKey,
        payload: &RecordPayload,
    ) -> Result<()>;
}

/// A simple in-memory source network for testing.
///
/// Each source is a shared table of payloads with injectable failure modes.
pub mod memory {
    use super::*;
    use quadsync_core::EngineError;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Mutable state behind one memory source.
    struct SourceState {
        records: RwLock<BTreeMap<(EntityType, EntityKey), RecordPayload>>,
        unreachable: AtomicBool,
        rejecting: AtomicBool,
    }

    impl SourceState {
        fn new() -> Self {
            Self {
                records: RwLock::new(BTreeMap::new()),
                unreachable: AtomicBool::new(false),
                rejecting: AtomicBool::new(false),
            }
        }
    }

    /// Shared registry of memory sources.
    ///
    /// Tests create sources through the hub and keep the returned handles
    /// to seed data and flip failure modes mid-test.
    pub struct MemoryHub {
        sources: RwLock<HashMap<SourceId, Arc<SourceState>>>,
    }

    impl MemoryHub {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                sources: RwLock::new(HashMap::new()),
            })
        }

        /// Create a source registered with this hub.
        pub async fn create_source(self: &Arc<Self>, id: SourceId) -> MemorySource {
            let state = Arc::new(SourceState::new());
            self.sources.write().await.insert(id.clone(), state.clone());
            MemorySource { id, state }
        }

        /// Another handle to an existing source, if registered.
        pub async fn handle(&self, id: &SourceId) -> Option<MemorySource> {
            let sources = self.sources.read().await;
            sources.get(id).map(|state| MemorySource {
                id: id.clone(),
                state: Arc::clone(state),
            })
        }
    }

    /// In-memory source implementation.
    #[derive(Clone)]
    pub struct MemorySource {
        id: SourceId,
        state: Arc<SourceState>,
    }

    impl MemorySource {
        /// Put a payload into the source's table directly, bypassing the
        /// adapter interface and its failure modes.
        pub async fn seed(
            &self,
            entity_type: EntityType,
            entity_key: EntityKey,
            payload: RecordPayload,
        ) {
            self.state
                .records
                .write()
                .await
                .insert((entity_type, entity_key), payload);
        }

        /// Read one payload back, for assertions.
        pub async fn get(
            &self,
            entity_type: EntityType,
            entity_key: &EntityKey,
        ) -> Option<RecordPayload> {
            self.state
                .records
                .read()
                .await
                .get(&(entity_type, entity_key.clone()))
                .cloned()
        }

        /// Simulate the library being down. Fetches and writes fail with
        /// `SourceUnavailable` until cleared.
        pub fn set_unreachable(&self, unreachable: bool) {
            self.state.unreachable.store(unreachable, Ordering::SeqCst);
        }

        /// Simulate the library refusing writes with `SourceRejected`.
        pub fn set_rejecting(&self, rejecting: bool) {
            self.state.rejecting.store(rejecting, Ordering::SeqCst);
        }

        fn check_reachable(&self) -> Result<()> {
            if self.state.unreachable.load(Ordering::SeqCst) {
                return Err(EngineError::SourceUnavailable {
                    library: self.id.clone(),
                    reason: "connection refused".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SourceAdapter for MemorySource {
        fn source_id(&self) -> &SourceId {
            &self.id
        }

        async fn fetch(&self, entity_type: EntityType) -> Result<Vec<CanonicalRecord>> {
            self.check_reachable()?;
            let records = self.state.records.read().await;
            Ok(records
                .iter()
                .filter(|((et, _), _)| *et == entity_type)
                .map(|((_, key), payload)| CanonicalRecord {
                    entity_type,
                    entity_key: key.clone(),
                    source_id: self.id.clone(),
                    payload: payload.clone(),
                    version_tag: None,
                    observed_at: chrono::Utc::now(),
                })
                .collect())
        }

        async fn apply(
            &self,
            entity_type: EntityType,
            entity_key: &EntityKey,
            payload: &RecordPayload,
        ) -> Result<()> {
            self.check_reachable()?;
            if self.state.rejecting.load(Ordering::SeqCst) {
                return Err(EngineError::SourceRejected {
                    library: self.id.clone(),
                    reason: "constraint violation".into(),
                });
            }
            self.state
                .records
                .write()
                .await
                .insert((entity_type, entity_key.clone()), payload.clone());
            Ok(())
        }
    }
}
