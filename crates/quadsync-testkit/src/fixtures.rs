//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a full engine wired to an
//! in-memory store and a network of in-memory libraries.

use std::collections::BTreeMap;
use std::sync::Arc;

use quadsync_core::{
    EntityKey, EntityType, FieldBag, ItemFields, OrderFields, RecordPayload, SourceId, UserFields,
};
use quadsync_engine::adapter::memory::{MemoryHub, MemorySource};
use quadsync_engine::{
    EngineConfig, ResolutionService, Scheduler, SourceAdapter, SyncOrchestrator,
};
use quadsync_store::{MemoryStore, Store};

/// A complete engine over in-memory libraries.
pub struct SyncFixture {
    pub store: Arc<MemoryStore>,
    pub sources: BTreeMap<SourceId, MemorySource>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub resolution: Arc<ResolutionService>,
}

impl SyncFixture {
    /// Wire up an engine over the named libraries. The first name is the
    /// primary.
    pub async fn new(names: &[&str]) -> Self {
        Self::with_config(names, EngineConfig::new("test", SourceId::new(names[0]))).await
    }

    pub async fn with_config(names: &[&str], config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = MemoryHub::new();

        let mut sources = BTreeMap::new();
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for name in names {
            let id = SourceId::new(name);
            let source = hub.create_source(id.clone()).await;
            adapters.push(Arc::new(source.clone()));
            sources.insert(id, source);
        }

        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone() as Arc<dyn Store>,
            adapters.clone(),
            config,
        ));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&orchestrator)));
        let resolution = Arc::new(ResolutionService::new(
            store.clone() as Arc<dyn Store>,
            adapters,
        ));

        Self {
            store,
            sources,
            orchestrator,
            scheduler,
            resolution,
        }
    }

    /// The stock four-library layout with mysql as primary.
    pub async fn four_libraries() -> Self {
        Self::new(&["mysql", "mariadb", "postgres", "sqlite"]).await
    }

    /// Handle to one library.
    ///
    /// # Panics
    ///
    /// Panics if the library was not part of the fixture.
    pub fn source(&self, name: &str) -> &MemorySource {
        self.sources
            .get(&SourceId::new(name))
            .unwrap_or_else(|| panic!("no library named {name} in fixture"))
    }

    /// Seed the same payload into every library.
    pub async fn seed_everywhere(
        &self,
        entity_type: EntityType,
        key: impl Into<String>,
        payload: RecordPayload,
    ) {
        let key = EntityKey::new(key.into());
        for source in self.sources.values() {
            source.seed(entity_type, key.clone(), payload.clone()).await;
        }
    }

    /// Seed one library only.
    pub async fn seed_one(
        &self,
        library: &str,
        entity_type: EntityType,
        key: impl Into<String>,
        payload: RecordPayload,
    ) {
        self.source(library)
            .seed(entity_type, EntityKey::new(key.into()), payload)
            .await;
    }
}

/// An item payload with sensible defaults.
pub fn item_payload(title: &str, price_cents: i64) -> RecordPayload {
    RecordPayload::Item(ItemFields {
        title: title.to_string(),
        price_cents,
        stock: 1,
        category: "general".to_string(),
        tags: Default::default(),
        extra: FieldBag::new(),
    })
}

/// An order payload with sensible defaults.
pub fn order_payload(buyer: &str, item_key: &str, total_cents: i64) -> RecordPayload {
    RecordPayload::Order(OrderFields {
        buyer: buyer.to_string(),
        item_key: item_key.to_string(),
        quantity: 1,
        total_cents,
        state: "paid".to_string(),
        extra: FieldBag::new(),
    })
}

/// A user payload with sensible defaults.
pub fn user_payload(username: &str, role: &str) -> RecordPayload {
    RecordPayload::User(UserFields {
        username: username.to_string(),
        email: format!("{username}@campus.edu"),
        role: role.to_string(),
        extra: FieldBag::new(),
    })
}
