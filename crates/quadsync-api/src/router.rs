//! Router assembly and shared application state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use quadsync_core::SourceId;
use quadsync_engine::{ResolutionService, Scheduler};
use quadsync_store::Store;

use crate::auth::{admin_guard, require_auth, AuthTokens};
use crate::handlers;

/// State shared by all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<Scheduler>,
    pub resolution: Arc<ResolutionService>,
    pub environment: String,
    /// Libraries the engine reconciles, in lexical order.
    pub targets: Vec<SourceId>,
}

/// Assemble the full application router.
///
/// `/health` is open; everything else needs a bearer token, and the
/// mutating sync routes additionally need the admin role.
pub fn app_router(state: ApiState, tokens: Arc<AuthTokens>) -> Router {
    let admin_routes = Router::new()
        .route("/sync/run", post(handlers::trigger_run))
        .route(
            "/sync/conflicts/:id/resolve",
            post(handlers::resolve_conflict),
        )
        .layer(middleware::from_fn(admin_guard));

    let read_routes = Router::new()
        .route("/sync/status", get(handlers::sync_status))
        .route("/sync/conflicts", get(handlers::list_conflicts))
        .route("/dashboard/daily-stats", get(handlers::daily_stats))
        .route("/dashboard/sync-logs", get(handlers::sync_logs));

    let authed = read_routes
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(tokens, require_auth))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(authed)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::AUTHORIZATION, Request, StatusCode};
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use quadsync_core::{
        EntityKey, EntityType, FieldBag, ItemFields, NewConflict, RecordPayload, RunMode,
        RunStatus,
    };
    use quadsync_engine::adapter::memory::{MemoryHub, MemorySource};
    use quadsync_engine::{EngineConfig, SourceAdapter, SyncOrchestrator};
    use quadsync_store::MemoryStore;

    const ADMIN: &str = "admin-token";
    const VIEWER: &str = "viewer-token";

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        mysql: MemorySource,
        sqlite: MemorySource,
    }

    async fn test_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let hub = MemoryHub::new();
        let mysql = hub.create_source(SourceId::new("mysql")).await;
        let sqlite = hub.create_source(SourceId::new("sqlite")).await;
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(mysql.clone()), Arc::new(sqlite.clone())];

        let config = EngineConfig::new("test", SourceId::new("mysql"));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone() as Arc<dyn Store>,
            adapters.clone(),
            config,
        ));
        let targets = orchestrator.targets();
        let state = ApiState {
            store: store.clone() as Arc<dyn Store>,
            scheduler: Arc::new(Scheduler::new(orchestrator)),
            resolution: Arc::new(ResolutionService::new(
                store.clone() as Arc<dyn Store>,
                adapters,
            )),
            environment: "test".into(),
            targets,
        };
        let tokens = Arc::new(AuthTokens::new(ADMIN, Some(VIEWER.into())));
        TestApp {
            router: app_router(state, tokens),
            store,
            mysql,
            sqlite,
        }
    }

    fn get_request(path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_request(path: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn item(price_cents: i64) -> RecordPayload {
        RecordPayload::Item(ItemFields {
            title: "router test item".into(),
            price_cents,
            stock: 1,
            category: "misc".into(),
            tags: Default::default(),
            extra: FieldBag::new(),
        })
    }

    async fn seed_conflict(app: &TestApp) -> i64 {
        let key = EntityKey::new("item-1");
        app.mysql
            .seed(EntityType::Item, key.clone(), item(10_000))
            .await;
        app.sqlite
            .seed(EntityType::Item, key.clone(), item(12_000))
            .await;
        app.store
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
            .0
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let app = test_app().await;
        let response = app.router.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_shape() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(get_request("/sync/status", Some(VIEWER)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["targets"], json!(["mysql", "sqlite"]));
        assert_eq!(body["mode"], "interval");
        assert_eq!(body["environment"], "test");
        assert_eq!(body["conflicts"], 0);
        assert!(body["last_run"].is_null());
        assert_eq!(body["daily_stat"]["success_rate"], 100.0);
    }

    #[tokio::test]
    async fn test_status_last_run_is_completion_timestamp() {
        let app = test_app().await;
        let started = Utc::now();
        let completed = started + chrono::Duration::seconds(42);
        let run_id = app
            .store
            .create_run(
                RunMode::Scheduled,
                "test",
                &[SourceId::new("mysql"), SourceId::new("sqlite")],
                started,
            )
            .await
            .unwrap();
        app.store
            .complete_run(run_id, RunStatus::Succeeded, 10, 0, completed)
            .await
            .unwrap();

        let response = app
            .router
            .oneshot(get_request("/sync/status", Some(VIEWER)))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["last_run"], json!(completed));
    }

    #[tokio::test]
    async fn test_status_requires_token() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(get_request("/sync/status", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_viewer_cannot_trigger_run() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(post_request("/sync/run", VIEWER, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_trigger_run_is_accepted() {
        let app = test_app().await;
        let response = app
            .router
            .clone()
            .oneshot(post_request("/sync/run", ADMIN, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(response).await;
        let run_id = body["run_id"].as_i64().unwrap();
        assert!(app
            .store
            .get_run(quadsync_core::RunId(run_id))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_list_conflicts_wire_format() {
        let app = test_app().await;
        let id = seed_conflict(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(get_request("/sync/conflicts?status=open", Some(VIEWER)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], id);
        assert_eq!(rows[0]["table"], "items");
        assert_eq!(rows[0]["record_id"], "item-1");
        assert_eq!(rows[0]["source"], "mysql");
        assert_eq!(rows[0]["target"], "sqlite");
        assert_eq!(rows[0]["status"], "open");
        assert!(rows[0]["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_bare_conflict_list_shows_only_open() {
        let app = test_app().await;
        let id = seed_conflict(&app).await;
        let resolved = app
            .router
            .clone()
            .oneshot(post_request(
                &format!("/sync/conflicts/{id}/resolve"),
                ADMIN,
                Some(json!({ "strategy": "source" })),
            ))
            .await
            .unwrap();
        assert_eq!(resolved.status(), StatusCode::OK);

        // The dashboard calls the list without a filter and expects
        // only pending work back.
        let response = app
            .router
            .clone()
            .oneshot(get_request("/sync/conflicts", Some(VIEWER)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 0);

        let response = app
            .router
            .oneshot(get_request("/sync/conflicts?status=resolved", Some(VIEWER)))
            .await
            .unwrap();
        let body = body_json(response).await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], id);
    }

    #[tokio::test]
    async fn test_bad_status_filter_is_422() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(get_request("/sync/conflicts?status=weird", Some(VIEWER)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_resolve_conflict_roundtrip() {
        let app = test_app().await;
        let id = seed_conflict(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(post_request(
                &format!("/sync/conflicts/{id}/resolve"),
                ADMIN,
                Some(json!({ "strategy": "source" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "resolved");
        assert_eq!(body["resolution_strategy"], "source");

        // The losing library took the winning value.
        assert_eq!(
            app.sqlite
                .get(EntityType::Item, &EntityKey::new("item-1"))
                .await,
            Some(item(10_000))
        );

        // A second attempt is a conflict, not a repeat.
        let again = app
            .router
            .oneshot(post_request(
                &format!("/sync/conflicts/{id}/resolve"),
                ADMIN,
                Some(json!({ "strategy": "target" })),
            ))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_resolve_unknown_conflict_is_404() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(post_request(
                "/sync/conflicts/999/resolve",
                ADMIN,
                Some(json!({ "strategy": "source" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resolve_with_bad_strategy_is_422() {
        let app = test_app().await;
        let id = seed_conflict(&app).await;
        let response = app
            .router
            .oneshot(post_request(
                &format!("/sync/conflicts/{id}/resolve"),
                ADMIN,
                Some(json!({ "strategy": "newest" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_dashboard_lists() {
        let app = test_app().await;
        let date = Utc::now().date_naive();
        app.store.apply_run_outcome(date, 87, 13).await.unwrap();

        let response = app
            .router
            .clone()
            .oneshot(get_request("/dashboard/daily-stats", Some(VIEWER)))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body[0]["date"], json!(date));
        assert_eq!(body[0]["sync_success"], 87);
        assert_eq!(body[0]["sync_conflicts"], 13);
        assert_eq!(body[0]["success_rate"], 87.0);

        let response = app
            .router
            .oneshot(get_request("/dashboard/sync-logs?limit=5", Some(VIEWER)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
