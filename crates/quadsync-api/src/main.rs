//! quadsyncd: the sync engine daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quadsync_api::{app_router, ApiConfig, ApiState, AuthTokens};
use quadsync_engine::{
    EngineConfig, ResolutionService, Scheduler, SourceAdapter, SqliteSource, SyncOrchestrator,
};
use quadsync_store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env()?;
    info!(
        environment = %config.environment,
        db = %config.db_path.display(),
        libraries = ?config.libraries,
        "starting quadsyncd"
    );

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?,
    );

    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for library in &config.libraries {
        let path = config.library_dir.join(format!("{library}.db"));
        let adapter = SqliteSource::open(library.clone(), &path)
            .with_context(|| format!("opening library file {}", path.display()))?;
        adapters.push(Arc::new(adapter));
    }

    let mut engine_config = EngineConfig::new(config.environment.clone(), config.primary.clone());
    engine_config.interval = config.interval;
    engine_config.fetch_timeout = config.fetch_timeout;

    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&store),
        adapters.clone(),
        engine_config,
    ));
    let targets = orchestrator.targets();

    let scheduler = Arc::new(Scheduler::new(Arc::clone(&orchestrator)));
    tokio::spawn(Arc::clone(&scheduler).run_interval_loop(config.interval));

    let resolution = Arc::new(ResolutionService::new(Arc::clone(&store), adapters));

    let state = ApiState {
        store,
        scheduler,
        resolution,
        environment: config.environment.clone(),
        targets,
    };
    let tokens = Arc::new(AuthTokens::new(
        config.admin_token.clone(),
        config.viewer_token.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %config.bind, "listening");

    axum::serve(listener, app_router(state, tokens))
        .await
        .context("server exited")?;

    Ok(())
}
