//! Process configuration from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use quadsync_core::SourceId;

/// The four libraries a stock deployment reconciles.
pub const DEFAULT_LIBRARIES: [&str; 4] = ["mariadb", "mysql", "postgres", "sqlite"];

/// Configuration for the quadsyncd process, read from `QUADSYNC_*`
/// environment variables (a `.env` file is honored in development).
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub bind: SocketAddr,
    pub environment: String,
    /// Path of the engine's own database (conflicts, runs, stats).
    pub db_path: PathBuf,
    /// Directory holding one SQLite file per library (`<name>.db`).
    pub library_dir: PathBuf,
    pub libraries: Vec<SourceId>,
    pub primary: SourceId,
    pub admin_token: String,
    pub viewer_token: Option<String>,
    pub interval: Duration,
    pub fetch_timeout: Duration,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn secs_or(name: &str, default: u64) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("{name} must be a whole number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let bind: SocketAddr = var_or("QUADSYNC_BIND", "0.0.0.0:8080")
            .parse()
            .context("QUADSYNC_BIND must be host:port")?;

        let libraries: Vec<SourceId> = match std::env::var("QUADSYNC_LIBRARIES") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SourceId::new)
                .collect(),
            Err(_) => DEFAULT_LIBRARIES.iter().map(SourceId::new).collect(),
        };
        anyhow::ensure!(
            libraries.len() >= 2,
            "QUADSYNC_LIBRARIES needs at least two libraries to reconcile"
        );

        let primary = SourceId::new(var_or("QUADSYNC_PRIMARY", "mysql"));
        anyhow::ensure!(
            libraries.contains(&primary),
            "QUADSYNC_PRIMARY {primary} is not in the library list"
        );

        let admin_token =
            std::env::var("QUADSYNC_ADMIN_TOKEN").context("QUADSYNC_ADMIN_TOKEN is required")?;

        Ok(Self {
            bind,
            environment: var_or("QUADSYNC_ENVIRONMENT", "development"),
            db_path: var_or("QUADSYNC_DB", "quadsync.db").into(),
            library_dir: var_or("QUADSYNC_LIBRARY_DIR", "libraries").into(),
            libraries,
            primary,
            admin_token,
            viewer_token: std::env::var("QUADSYNC_VIEWER_TOKEN").ok(),
            interval: secs_or("QUADSYNC_INTERVAL_SECS", 300)?,
            fetch_timeout: secs_or("QUADSYNC_FETCH_TIMEOUT_SECS", 10)?,
        })
    }
}
