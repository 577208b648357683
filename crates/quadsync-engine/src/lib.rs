//! quadsync-engine: the reconciliation machinery.
//!
//! This crate connects the pure differ from `quadsync-core` to real
//! libraries and storage:
//!
//! - [`SourceAdapter`] - normalized access to one library, with SQLite and
//!   in-memory implementations
//! - [`SyncOrchestrator`] - one full fetch-diff-persist pass
//! - [`Scheduler`] - single-flight run admission plus the interval loop
//! - [`ResolutionService`] - applies winning values and closes conflicts
//! - [`StatsAggregator`] - folds run outcomes into per-date counters

pub mod adapter;
pub mod config;
pub mod orchestrator;
pub mod resolution;
pub mod scheduler;
pub mod sqlite_source;
pub mod stats;

pub use adapter::SourceAdapter;
pub use config::EngineConfig;
pub use orchestrator::{RunReport, SyncOrchestrator};
pub use resolution::ResolutionService;
pub use scheduler::Scheduler;
pub use sqlite_source::SqliteSource;
pub use stats::{success_rate, StatsAggregator};
