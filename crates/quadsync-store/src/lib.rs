//! quadsync-store: persistence for conflicts, run history, and daily stats.
//!
//! This crate provides:
//! - The [`Store`] trait: the abstract async persistence interface
//! - [`SqliteStore`]: the primary SQLite-backed implementation
//! - [`MemoryStore`]: an in-memory implementation for tests
//! - Schema migrations for the SQLite backend
//!
//! Conflicts coalesce per identity per detection day, resolutions are
//! one-shot, and daily stat counters are additive upserts. Both backends
//! enforce the same semantics so the engine can be tested against memory
//! and deployed against SQLite.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{RecordOutcome, ResolveOutcome, Store};
