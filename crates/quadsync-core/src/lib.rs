//! # Quadsync Core
//!
//! Pure primitives for the quadsync engine: canonical records, typed
//! payloads, and the record differ.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over normalized record values.
//!
//! ## Key Types
//!
//! - [`CanonicalRecord`] - One entity as seen from one library
//! - [`RecordPayload`] - Tagged union of known entity schemas
//! - [`Conflict`] / [`NewConflict`] - A detected divergence between two
//!   libraries' views of the same entity
//! - [`EngineError`] - The engine-wide error taxonomy
//!
//! ## Diffing
//!
//! Agreement is semantic payload equality; see the [`diff`] module for the
//! per-key pairing rules (at most N−1 conflicts per key for N sources).

pub mod diff;
pub mod error;
pub mod payload;
pub mod record;
pub mod types;

pub use diff::{diff_entity_type, diff_key, DiffOutcome};
pub use error::{EngineError, Result};
pub use payload::{FieldBag, FieldValue, ItemFields, OrderFields, RecordPayload, UserFields};
pub use record::{CanonicalRecord, Conflict, NewConflict};
pub use types::{
    ConflictId, ConflictStatus, DailyStat, EntityKey, EntityType, PresencePolicy,
    ResolutionStrategy, RunId, RunMode, RunStatus, SourceId, SyncRun,
};
