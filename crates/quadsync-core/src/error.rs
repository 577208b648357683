//! The engine-wide error taxonomy.

use thiserror::Error;

use crate::types::{ConflictId, SourceId};

/// Errors that can surface from sync and resolution operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A library could not be reached. Transient and per-source; the
    /// orchestrator tolerates it within a run.
    #[error("source {library} unavailable: {reason}")]
    SourceUnavailable { library: SourceId, reason: String },

    /// The destination library's own validation refused a write-back.
    #[error("source {library} rejected write: {reason}")]
    SourceRejected { library: SourceId, reason: String },

    /// Admission conflict: a run is already in flight. Caller-retriable.
    #[error("a sync run is already in progress")]
    RunInProgress,

    /// No conflict with that id.
    #[error("conflict {0} not found")]
    NotFound(ConflictId),

    /// The conflict was already closed. Benign idempotent-retry signal.
    #[error("conflict {0} is already resolved")]
    AlreadyResolved(ConflictId),

    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Authorization boundary: administrative role required.
    #[error("administrative role required")]
    Forbidden,

    /// Storage or other infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the caller can simply retry later without changing anything.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EngineError::SourceUnavailable { .. } | EngineError::RunInProgress
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
