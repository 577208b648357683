//! Canonical records and conflicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::RecordPayload;
use crate::types::{
    ConflictId, ConflictStatus, EntityKey, EntityType, ResolutionStrategy, SourceId,
};

/// One entity as seen from one library, after normalization.
///
/// Canonical records are never merged in place; the differ always compares
/// whole pairs. Agreement is payload equality only; `version_tag` and
/// `observed_at` are metadata and do not participate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub entity_type: EntityType,
    pub entity_key: EntityKey,
    pub source_id: SourceId,
    pub payload: RecordPayload,
    /// Source-side revision marker (optimistic-lock version, etag), if any.
    pub version_tag: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl CanonicalRecord {
    /// Semantic agreement between two views of the same entity.
    pub fn agrees_with(&self, other: &CanonicalRecord) -> bool {
        self.payload == other.payload
    }
}

/// A divergence detected by the differ, before it is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConflict {
    pub entity_type: EntityType,
    pub entity_key: EntityKey,
    /// The reference side (the configured primary, or its lexical stand-in
    /// when the primary has no record for this key).
    pub source: SourceId,
    pub target: SourceId,
    /// `None` means the record is absent from that library.
    pub source_payload: Option<RecordPayload>,
    pub target_payload: Option<RecordPayload>,
    pub detected_at: DateTime<Utc>,
}

/// A stored conflict.
///
/// Immutable once recorded, except for the resolution fields, which the
/// resolution service sets exactly once. Conflicts are never deleted
/// automatically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub entity_type: EntityType,
    pub entity_key: EntityKey,
    pub source: SourceId,
    pub target: SourceId,
    pub source_payload: Option<RecordPayload>,
    pub target_payload: Option<RecordPayload>,
    pub status: ConflictStatus,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_strategy: Option<ResolutionStrategy>,
}

impl Conflict {
    pub fn is_open(&self) -> bool {
        self.status == ConflictStatus::Open
    }

    /// The stored row for a freshly detected divergence.
    pub fn from_new(id: ConflictId, new: NewConflict) -> Self {
        Self {
            id,
            entity_type: new.entity_type,
            entity_key: new.entity_key,
            source: new.source,
            target: new.target,
            source_payload: new.source_payload,
            target_payload: new.target_payload,
            status: ConflictStatus::Open,
            detected_at: new.detected_at,
            resolved_at: None,
            resolution_strategy: None,
        }
    }
}
