//! The record differ.
//!
//! Given the per-run snapshot of canonical records for one entity type, the
//! differ decides agreement per entity key and produces conflicts for the
//! orchestrator to persist. Pure functions; no side effects.
//!
//! Per key, at most N−1 conflicts are emitted for N sources: the reference
//! side (the configured primary, or its lexical stand-in when the primary
//! lacks the key) is paired against each disagreeing target in lexical
//! source order, never the full pairwise set.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::record::{CanonicalRecord, NewConflict};
use crate::types::{EntityKey, EntityType, PresencePolicy, SourceId};

/// Result of diffing one entity type's snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Distinct entity keys seen across all reachable sources.
    pub keys_processed: u64,
    /// Keys that produced at least one divergence.
    pub conflicted_keys: u64,
    pub conflicts: Vec<NewConflict>,
}

/// Diff the full snapshot for one entity type.
///
/// `snapshot` maps each *reachable* source to the records it returned;
/// sources that failed to fetch must be left out entirely, so their
/// absences are never mistaken for divergence.
pub fn diff_entity_type(
    entity_type: EntityType,
    snapshot: &BTreeMap<SourceId, Vec<CanonicalRecord>>,
    primary: &SourceId,
    policy: PresencePolicy,
    detected_at: DateTime<Utc>,
) -> DiffOutcome {
    let reachable: BTreeSet<SourceId> = snapshot.keys().cloned().collect();

    // Regroup: key -> (source -> record).
    let mut by_key: BTreeMap<EntityKey, BTreeMap<SourceId, &CanonicalRecord>> = BTreeMap::new();
    for (source, records) in snapshot {
        for record in records {
            debug_assert_eq!(record.entity_type, entity_type);
            by_key
                .entry(record.entity_key.clone())
                .or_default()
                .insert(source.clone(), record);
        }
    }

    let mut outcome = DiffOutcome {
        keys_processed: by_key.len() as u64,
        ..Default::default()
    };

    for (key, views) in &by_key {
        let conflicts = diff_key(
            entity_type,
            key,
            views,
            &reachable,
            primary,
            policy,
            detected_at,
        );
        if !conflicts.is_empty() {
            outcome.conflicted_keys += 1;
        }
        outcome.conflicts.extend(conflicts);
    }

    outcome
}

/// Diff one entity key across the sources that hold it.
///
/// `views` holds the records present for this key; `reachable` is the set
/// of sources actually fetched this run. `views` must be non-empty.
pub fn diff_key(
    entity_type: EntityType,
    entity_key: &EntityKey,
    views: &BTreeMap<SourceId, &CanonicalRecord>,
    reachable: &BTreeSet<SourceId>,
    primary: &SourceId,
    policy: PresencePolicy,
    detected_at: DateTime<Utc>,
) -> Vec<NewConflict> {
    // Reference side: the primary when it holds the key, else the
    // lexically-first source that does.
    let reference = if views.contains_key(primary) {
        primary.clone()
    } else {
        match views.keys().next() {
            Some(first) => first.clone(),
            None => return Vec::new(),
        }
    };
    let reference_record = &views[&reference];

    let mut conflicts = Vec::new();
    for target in reachable {
        if target == &reference {
            continue;
        }
        match views.get(target) {
            Some(record) => {
                if !record.agrees_with(reference_record) {
                    conflicts.push(NewConflict {
                        entity_type,
                        entity_key: entity_key.clone(),
                        source: reference.clone(),
                        target: target.clone(),
                        source_payload: Some(reference_record.payload.clone()),
                        target_payload: Some(record.payload.clone()),
                        detected_at,
                    });
                }
            }
            None => {
                if policy == PresencePolicy::RequireAll {
                    conflicts.push(NewConflict {
                        entity_type,
                        entity_key: entity_key.clone(),
                        source: reference.clone(),
                        target: target.clone(),
                        source_payload: Some(reference_record.payload.clone()),
                        target_payload: None,
                        detected_at,
                    });
                }
            }
        }
    }

    conflicts
}
