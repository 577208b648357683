//! Strong type definitions for the quadsync engine.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one of the synchronized libraries (e.g. `"mysql"`,
/// `"postgres"`, `"mariadb"`, `"sqlite"`).
///
/// Ordered so that lexical tie-breaks in the differ are explicit.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a new SourceId. Identifiers are lowercased on construction
    /// so that ordering and equality are case-insensitive.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().to_ascii_lowercase())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Logical key of one entity, shared by all libraries (the string form of
/// the original row id).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({})", self.0)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Monotonic conflict identifier, allocated by the conflict store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(pub i64);

impl fmt::Debug for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConflictId({})", self.0)
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic sync-run identifier, allocated by the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl fmt::Debug for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of entity classes reconciled across libraries.
///
/// The wire name (`as_str`) matches the table name the original data
/// sources use, which is also what the admin client displays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Item,
    Order,
    User,
}

impl EntityType {
    /// All entity types, in the order runs process them.
    pub const ALL: [EntityType; 3] = [EntityType::Item, EntityType::Order, EntityType::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Item => "items",
            EntityType::Order => "orders",
            EntityType::User => "users",
        }
    }

    /// Parse from the table-name form. Returns None for unknown tables.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "items" => Some(EntityType::Item),
            "orders" => Some(EntityType::Order),
            "users" => Some(EntityType::User),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a key present in some library is expected to exist in every
/// library for a given entity type.
///
/// Absence only counts as a divergence under `RequireAll`; the policy is
/// explicit per entity type, never inferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresencePolicy {
    RequireAll,
    AllowMissing,
}

/// How a run was admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Scheduled,
    Manual,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Scheduled => "scheduled",
            RunMode::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(RunMode::Scheduled),
            "manual" => Some(RunMode::Manual),
            _ => None,
        }
    }
}

/// Lifecycle state of a sync run. `Running` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Lifecycle state of a conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Open => "open",
            ConflictStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ConflictStatus::Open),
            "resolved" => Some(ConflictStatus::Resolved),
            _ => None,
        }
    }
}

/// Rule used to pick the winning value when closing a conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The conflict's source payload wins; written to the target library.
    Source,
    /// The conflict's target payload wins; written to the source library.
    Target,
    /// An administrator-supplied payload wins; written to both libraries.
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Source => "source",
            ResolutionStrategy::Target => "target",
            ResolutionStrategy::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "source" => Some(ResolutionStrategy::Source),
            "target" => Some(ResolutionStrategy::Target),
            "manual" => Some(ResolutionStrategy::Manual),
            _ => None,
        }
    }
}

/// One execution of the reconciliation procedure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: RunId,
    pub mode: RunMode,
    pub environment: String,
    /// Libraries this run reconciled.
    pub targets: Vec<SourceId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Distinct entity keys this run saw across all entity types.
    pub records_processed: u64,
    /// Entity keys that produced at least one divergence.
    pub conflicts_found: u64,
}

/// Aggregate counters for one calendar date.
///
/// `ai_requests` and `inventory_changes` coexist in the row for the
/// dashboard's benefit; the sync engine reads them but never writes them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub sync_success: u64,
    pub sync_conflicts: u64,
    pub ai_requests: u64,
    pub inventory_changes: u64,
}

impl DailyStat {
    /// An all-zero row for a date that has seen no activity.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            sync_success: 0,
            sync_conflicts: 0,
            ai_requests: 0,
            inventory_changes: 0,
        }
    }
}
