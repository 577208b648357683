//! Typed record payloads.
//!
//! Library rows arrive as loose key→value maps with source-specific field
//! names and units. Adapters normalize them into this tagged union so the
//! differ's comparison is exhaustive and type-checked per entity class,
//! with an explicit bag for fields the schema does not model.
//!
//! Equality on these types IS the engine's semantic payload equality:
//! scalars compare exactly, unordered fields are sets, and money is integer
//! cents so no float ever enters a comparison.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::EntityType;

/// A scalar field value. Deliberately has no float variant; adapters
/// normalize decimal amounts into integer cents.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Unmodeled fields, keyed by normalized field name.
pub type FieldBag = BTreeMap<String, FieldValue>;

/// Normalized marketplace item fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub title: String,
    /// Asking price in integer cents.
    pub price_cents: i64,
    pub stock: i64,
    pub category: String,
    /// Free-form labels. A set, so comparison ignores source ordering.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub extra: FieldBag,
}

/// Normalized order fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFields {
    pub buyer: String,
    pub item_key: String,
    pub quantity: i64,
    /// Order total in integer cents.
    pub total_cents: i64,
    pub state: String,
    #[serde(default)]
    pub extra: FieldBag,
}

/// Normalized user fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFields {
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub extra: FieldBag,
}

/// The canonical payload shape: one variant per known entity schema plus
/// an opaque bag for entity classes the normalizer does not know.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "fields", rename_all = "snake_case")]
pub enum RecordPayload {
    Item(ItemFields),
    Order(OrderFields),
    User(UserFields),
    Unknown(FieldBag),
}

impl RecordPayload {
    /// The entity class this payload was normalized as, if known.
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            RecordPayload::Item(_) => Some(EntityType::Item),
            RecordPayload::Order(_) => Some(EntityType::Order),
            RecordPayload::User(_) => Some(EntityType::User),
            RecordPayload::Unknown(_) => None,
        }
    }

    /// Whether this payload matches the given entity class. `Unknown`
    /// payloads match any class; they only compare against other bags.
    pub fn matches(&self, entity_type: EntityType) -> bool {
        self.entity_type().map_or(true, |et| et == entity_type)
    }
}
