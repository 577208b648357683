//! Proptest strategies for engine types.

use std::collections::BTreeSet;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use quadsync_core::{
    CanonicalRecord, EntityKey, EntityType, FieldBag, FieldValue, ItemFields, OrderFields,
    RecordPayload, SourceId, UserFields,
};

pub fn arb_source_id() -> impl Strategy<Value = SourceId> {
    prop_oneof![
        Just(SourceId::new("mariadb")),
        Just(SourceId::new("mysql")),
        Just(SourceId::new("postgres")),
        Just(SourceId::new("sqlite")),
    ]
}

pub fn arb_entity_key() -> impl Strategy<Value = EntityKey> {
    "[a-z]{1,8}-[0-9]{1,6}".prop_map(EntityKey::new)
}

pub fn arb_field_value() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i64>().prop_map(FieldValue::Int),
        "[a-zA-Z0-9 ]{0,16}".prop_map(FieldValue::Text),
    ]
}

pub fn arb_field_bag() -> impl Strategy<Value = FieldBag> {
    proptest::collection::btree_map("[a-z_]{1,10}", arb_field_value(), 0..4)
}

pub fn arb_tags() -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set("[a-z]{2,10}", 0..5)
}

pub fn arb_item_fields() -> impl Strategy<Value = ItemFields> {
    (
        "[a-zA-Z0-9 ]{1,24}",
        0..1_000_000i64,
        0..100i64,
        "[a-z]{3,12}",
        arb_tags(),
        arb_field_bag(),
    )
        .prop_map(
            |(title, price_cents, stock, category, tags, extra)| ItemFields {
                title,
                price_cents,
                stock,
                category,
                tags,
                extra,
            },
        )
}

pub fn arb_order_fields() -> impl Strategy<Value = OrderFields> {
    (
        "[a-z]{3,12}",
        "[a-z]{1,8}-[0-9]{1,6}",
        1..20i64,
        0..1_000_000i64,
        prop_oneof![Just("pending"), Just("paid"), Just("shipped")],
        arb_field_bag(),
    )
        .prop_map(
            |(buyer, item_key, quantity, total_cents, state, extra)| OrderFields {
                buyer,
                item_key,
                quantity,
                total_cents,
                state: state.to_string(),
                extra,
            },
        )
}

pub fn arb_user_fields() -> impl Strategy<Value = UserFields> {
    (
        "[a-z]{3,12}",
        prop_oneof![Just("student"), Just("admin")],
        arb_field_bag(),
    )
        .prop_map(|(username, role, extra)| UserFields {
            email: format!("{username}@campus.edu"),
            username,
            role: role.to_string(),
            extra,
        })
}

/// A payload whose variant matches the given entity type.
pub fn arb_payload_for(entity_type: EntityType) -> BoxedStrategy<RecordPayload> {
    match entity_type {
        EntityType::Item => arb_item_fields().prop_map(RecordPayload::Item).boxed(),
        EntityType::Order => arb_order_fields().prop_map(RecordPayload::Order).boxed(),
        EntityType::User => arb_user_fields().prop_map(RecordPayload::User).boxed(),
    }
}

pub fn arb_entity_type() -> impl Strategy<Value = EntityType> {
    prop_oneof![
        Just(EntityType::Item),
        Just(EntityType::Order),
        Just(EntityType::User),
    ]
}

/// A canonical record with a consistent payload variant.
pub fn arb_record() -> impl Strategy<Value = CanonicalRecord> {
    (arb_entity_type(), arb_entity_key(), arb_source_id()).prop_flat_map(
        |(entity_type, entity_key, source_id)| {
            arb_payload_for(entity_type).prop_map(move |payload| CanonicalRecord {
                entity_type,
                entity_key: entity_key.clone(),
                source_id: source_id.clone(),
                payload,
                version_tag: None,
                observed_at: Utc.with_ymd_and_hms(2025, 11, 16, 12, 0, 0).unwrap(),
            })
        },
    )
}
