//! Source adapter for a library stored as a standalone SQLite file.
//!
//! Each synchronized library keeps its rows in its own conventions: money
//! as decimal strings, tags as comma-separated text. This adapter owns the
//! normalization in both directions, so the rest of the engine only ever
//! sees canonical integer-cent payloads and tag sets.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use quadsync_core::{
    CanonicalRecord, EngineError, EntityKey, EntityType, FieldBag, ItemFields, OrderFields,
    RecordPayload, Result, SourceId, UserFields,
};

use crate::adapter::SourceAdapter;

/// Adapter fronting one SQLite library file.
pub struct SqliteSource {
    id: SourceId,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSource {
    /// Open (or create) a library file and ensure its tables exist.
    pub fn open(id: SourceId, path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| EngineError::SourceUnavailable {
            library: id.clone(),
            reason: e.to_string(),
        })?;
        Self::with_connection(id, conn)
    }

    /// In-memory library, for tests.
    pub fn open_memory(id: SourceId) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| EngineError::SourceUnavailable {
            library: id.clone(),
            reason: e.to_string(),
        })?;
        Self::with_connection(id, conn)
    }

    fn with_connection(id: SourceId, conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                entity_key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                price TEXT NOT NULL,
                stock INTEGER NOT NULL,
                category TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS orders (
                entity_key TEXT PRIMARY KEY,
                buyer TEXT NOT NULL,
                item_key TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                total TEXT NOT NULL,
                state TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS users (
                entity_key TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                role TEXT NOT NULL
            );",
        )
        .map_err(|e| EngineError::SourceUnavailable {
            library: id.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            id,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| EngineError::Internal(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("spawn_blocking failed: {e}")))?
    }

    fn unavailable(id: &SourceId, e: rusqlite::Error) -> EngineError {
        EngineError::SourceUnavailable {
            library: id.clone(),
            reason: e.to_string(),
        }
    }
}

/// Parse a decimal money string ("99.5", "120") into integer cents.
///
/// At most two fractional digits are accepted; the libraries store prices
/// to the cent and anything finer is corrupt data.
pub fn parse_money_cents(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let cents = whole.checked_mul(100)?.checked_add(frac_cents)?;
    Some(if negative { -cents } else { cents })
}

/// Render integer cents back into the libraries' decimal string form.
pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn parse_tags(csv: &str) -> BTreeSet<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn format_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join(",")
}

fn bad_row(id: &SourceId, key: &str, what: &str) -> EngineError {
    EngineError::Internal(format!("library {id}: row {key}: {what}"))
}

#[async_trait]
impl SourceAdapter for SqliteSource {
    fn source_id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch(&self, entity_type: EntityType) -> Result<Vec<CanonicalRecord>> {
        let id = self.id.clone();
        self.with_conn(move |conn| {
            let observed_at = Utc::now();
            let mut records = Vec::new();

            match entity_type {
                EntityType::Item => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT entity_key, title, price, stock, category, tags
                             FROM items ORDER BY entity_key",
                        )
                        .map_err(|e| Self::unavailable(&id, e))?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, i64>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, String>(5)?,
                            ))
                        })
                        .map_err(|e| Self::unavailable(&id, e))?;
                    for row in rows {
                        let (key, title, price, stock, category, tags) =
                            row.map_err(|e| Self::unavailable(&id, e))?;
                        let price_cents = parse_money_cents(&price)
                            .ok_or_else(|| bad_row(&id, &key, "unparseable price"))?;
                        records.push(CanonicalRecord {
                            entity_type,
                            entity_key: EntityKey::new(key),
                            source_id: id.clone(),
                            payload: RecordPayload::Item(ItemFields {
                                title,
                                price_cents,
                                stock,
                                category,
                                tags: parse_tags(&tags),
                                extra: FieldBag::new(),
                            }),
                            version_tag: None,
                            observed_at,
                        });
                    }
                }
                EntityType::Order => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT entity_key, buyer, item_key, quantity, total, state
                             FROM orders ORDER BY entity_key",
                        )
                        .map_err(|e| Self::unavailable(&id, e))?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, i64>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, String>(5)?,
                            ))
                        })
                        .map_err(|e| Self::unavailable(&id, e))?;
                    for row in rows {
                        let (key, buyer, item_key, quantity, total, state) =
                            row.map_err(|e| Self::unavailable(&id, e))?;
                        let total_cents = parse_money_cents(&total)
                            .ok_or_else(|| bad_row(&id, &key, "unparseable total"))?;
                        records.push(CanonicalRecord {
                            entity_type,
                            entity_key: EntityKey::new(key),
                            source_id: id.clone(),
                            payload: RecordPayload::Order(OrderFields {
                                buyer,
                                item_key,
                                quantity,
                                total_cents,
                                state,
                                extra: FieldBag::new(),
                            }),
                            version_tag: None,
                            observed_at,
                        });
                    }
                }
                EntityType::User => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT entity_key, username, email, role
                             FROM users ORDER BY entity_key",
                        )
                        .map_err(|e| Self::unavailable(&id, e))?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                            ))
                        })
                        .map_err(|e| Self::unavailable(&id, e))?;
                    for row in rows {
                        let (key, username, email, role) =
                            row.map_err(|e| Self::unavailable(&id, e))?;
                        records.push(CanonicalRecord {
                            entity_type,
                            entity_key: EntityKey::new(key),
                            source_id: id.clone(),
                            payload: RecordPayload::User(UserFields {
                                username,
                                email,
                                role,
                                extra: FieldBag::new(),
                            }),
                            version_tag: None,
                            observed_at,
                        });
                    }
                }
            }

            Ok(records)
        })
        .await
    }

    async fn apply(
        &self,
        entity_type: EntityType,
        entity_key: &EntityKey,
        payload: &RecordPayload,
    ) -> Result<()> {
        if !payload.matches(entity_type) {
            return Err(EngineError::InvalidArgument(format!(
                "payload does not match entity type {entity_type}"
            )));
        }

        let id = self.id.clone();
        let key = entity_key.as_str().to_string();
        let payload = payload.clone();
        self.with_conn(move |conn| {
            let rejected = |e: rusqlite::Error| EngineError::SourceRejected {
                library: id.clone(),
                reason: e.to_string(),
            };

            match &payload {
                RecordPayload::Item(fields) => {
                    conn.execute(
                        "INSERT INTO items (entity_key, title, price, stock, category, tags)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(entity_key) DO UPDATE SET
                             title = excluded.title, price = excluded.price,
                             stock = excluded.stock, category = excluded.category,
                             tags = excluded.tags",
                        params![
                            key,
                            fields.title,
                            format_money(fields.price_cents),
                            fields.stock,
                            fields.category,
                            format_tags(&fields.tags),
                        ],
                    )
                    .map_err(rejected)?;
                }
                RecordPayload::Order(fields) => {
                    conn.execute(
                        "INSERT INTO orders (entity_key, buyer, item_key, quantity, total, state)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(entity_key) DO UPDATE SET
                             buyer = excluded.buyer, item_key = excluded.item_key,
                             quantity = excluded.quantity, total = excluded.total,
                             state = excluded.state",
                        params![
                            key,
                            fields.buyer,
                            fields.item_key,
                            fields.quantity,
                            format_money(fields.total_cents),
                            fields.state,
                        ],
                    )
                    .map_err(rejected)?;
                }
                RecordPayload::User(fields) => {
                    conn.execute(
                        "INSERT INTO users (entity_key, username, email, role)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(entity_key) DO UPDATE SET
                             username = excluded.username, email = excluded.email,
                             role = excluded.role",
                        params![key, fields.username, fields.email, fields.role],
                    )
                    .map_err(rejected)?;
                }
                RecordPayload::Unknown(_) => {
                    return Err(EngineError::InvalidArgument(
                        "cannot write an unmodeled payload back to a library".into(),
                    ));
                }
            }

            Ok(())
        })
        .await
    }
}
