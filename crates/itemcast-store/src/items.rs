//! Item repository.

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::database::Database;
use crate::error::StoreError;

/// A stored key-value pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Primary key.
    pub key: String,
    /// Current value.
    pub value: String,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
}

impl Item {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at: row.get(2)?,
        })
    }
}

/// CRUD access to the `items` table.
#[derive(Clone)]
pub struct ItemRepo {
    db: Database,
}

impl ItemRepo {
    /// Wrap a database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All items ordered by key.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Item>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value, updated_at FROM items ORDER BY key")?;
            let items = stmt
                .query_map([], Item::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
    }

    /// Look up one item.
    #[instrument(skip(self))]
    pub fn get(&self, key: &str) -> Result<Option<Item>, StoreError> {
        self.db.with_conn(|conn| {
            let item = conn
                .query_row(
                    "SELECT key, value, updated_at FROM items WHERE key = ?1",
                    [key],
                    Item::from_row,
                )
                .optional()?;
            Ok(item)
        })
    }

    /// Insert `key`, or overwrite its value if it exists.
    #[instrument(skip(self, value))]
    pub fn upsert(&self, key: &str, value: &str) -> Result<Item, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO items (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
            debug!(key, "item written");
            Ok(Item {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: now,
            })
        })
    }

    /// Overwrite the value of an existing `key`.
    ///
    /// Returns `None` without inserting when `key` is absent. Existence is
    /// decided by the same statement that writes, so a concurrent delete
    /// cannot turn this into an insert.
    #[instrument(skip(self, value))]
    pub fn update(&self, key: &str, value: &str) -> Result<Option<Item>, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE items SET value = ?2, updated_at = ?3 WHERE key = ?1",
                params![key, value, now],
            )?;
            if changed == 0 {
                debug!(key, "update of missing item");
                return Ok(None);
            }
            debug!(key, "item updated");
            Ok(Some(Item {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: now,
            }))
        })
    }

    /// Remove `key`. Returns whether a row existed.
    #[instrument(skip(self))]
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM items WHERE key = ?1", [key])?;
            Ok(removed > 0)
        })
    }

    /// Number of stored items.
    pub fn count(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }
}
