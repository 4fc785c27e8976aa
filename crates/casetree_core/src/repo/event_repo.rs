//! Append-only item event log.

use super::{now_epoch_ms, RepoResult};
use crate::model::item::{ItemEvent, ItemUid};
use rusqlite::{params, Connection, Row};

/// SQLite-backed event log.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Appends one event stamped with the current time.
    pub fn append(&self, item_uid: ItemUid, text: &str) -> RepoResult<ItemEvent> {
        let timestamp = now_epoch_ms();
        self.conn.execute(
            "INSERT INTO event (item_uid, timestamp, text)
             VALUES (?1, ?2, ?3);",
            params![item_uid, timestamp, text],
        )?;
        Ok(ItemEvent {
            uid: self.conn.last_insert_rowid(),
            item_uid,
            timestamp,
            text: text.to_string(),
        })
    }

    /// Lists events of one item in insertion order.
    pub fn list(&self, item_uid: ItemUid) -> RepoResult<Vec<ItemEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, item_uid, timestamp, text
             FROM event
             WHERE item_uid = ?1
             ORDER BY uid ASC;",
        )?;
        let mut rows = stmt.query([item_uid])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<ItemEvent> {
    Ok(ItemEvent {
        uid: row.get("uid")?,
        item_uid: row.get("item_uid")?,
        timestamp: row.get("timestamp")?,
        text: row.get("text")?,
    })
}
