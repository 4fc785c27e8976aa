//! Per-item attribute table with transparent overflow files.
//!
//! # Responsibility
//! - Persist `Data` values keyed by `(item_uid, id)`.
//! - Route encodings larger than the overflow threshold to sidecar files.
//!
//! # Invariants
//! - A row holds either the full encoding or exactly `OVERFLOW_SENTINEL`.
//! - `set` and `remove` always move the previous overflow file aside first,
//!   so at most one live file exists per attribute and none for inline
//!   values. The overflow journal restores it if the write scope rolls back.

use super::event_repo::SqliteEventRepository;
use super::{encode_for_write, RepoError, RepoResult};
use crate::codec::decode;
use crate::model::data::{Data, DataMap};
use crate::model::item::ItemUid;
use crate::storage::{is_sentinel, validate_attribute_id, OverflowStore, OVERFLOW_SENTINEL};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed attribute repository.
pub struct SqliteAttributeRepository<'a> {
    conn: &'a Connection,
    overflow: &'a OverflowStore,
}

impl<'a> SqliteAttributeRepository<'a> {
    pub fn new(conn: &'a Connection, overflow: &'a OverflowStore) -> Self {
        Self { conn, overflow }
    }

    /// Returns whether the attribute row exists.
    pub fn has(&self, item_uid: ItemUid, id: &str) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM attribute WHERE item_uid = ?1 AND id = ?2
            );",
            params![item_uid, id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    /// Loads one attribute; missing attributes read as `Data::Null`.
    pub fn get(&self, item_uid: ItemUid, id: &str) -> RepoResult<Data> {
        let stored: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT value FROM attribute WHERE item_uid = ?1 AND id = ?2;",
                params![item_uid, id],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(stored) => self.decode_stored(item_uid, id, stored),
            None => Ok(Data::Null),
        }
    }

    /// Loads every attribute of one item.
    pub fn get_all(&self, item_uid: ItemUid) -> RepoResult<DataMap> {
        let mut stmt = self.conn.prepare(
            "SELECT id, value
             FROM attribute
             WHERE item_uid = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([item_uid])?;
        let mut attributes = DataMap::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let stored: Vec<u8> = row.get(1)?;
            let value = self.decode_stored(item_uid, &id, stored)?;
            attributes.insert(id, value);
        }
        Ok(attributes)
    }

    /// Stores one attribute, inline or in an overflow file, and logs
    /// `attribute '<id>' set`.
    ///
    /// # Errors
    /// - `Storage(InvalidAttributeId)` when `id` cannot name a file.
    /// - `InvalidValue` when `value` nests too deeply to be read back.
    pub fn set(&self, item_uid: ItemUid, id: &str, value: &Data) -> RepoResult<()> {
        validate_attribute_id(id)?;
        let encoded = encode_for_write(value, &format!("attribute `{id}`"))?;

        self.overflow.remove(item_uid, id)?;
        let spilled = self.overflow.should_spill(encoded.len());
        let stored: &[u8] = if spilled {
            self.overflow.write(item_uid, id, &encoded)?;
            &OVERFLOW_SENTINEL
        } else {
            &encoded
        };

        self.conn.execute(
            "INSERT INTO attribute (item_uid, id, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(item_uid, id) DO UPDATE SET value = excluded.value;",
            params![item_uid, id, stored],
        )?;
        SqliteEventRepository::new(self.conn).append(item_uid, &format!("attribute '{id}' set"))?;

        debug!(
            "event=attribute_set module=repo status=ok uid={} bytes={} spilled={}",
            item_uid,
            encoded.len(),
            spilled
        );
        Ok(())
    }

    /// Deletes one attribute and its overflow file, and logs
    /// `attribute '<id>' removed`.
    ///
    /// Returns `false` when no row existed; nothing is logged in that case.
    pub fn remove(&self, item_uid: ItemUid, id: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM attribute WHERE item_uid = ?1 AND id = ?2;",
            params![item_uid, id],
        )?;
        if validate_attribute_id(id).is_ok() {
            self.overflow.remove(item_uid, id)?;
        }
        if changed == 0 {
            return Ok(false);
        }

        SqliteEventRepository::new(self.conn)
            .append(item_uid, &format!("attribute '{id}' removed"))?;
        Ok(true)
    }

    fn decode_stored(&self, item_uid: ItemUid, id: &str, stored: Vec<u8>) -> RepoResult<Data> {
        let encoded = if is_sentinel(&stored) {
            self.overflow.read(item_uid, id)?
        } else {
            stored
        };
        decode(&encoded).map_err(|source| RepoError::Codec {
            context: format!("attribute `{id}` of item {item_uid}"),
            source,
        })
    }
}
