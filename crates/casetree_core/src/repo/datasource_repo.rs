//! Revisioned datasource descriptor storage.
//!
//! # Invariants
//! - At most one row per item.
//! - `revision` starts at 1 and grows by exactly one on every store.
//! - Revision 0 is never stored; it stands for "no datasource".

use super::event_repo::SqliteEventRepository;
use super::{encode_for_write, RepoError, RepoResult};
use crate::codec::decode;
use crate::model::data::Data;
use crate::model::item::ItemUid;
use rusqlite::{params, Connection, OptionalExtension};

/// Revision reported for items without a datasource row.
pub const ABSENT_REVISION: i64 = 0;

/// SQLite-backed datasource repository.
pub struct SqliteDatasourceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDatasourceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Reads the stored revision without loading the state blob.
    pub fn revision(&self, item_uid: ItemUid) -> RepoResult<i64> {
        let revision: Option<i64> = self
            .conn
            .query_row(
                "SELECT revision FROM datasource WHERE item_uid = ?1;",
                [item_uid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(revision.unwrap_or(ABSENT_REVISION))
    }

    /// Loads `(revision, state)`, or `None` when no datasource is stored.
    pub fn load(&self, item_uid: ItemUid) -> RepoResult<Option<(i64, Data)>> {
        let row: Option<(i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT revision, state FROM datasource WHERE item_uid = ?1;",
                [item_uid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((revision, state)) = row else {
            return Ok(None);
        };
        let state = decode(&state).map_err(|source| RepoError::Codec {
            context: format!("datasource of item {item_uid}"),
            source,
        })?;
        Ok(Some((revision, state)))
    }

    /// Stores `state`, bumping the revision, and returns the new revision.
    ///
    /// Updates in place when a row exists, inserts with revision 1
    /// otherwise.
    pub fn store(&self, item_uid: ItemUid, state: &Data) -> RepoResult<i64> {
        let encoded = encode_for_write(state, "datasource state")?;
        let updated: Option<i64> = self
            .conn
            .query_row(
                "UPDATE datasource
                 SET state = ?2,
                     revision = revision + 1
                 WHERE item_uid = ?1
                 RETURNING revision;",
                params![item_uid, encoded],
                |row| row.get(0),
            )
            .optional()?;

        let revision = match updated {
            Some(revision) => revision,
            None => {
                self.conn.execute(
                    "INSERT INTO datasource (item_uid, state, revision)
                     VALUES (?1, ?2, 1);",
                    params![item_uid, encoded],
                )?;
                1
            }
        };
        SqliteEventRepository::new(self.conn).append(item_uid, "datasource set")?;
        Ok(revision)
    }

    /// Deletes the datasource row.
    ///
    /// Returns `false` when none existed; nothing is logged in that case.
    pub fn delete(&self, item_uid: ItemUid) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM datasource WHERE item_uid = ?1;", [item_uid])?;
        if changed == 0 {
            return Ok(false);
        }
        SqliteEventRepository::new(self.conn).append(item_uid, "datasource removed")?;
        Ok(true)
    }
}
