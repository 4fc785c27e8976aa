//! Item tree repository.
//!
//! # Responsibility
//! - Create, list, move and delete rows of the `item` table.
//! - Keep sibling indexes contiguous through `index_allocator`.
//!
//! # Invariants
//! - Child listing is ordered by `idx ASC`.
//! - Deleting an item deletes its whole subtree and every child row of those
//!   items through `ON DELETE CASCADE`.
//! - Callers run `create_child`, `move_item` and `delete_item` inside one
//!   write scope so the reserved slot and the row write land together.

use super::event_repo::SqliteEventRepository;
use super::index_allocator::{compact_after, reserve_index};
use super::{now_epoch_ms, parse_idx, RepoError, RepoResult};
use crate::model::item::{ItemRecord, ItemUid};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ITEM_SELECT_SQL: &str = "SELECT
    uid,
    parent_uid,
    idx,
    category,
    created_at
FROM item";

/// SQLite-backed item tree repository.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Loads one item by uid.
    pub fn get(&self, uid: ItemUid) -> RepoResult<Option<ItemRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE uid = ?1;"))?;
        let mut rows = stmt.query([uid])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    /// Loads one item by uid, failing with `ItemNotFound` when missing.
    pub fn require(&self, uid: ItemUid) -> RepoResult<ItemRecord> {
        self.get(uid)?.ok_or(RepoError::ItemNotFound(uid))
    }

    /// Returns whether a row exists for `uid`.
    pub fn exists(&self, uid: ItemUid) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM item WHERE uid = ?1);",
            [uid],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    /// Loads the category column only.
    pub fn category(&self, uid: ItemUid) -> RepoResult<String> {
        self.conn
            .query_row("SELECT category FROM item WHERE uid = ?1;", [uid], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(RepoError::ItemNotFound(uid))
    }

    /// Lists direct children ordered by sibling index.
    pub fn children(&self, parent_uid: ItemUid) -> RepoResult<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE parent_uid = ?1
             ORDER BY idx ASC;"
        ))?;
        let mut rows = stmt.query([parent_uid])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    /// Counts direct children.
    pub fn child_count(&self, parent_uid: ItemUid) -> RepoResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM item WHERE parent_uid = ?1;",
            [parent_uid],
            |row| row.get(0),
        )?;
        u32::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("child count `{count}` overflows u32")))
    }

    /// Returns `uid` and the uids of all its descendants, parents first.
    pub fn subtree_uids(&self, uid: ItemUid) -> RepoResult<Vec<ItemUid>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(uid, depth) AS (
                SELECT uid, 0
                FROM item
                WHERE uid = ?1
                UNION ALL
                SELECT child.uid, parent.depth + 1
                FROM item child
                INNER JOIN subtree parent ON child.parent_uid = parent.uid
            )
            SELECT uid FROM subtree ORDER BY depth ASC, uid ASC;",
        )?;
        let mut rows = stmt.query([uid])?;
        let mut uids = Vec::new();
        while let Some(row) = rows.next()? {
            uids.push(row.get(0)?);
        }
        Ok(uids)
    }

    /// Returns whether `candidate` is `ancestor` itself or one of its
    /// descendants.
    pub fn is_in_subtree(&self, ancestor: ItemUid, candidate: ItemUid) -> RepoResult<bool> {
        let found: i64 = self.conn.query_row(
            "WITH RECURSIVE lineage(uid) AS (
                SELECT uid FROM item WHERE uid = ?2
                UNION ALL
                SELECT item.parent_uid
                FROM item
                INNER JOIN lineage ON item.uid = lineage.uid
                WHERE item.parent_uid IS NOT NULL
            )
            SELECT EXISTS(SELECT 1 FROM lineage WHERE uid = ?1);",
            params![ancestor, candidate],
            |row| row.get(0),
        )?;
        Ok(found == 1)
    }

    /// Inserts a new child under `parent_uid` at `requested` (append when
    /// `None`) and logs "item created" on the new child.
    ///
    /// # Errors
    /// - `ItemNotFound` when the parent row is missing.
    /// - `IndexOutOfRange` from the index allocator.
    pub fn create_child(
        &self,
        parent_uid: ItemUid,
        category: &str,
        requested: Option<u32>,
    ) -> RepoResult<ItemRecord> {
        if !self.exists(parent_uid)? {
            return Err(RepoError::ItemNotFound(parent_uid));
        }

        let idx = reserve_index(self.conn, parent_uid, requested)?;
        let created_at = now_epoch_ms();
        self.conn.execute(
            "INSERT INTO item (parent_uid, idx, category, created_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![parent_uid, idx, category, created_at],
        )?;
        let uid = self.conn.last_insert_rowid();
        SqliteEventRepository::new(self.conn).append(uid, "item created")?;

        Ok(ItemRecord {
            uid,
            parent_uid: Some(parent_uid),
            idx,
            category: category.to_string(),
            created_at,
        })
    }

    /// Moves `uid` under `new_parent_uid` at `requested` and compacts the
    /// siblings left behind.
    ///
    /// Returns the updated row.
    pub fn move_item(
        &self,
        uid: ItemUid,
        new_parent_uid: ItemUid,
        requested: Option<u32>,
    ) -> RepoResult<ItemRecord> {
        let current = self.require(uid)?;
        if !self.exists(new_parent_uid)? {
            return Err(RepoError::ItemNotFound(new_parent_uid));
        }

        let idx = reserve_index(self.conn, new_parent_uid, requested)?;
        self.conn.execute(
            "UPDATE item
             SET parent_uid = ?2,
                 idx = ?3
             WHERE uid = ?1;",
            params![uid, new_parent_uid, idx],
        )?;
        // Within the same parent the reservation may have shifted this row,
        // but compacting past its old slot still restores 1..=N.
        if let Some(old_parent_uid) = current.parent_uid {
            compact_after(self.conn, old_parent_uid, current.idx)?;
        }
        SqliteEventRepository::new(self.conn).append(
            uid,
            &format!("item moved to parent {new_parent_uid} at index {idx}"),
        )?;

        self.require(uid)
    }

    /// Deletes `uid` with its whole subtree and compacts its siblings.
    ///
    /// Returns the deleted uids, parents first, so the caller can release
    /// their data directories.
    pub fn delete_item(&self, uid: ItemUid) -> RepoResult<Vec<ItemUid>> {
        let current = self.require(uid)?;
        let removed = self.subtree_uids(uid)?;

        self.conn.execute("DELETE FROM item WHERE uid = ?1;", [uid])?;
        if let Some(parent_uid) = current.parent_uid {
            compact_after(self.conn, parent_uid, current.idx)?;
        }
        Ok(removed)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<ItemRecord> {
    let idx: i64 = row.get("idx")?;
    Ok(ItemRecord {
        uid: row.get("uid")?,
        parent_uid: row.get("parent_uid")?,
        idx: parse_idx(idx, "item.idx")?,
        category: row.get("category")?,
        created_at: row.get("created_at")?,
    })
}
