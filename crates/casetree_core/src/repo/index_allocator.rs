//! Sibling index reservation and compaction.
//!
//! # Invariants
//! - Children of one parent carry `idx` values exactly `1..=N`.
//! - `reserve_index` opens a gap for exactly one row; the caller must insert
//!   or move a row into it within the same write scope.
//! - `compact_after` closes the gap left by exactly one removed row.

use super::{parse_idx, RepoError, RepoResult};
use crate::model::item::ItemUid;
use rusqlite::{params, Connection};

/// Returns the largest child `idx` under `parent_uid`, or 0 for no children.
pub fn max_child_idx(conn: &Connection, parent_uid: ItemUid) -> RepoResult<u32> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(idx), 0)
         FROM item
         WHERE parent_uid = ?1;",
        [parent_uid],
        |row| row.get(0),
    )?;
    if max == 0 {
        return Ok(0);
    }
    parse_idx(max, "item.idx")
}

/// Reserves a sibling slot under `parent_uid`.
///
/// - `None` appends: returns `max_idx + 1` and shifts nothing.
/// - `Some(idx)` with `idx` in `1..=max_idx + 1` shifts every child at or
///   after `idx` up by one and returns `idx`.
///
/// # Errors
/// - `IndexOutOfRange` when `idx` is 0 or greater than `max_idx + 1`.
pub fn reserve_index(
    conn: &Connection,
    parent_uid: ItemUid,
    requested: Option<u32>,
) -> RepoResult<u32> {
    let max_idx = max_child_idx(conn, parent_uid)?;
    let Some(requested) = requested else {
        return Ok(max_idx + 1);
    };

    if requested == 0 || requested > max_idx + 1 {
        return Err(RepoError::IndexOutOfRange {
            parent_uid,
            requested,
            max_idx,
        });
    }

    conn.execute(
        "UPDATE item
         SET idx = idx + 1
         WHERE parent_uid = ?1
           AND idx >= ?2;",
        params![parent_uid, requested],
    )?;
    Ok(requested)
}

/// Closes the gap left at `removed_idx` under `parent_uid`.
pub fn compact_after(conn: &Connection, parent_uid: ItemUid, removed_idx: u32) -> RepoResult<()> {
    conn.execute(
        "UPDATE item
         SET idx = idx - 1
         WHERE parent_uid = ?1
           AND idx > ?2;",
        params![parent_uid, removed_idx],
    )?;
    Ok(())
}
