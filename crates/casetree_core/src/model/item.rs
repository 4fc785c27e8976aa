//! Item tree read models.
//!
//! # Invariants
//! - `ROOT_ITEM_UID` is created by the first migration and never removed.
//! - For one parent, child `idx` values are exactly `1..=N`.

use crate::model::data::DataMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Row identifier of an item. Uids are never reused within one case.
pub type ItemUid = i64;

/// Row identifier of an evidence record.
pub type EvidenceUid = i64;

/// Uid of the tree root.
pub const ROOT_ITEM_UID: ItemUid = 1;

/// One row of the `item` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub uid: ItemUid,
    /// `None` only for the root.
    pub parent_uid: Option<ItemUid>,
    /// 1-based position among siblings.
    pub idx: u32,
    pub category: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// One append-only audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEvent {
    pub uid: i64,
    pub item_uid: ItemUid,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub text: String,
}

/// Typed artifact attached to an item.
///
/// `attributes` and `tags` are a detached copy; changes are persisted with
/// `Item::save_evidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub uid: EvidenceUid,
    pub item_uid: ItemUid,
    /// Serialized as `type` to match the table column.
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: DataMap,
    pub tags: BTreeSet<String>,
}

impl Evidence {
    /// Returns whether `tag` is set on this evidence.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
