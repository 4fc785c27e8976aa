//! Domain model for the case item tree.
//!
//! # Responsibility
//! - Define the variant value type shared by attributes, datasource state and
//!   evidence attributes.
//! - Define read models returned by repositories.
//!
//! # Invariants
//! - Every item is identified by a stable `ItemUid`.
//! - Removal is a hard delete; removed uids are never handed out again.

pub mod data;
pub mod item;
