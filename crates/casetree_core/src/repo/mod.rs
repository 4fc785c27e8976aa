//! Repository layer: SQL access for items, attributes, events, datasources
//! and evidence.
//!
//! # Responsibility
//! - Keep SQL details inside the persistence boundary.
//! - Return semantic errors (`ItemNotFound`, `IndexOutOfRange`) in addition
//!   to transport errors.
//!
//! # Invariants
//! - Repositories never open transactions themselves; callers choose the
//!   write scope (see `crate::db::write_scope`).
//! - Every mutating repository call appends one event for the owning item.

use crate::codec::{check_depth, encode, CodecError};
use crate::db::DbError;
use crate::model::data::Data;
use crate::model::item::{EvidenceUid, ItemUid};
use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod attribute_repo;
pub mod datasource_repo;
pub mod event_repo;
pub mod evidence_repo;
pub mod index_allocator;
pub mod item_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for repository and storage operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Storage(StorageError),
    /// Stored bytes could not be decoded.
    Codec {
        context: String,
        source: CodecError,
    },
    ItemNotFound(ItemUid),
    EvidenceNotFound(EvidenceUid),
    IndexOutOfRange {
        parent_uid: ItemUid,
        requested: u32,
        max_idx: u32,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Value cannot be stored as given.
    InvalidValue(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Codec { context, source } => write!(f, "cannot decode {context}: {source}"),
            Self::ItemNotFound(uid) => write!(f, "item not found: {uid}"),
            Self::EvidenceNotFound(uid) => write!(f, "evidence not found: {uid}"),
            Self::IndexOutOfRange {
                parent_uid,
                requested,
                max_idx,
            } => write!(
                f,
                "index {requested} out of range 1..={} under item {parent_uid}",
                max_idx + 1
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted case data: {message}"),
            Self::InvalidValue(message) => write!(f, "value rejected: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Codec { source, .. } => Some(source),
            Self::ItemNotFound(_) => None,
            Self::EvidenceNotFound(_) => None,
            Self::IndexOutOfRange { .. } => None,
            Self::InvalidData(_) => None,
            Self::InvalidValue(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<StorageError> for RepoError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

/// Encodes a value about to be stored.
///
/// Values that `decode` would refuse to read back are rejected here, before
/// any row or file is touched.
pub(crate) fn encode_for_write(value: &Data, context: &str) -> RepoResult<Vec<u8>> {
    check_depth(value).map_err(|err| RepoError::InvalidValue(format!("{context}: {err}")))?;
    Ok(encode(value))
}

/// Current wall clock as Unix epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// Converts a stored integer column into a 1-based sibling index.
pub(crate) fn parse_idx(value: i64, column: &'static str) -> RepoResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|idx| *idx >= 1)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid index `{value}` in {column}")))
}
