//! Errors surfaced by the public case/item API.

use crate::codec::CodecError;
use crate::db::DbError;
use crate::model::item::{EvidenceUid, ItemUid};
use crate::repo::RepoError;
use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CaseResult<T> = Result<T, CaseError>;

/// Errors from case and item operations.
#[derive(Debug)]
pub enum CaseError {
    /// Handle is unbound or its item was removed.
    InvalidItem,
    /// Operation is not allowed on the tree root.
    RootItem,
    /// Requested sibling position is outside `1..=N+1`.
    IndexOutOfRange {
        parent_uid: ItemUid,
        requested: u32,
        max_idx: u32,
    },
    /// Caller passed an unusable argument.
    InvalidArgument(String),
    /// Item row does not exist (any more).
    ItemNotFound(ItemUid),
    /// Evidence row does not exist or belongs to another item.
    EvidenceNotFound(EvidenceUid),
    /// Case configuration failed validation.
    InvalidConfig(String),
    /// SQLite/bootstrap failure.
    Db(DbError),
    /// Filesystem failure.
    Io(StorageError),
    /// Stored bytes could not be decoded.
    Codec { context: String, source: CodecError },
    /// Persisted rows that cannot form a valid read model.
    Repo(RepoError),
}

impl Display for CaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidItem => write!(f, "item handle is unbound or removed"),
            Self::RootItem => write!(f, "operation not allowed on the root item"),
            Self::IndexOutOfRange {
                parent_uid,
                requested,
                max_idx,
            } => write!(
                f,
                "index {requested} out of range 1..={} under item {parent_uid}",
                max_idx + 1
            ),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::ItemNotFound(uid) => write!(f, "item not found: {uid}"),
            Self::EvidenceNotFound(uid) => write!(f, "evidence not found: {uid}"),
            Self::InvalidConfig(message) => write!(f, "invalid case config: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Codec { context, source } => write!(f, "cannot decode {context}: {source}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CaseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Codec { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CaseError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Db(err) => Self::Db(err),
            RepoError::Storage(err) => err.into(),
            RepoError::Codec { context, source } => Self::Codec { context, source },
            RepoError::ItemNotFound(uid) => Self::ItemNotFound(uid),
            RepoError::EvidenceNotFound(uid) => Self::EvidenceNotFound(uid),
            RepoError::IndexOutOfRange {
                parent_uid,
                requested,
                max_idx,
            } => Self::IndexOutOfRange {
                parent_uid,
                requested,
                max_idx,
            },
            RepoError::InvalidValue(message) => Self::InvalidArgument(message),
            other => Self::Repo(other),
        }
    }
}

impl From<StorageError> for CaseError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::InvalidPath(_) | StorageError::InvalidAttributeId(_) => {
                Self::InvalidArgument(value.to_string())
            }
            io @ StorageError::Io { .. } => Self::Io(io),
        }
    }
}

impl From<DbError> for CaseError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CaseError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

#[cfg(test)]
mod tests {
    use super::CaseError;
    use crate::repo::RepoError;
    use crate::storage::StorageError;

    #[test]
    fn repo_errors_map_to_semantic_kinds() {
        let err: CaseError = RepoError::IndexOutOfRange {
            parent_uid: 1,
            requested: 9,
            max_idx: 2,
        }
        .into();
        assert!(matches!(err, CaseError::IndexOutOfRange { requested: 9, .. }));
        assert_eq!(err.to_string(), "index 9 out of range 1..=3 under item 1");

        let err: CaseError =
            RepoError::Storage(StorageError::InvalidAttributeId("a/b".to_string())).into();
        assert!(matches!(err, CaseError::InvalidArgument(_)));

        let err: CaseError = RepoError::InvalidValue("too deep".to_string()).into();
        assert!(matches!(err, CaseError::InvalidArgument(message) if message == "too deep"));

        let err: CaseError = RepoError::ItemNotFound(5).into();
        assert!(matches!(err, CaseError::ItemNotFound(5)));
    }
}
