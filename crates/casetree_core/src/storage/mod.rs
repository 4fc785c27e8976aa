//! Filesystem side of a case: per-item data directories and attribute
//! overflow files.
//!
//! # Responsibility
//! - Map item uids to deterministic directories under the case data root.
//! - Decide whether an encoded attribute value is stored inline or spilled
//!   to a sidecar file.
//! - Keep file changes undoable until the database write they belong to
//!   commits.
//!
//! # Invariants
//! - Item directories are `<data_root>/<uid padded to 4 digits>`.
//! - Resolved paths never escape the item directory.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub mod data_path;
pub mod journal;
pub mod overflow;

pub use data_path::DataPathResolver;
pub use journal::FileJournal;
pub use overflow::{
    is_sentinel, validate_attribute_id, OverflowStore, DEFAULT_OVERFLOW_THRESHOLD,
    OVERFLOW_SENTINEL,
};

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from data directory and overflow file handling.
#[derive(Debug)]
pub enum StorageError {
    /// Filesystem call failed for `path`.
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// Relative path is absolute or climbs out of the item directory.
    InvalidPath(String),
    /// Attribute id cannot be used as an overflow file name.
    InvalidAttributeId(String),
}

impl StorageError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { op, path, source } => {
                write!(f, "failed to {op} `{}`: {source}", path.display())
            }
            Self::InvalidPath(path) => write!(f, "invalid item data path `{path}`"),
            Self::InvalidAttributeId(id) => write!(f, "invalid attribute id `{id}`"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::InvalidPath(_) => None,
            Self::InvalidAttributeId(_) => None,
        }
    }
}
