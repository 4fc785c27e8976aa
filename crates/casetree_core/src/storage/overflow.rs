//! Inline vs. sidecar-file storage policy for attribute values.
//!
//! # Invariants
//! - A value is spilled iff its encoded length is greater than the threshold.
//! - A spilled attribute's row holds exactly `OVERFLOW_SENTINEL`; the file at
//!   `<item_dir>/attrs/<id>.pod` holds the full encoding.
//! - Overflow files are written to a temporary name and renamed into place,
//!   so readers never see a partially written file.
//! - Replaced and removed files go through the store's `FileJournal` and are
//!   restored when the surrounding write scope rolls back.

use super::{DataPathResolver, FileJournal, StorageError, StorageResult};
use crate::model::item::ItemUid;
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stored in the attribute row in place of a spilled value.
pub const OVERFLOW_SENTINEL: [u8; 16] = [
    0xDE, 0xEA, 0xBE, 0xEF, 0xC0, 0xC0, 0xA0, b'M', b'O', b'B', b'I', b'U', b'S', b'P', b'O', b'D',
];

/// Largest encoded value kept inline (32 MiB).
pub const DEFAULT_OVERFLOW_THRESHOLD: usize = 32 * 1024 * 1024;

const OVERFLOW_DIR: &str = "attrs";
const OVERFLOW_EXTENSION: &str = "pod";

/// Returns whether stored row bytes mark a spilled value.
pub fn is_sentinel(bytes: &[u8]) -> bool {
    bytes == OVERFLOW_SENTINEL.as_slice()
}

/// Checks that `id` can be used as an overflow file stem.
///
/// # Errors
/// - `InvalidAttributeId` for empty ids, `.`/`..`, and ids containing path
///   separators or NUL.
pub fn validate_attribute_id(id: &str) -> StorageResult<()> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidAttributeId(id.to_string()));
    }
    Ok(())
}

/// Sidecar file store for oversized attribute values.
#[derive(Debug)]
pub struct OverflowStore {
    paths: DataPathResolver,
    threshold: usize,
    journal: FileJournal,
}

impl OverflowStore {
    pub fn new(paths: DataPathResolver, threshold: usize) -> Self {
        Self {
            paths,
            threshold,
            journal: FileJournal::new(),
        }
    }

    pub fn paths(&self) -> &DataPathResolver {
        &self.paths
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns whether a value of `encoded_len` bytes goes to a file.
    pub fn should_spill(&self, encoded_len: usize) -> bool {
        encoded_len > self.threshold
    }

    /// Returns the deterministic overflow file path for one attribute.
    pub fn overflow_path(&self, uid: ItemUid, id: &str) -> StorageResult<PathBuf> {
        validate_attribute_id(id)?;
        self.paths
            .resolve(uid, format!("{OVERFLOW_DIR}/{id}.{OVERFLOW_EXTENSION}"))
    }

    /// Changes not yet settled by a commit or rollback.
    pub fn journal(&self) -> &FileJournal {
        &self.journal
    }

    /// Keeps every file change made since the last settle.
    pub fn commit_pending(&self) {
        self.journal.commit(&self.paths);
    }

    /// Restores the files as they were at the last settle.
    pub fn rollback_pending(&self) {
        self.journal.rollback();
    }

    /// Schedules the data directory of `uid` for removal on commit.
    pub fn defer_item_dir_removal(&self, uid: ItemUid) {
        self.journal.defer_dir_removal(uid);
    }

    /// Writes the encoded value to its overflow file, replacing any old one.
    ///
    /// The old file is kept aside until the journal settles.
    pub fn write(&self, uid: ItemUid, id: &str, encoded: &[u8]) -> StorageResult<PathBuf> {
        validate_attribute_id(id)?;
        let path = self
            .paths
            .create(uid, format!("{OVERFLOW_DIR}/{id}.{OVERFLOW_EXTENSION}"))?;
        self.journal.stash(&path)?;

        let tmp_path = path.with_extension(format!("{OVERFLOW_EXTENSION}.tmp"));
        if let Err(err) = write_synced(&tmp_path, encoded) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }
        if let Err(err) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StorageError::io("rename", &tmp_path, err));
        }
        self.journal.record_created(&path);

        debug!(
            "event=overflow_write module=storage status=ok uid={} bytes={}",
            uid,
            encoded.len()
        );
        Ok(path)
    }

    /// Reads the encoded value back from its overflow file.
    pub fn read(&self, uid: ItemUid, id: &str) -> StorageResult<Vec<u8>> {
        let path = self.overflow_path(uid, id)?;
        std::fs::read(&path).map_err(|err| StorageError::io("read", path, err))
    }

    /// Removes the overflow file if present; it is deleted for good when
    /// the journal commits.
    ///
    /// Returns `false` when no file existed.
    pub fn remove(&self, uid: ItemUid, id: &str) -> StorageResult<bool> {
        let path = self.overflow_path(uid, id)?;
        self.journal.stash(&path)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file =
        std::fs::File::create(path).map_err(|err| StorageError::io("create", path, err))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|err| StorageError::io("write", path, err))
}
