//! Pending filesystem changes of the current write scope.
//!
//! # Responsibility
//! - Record overflow file replacements and item directory removals made
//!   while a database write scope is open.
//! - Settle them together with that scope: keep them on commit, undo them
//!   on rollback.
//!
//! # Invariants
//! - A replaced or removed file is renamed to a backup next to it and only
//!   deleted on `commit`.
//! - `rollback` undoes entries newest first, so a file touched several times
//!   in one scope ends up as it was before the scope.
//! - Item directories scheduled for removal are deleted only on `commit`.
//! - A crash before settling can leave `*.bak` files beside overflow files;
//!   they are never read back.

use super::{DataPathResolver, StorageError, StorageResult};
use crate::model::item::ItemUid;
use log::{debug, warn};
use std::cell::RefCell;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const BACKUP_EXTENSION: &str = "bak";

static NEXT_BACKUP: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
enum FileChange {
    /// `path` was moved aside to `backup`.
    Stashed { path: PathBuf, backup: PathBuf },
    /// `path` did not exist before the scope.
    Created { path: PathBuf },
    DirRemoval { uid: ItemUid },
}

/// Undo log for filesystem writes that accompany database writes.
#[derive(Debug, Default)]
pub struct FileJournal {
    changes: RefCell<Vec<FileChange>>,
}

impl FileJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of changes waiting for commit or rollback.
    pub fn pending(&self) -> usize {
        self.changes.borrow().len()
    }

    /// Moves an existing file aside so it can be restored on rollback.
    ///
    /// Returns `false` when no file existed.
    pub fn stash(&self, path: &Path) -> StorageResult<bool> {
        let backup = backup_path(path);
        match std::fs::rename(path, &backup) {
            Ok(()) => {
                self.changes.borrow_mut().push(FileChange::Stashed {
                    path: path.to_path_buf(),
                    backup,
                });
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::io("stash", path, err)),
        }
    }

    /// Records a file that was absent before this scope wrote it.
    pub fn record_created(&self, path: &Path) {
        self.changes.borrow_mut().push(FileChange::Created {
            path: path.to_path_buf(),
        });
    }

    /// Schedules the data directory of `uid` for removal on commit.
    pub fn defer_dir_removal(&self, uid: ItemUid) {
        self.changes
            .borrow_mut()
            .push(FileChange::DirRemoval { uid });
    }

    /// Makes every pending change permanent.
    ///
    /// The database side has already committed at this point, so failures
    /// are logged and leave stray files behind instead of failing the call.
    pub fn commit(&self, paths: &DataPathResolver) {
        let changes = self.changes.take();
        if changes.is_empty() {
            return;
        }
        let count = changes.len();
        for change in changes {
            let result = match change {
                FileChange::Stashed { backup, .. } => remove_if_present(&backup),
                FileChange::Created { .. } => Ok(()),
                FileChange::DirRemoval { uid } => paths.remove_item_dir(uid).map(|_| ()),
            };
            if let Err(err) = result {
                warn!("event=journal_commit module=storage status=error error={err}");
            }
        }
        debug!("event=journal_commit module=storage status=ok changes={count}");
    }

    /// Undoes every pending change, newest first.
    pub fn rollback(&self) {
        let changes = self.changes.take();
        if changes.is_empty() {
            return;
        }
        let count = changes.len();
        for change in changes.into_iter().rev() {
            let result = match change {
                FileChange::Stashed { path, backup } => std::fs::rename(&backup, &path)
                    .map_err(|err| StorageError::io("restore", backup, err)),
                FileChange::Created { path } => remove_if_present(&path),
                FileChange::DirRemoval { .. } => Ok(()),
            };
            if let Err(err) = result {
                warn!("event=journal_rollback module=storage status=error error={err}");
            }
        }
        debug!("event=journal_rollback module=storage status=ok changes={count}");
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(
        ".{}-{}.{BACKUP_EXTENSION}",
        std::process::id(),
        NEXT_BACKUP.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> StorageResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageError::io("remove", path, err)),
    }
}
