//! Per-item data directory resolution.

use super::{StorageError, StorageResult};
use crate::model::item::ItemUid;
use std::path::{Component, Path, PathBuf};

/// Resolves item-relative paths under the case data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPathResolver {
    data_root: PathBuf,
}

impl DataPathResolver {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Returns `<data_root>/<uid:04>`.
    pub fn item_dir(&self, uid: ItemUid) -> PathBuf {
        self.data_root.join(format!("{uid:04}"))
    }

    /// Composes `<data_root>/<uid:04>/<relpath>` without touching the disk.
    ///
    /// # Errors
    /// - `InvalidPath` when `relpath` is absolute or contains `..`.
    pub fn resolve(&self, uid: ItemUid, relpath: impl AsRef<Path>) -> StorageResult<PathBuf> {
        let relpath = relpath.as_ref();
        let escapes = relpath
            .components()
            .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StorageError::InvalidPath(relpath.display().to_string()));
        }
        Ok(self.item_dir(uid).join(relpath))
    }

    /// Resolves `relpath` and creates every missing parent directory.
    ///
    /// The final component itself is not created, so the returned path can
    /// be opened as a file or created as a directory by the caller.
    pub fn create(&self, uid: ItemUid, relpath: impl AsRef<Path>) -> StorageResult<PathBuf> {
        let path = self.resolve(uid, relpath)?;
        let parent = path.parent().unwrap_or(self.data_root.as_path());
        std::fs::create_dir_all(parent)
            .map_err(|err| StorageError::io("create directory", parent, err))?;
        Ok(path)
    }

    /// Recursively removes the item directory.
    ///
    /// Returns `false` when the directory did not exist.
    pub fn remove_item_dir(&self, uid: ItemUid) -> StorageResult<bool> {
        let dir = self.item_dir(uid);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::io("remove directory", dir, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DataPathResolver;
    use crate::storage::StorageError;
    use std::path::Path;

    #[test]
    fn item_dir_pads_uid_to_four_digits() {
        let resolver = DataPathResolver::new("/case/data");
        assert_eq!(resolver.item_dir(1), Path::new("/case/data/0001"));
        assert_eq!(resolver.item_dir(12345), Path::new("/case/data/12345"));
    }

    #[test]
    fn resolve_rejects_escaping_paths() {
        let resolver = DataPathResolver::new("/case/data");
        assert!(matches!(
            resolver.resolve(7, "../0008/secret"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            resolver.resolve(7, "/etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert_eq!(
            resolver.resolve(7, "thumbs/a.png").unwrap(),
            Path::new("/case/data/0007/thumbs/a.png")
        );
    }

    #[test]
    fn create_makes_parents_and_remove_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DataPathResolver::new(dir.path().join("data"));

        let path = resolver.create(3, "carved/files/a.bin").unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
        std::fs::write(&path, b"x").unwrap();

        assert!(resolver.remove_item_dir(3).unwrap());
        assert!(!resolver.item_dir(3).exists());
        assert!(!resolver.remove_item_dir(3).unwrap());
    }
}
