//! Filesystem layout for originals and their derivatives.
//!
//! Originals live under `root/uploads/<user>/<album>/<photo>` as the exact
//! uploaded bytes, with the photo identifier as the file name. Derivatives
//! live under `root/cache/<user>/<album>/<label>/<photo>.webp`, so the
//! serving layer can compute a derivative path without consulting the
//! generator.

use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extension every derivative carries, regardless of which backend wrote it.
pub const DERIVATIVE_EXTENSION: &str = "webp";

/// Labels the deletion path cleans up. Matches the default size spec.
pub const SIZE_LABELS: [&str; 3] = ["large", "medium", "thumb"];

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn original_dir(&self, user_uuid: &str, album_uuid: &str) -> PathBuf {
        self.root.join("uploads").join(user_uuid).join(album_uuid)
    }

    pub fn original_path(&self, user_uuid: &str, album_uuid: &str, photo_uuid: &str) -> PathBuf {
        self.original_dir(user_uuid, album_uuid).join(photo_uuid)
    }

    pub fn derivative_dir(&self, user_uuid: &str, album_uuid: &str) -> PathBuf {
        self.root.join("cache").join(user_uuid).join(album_uuid)
    }

    pub fn derivative_path(
        &self,
        user_uuid: &str,
        album_uuid: &str,
        size_label: &str,
        original_base: &str,
    ) -> PathBuf {
        self.derivative_dir(user_uuid, album_uuid)
            .join(size_label)
            .join(format!("{original_base}.{DERIVATIVE_EXTENSION}"))
    }

    /// Idempotent, lazy directory creation.
    pub fn ensure_dir(path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    /// Best-effort removal of a photo's original and all derivative files.
    ///
    /// Already-gone files are fine; other unlink failures are logged and
    /// ignored (the metadata row is deleted first, so leftovers are orphan
    /// cache debris, not dangling references). Directories are never removed.
    pub fn delete_photo_files(&self, user_uuid: &str, album_uuid: &str, original: &Path) {
        unlink_if_exists(original);

        let Some(base) = original.file_stem().and_then(|s| s.to_str()) else {
            return;
        };
        for label in SIZE_LABELS {
            unlink_if_exists(&self.derivative_path(user_uuid, album_uuid, label, base));
        }
    }
}

fn unlink_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove {}: {}", path.display(), e),
    }
}
