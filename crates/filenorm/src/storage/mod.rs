pub mod filesystem;

pub use filesystem::LocalStorage;

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::render::Asset;

/// Staging area with three partitions: incoming, processed and quarantine.
///
/// Paths are `/`-separated and relative to the incoming partition.
/// Writes into the processed and quarantine partitions never expose a
/// partially written file.
pub trait SourceStore: Send + Sync {
    fn ensure_dirs(&self) -> Result<(), StorageError>;

    /// Fails with [`StorageError::SourceNotFound`] when the file is absent.
    fn read_source(&self, source_path: &str) -> Result<Vec<u8>, StorageError>;

    /// Every file below incoming, sorted.
    fn list_incoming(&self) -> Result<Vec<String>, StorageError>;

    /// Writes the rendered text and its assets; returns the output location.
    fn write_processed(
        &self,
        source_path: &str,
        text: &str,
        assets: &[Asset],
    ) -> Result<String, StorageError>;

    /// Moves the source into quarantine; returns its new location.
    fn move_to_quarantine(&self, source_path: &str) -> Result<String, StorageError>;

    fn source_exists(&self, source_path: &str) -> bool;

    fn processed_exists(&self, source_path: &str) -> bool;
}

/// Hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Validates a `/`-separated relative path and converts it to a `PathBuf`.
///
/// Rejects empty, absolute and parent-escaping paths.
pub fn relative_path(path: &str) -> Result<PathBuf, StorageError> {
    let invalid = |reason: &str| StorageError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(invalid("parent directory components are not allowed"))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative"))
            }
        }
    }

    if out.as_os_str().is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(out)
}

/// Joins path components with `/` regardless of platform.
pub(crate) fn to_slash_path(path: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = path
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    parts.map(|p| p.join("/"))
}
