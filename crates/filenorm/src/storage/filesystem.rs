use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::config::Settings;
use crate::error::StorageError;
use crate::render::Asset;
use crate::storage::{relative_path, to_slash_path, SourceStore};

/// Writes `content` to a temp file next to `dest`, then renames it into place.
fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), StorageError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    ensure_directory(parent)?;

    let write_err = |e: std::io::Error| StorageError::WriteFile {
        path: dest.to_path_buf(),
        source: e,
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(content).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(dest).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Move a file from `src` to `dst`. Uses `rename` first (atomic on the same
/// filesystem). Across devices, copies into a temp file beside `dst`,
/// renames that into place, then removes the original.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if let Some(parent) = dst.parent() {
        ensure_directory(parent)?;
    }

    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let move_err = |e: std::io::Error| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    };

    let content = std::fs::read(src).map_err(move_err)?;
    write_atomic(dst, &content)?;
    std::fs::remove_file(src).map_err(move_err)?;
    Ok(())
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Local filesystem staging area rooted at one directory.
pub struct LocalStorage {
    incoming: PathBuf,
    processed: PathBuf,
    quarantine: PathBuf,
    processed_dir: String,
    quarantine_dir: String,
}

impl LocalStorage {
    pub fn new(settings: &Settings) -> Self {
        Self {
            incoming: settings.incoming_path(),
            processed: settings.processed_path(),
            quarantine: settings.quarantine_path(),
            processed_dir: settings.processed_dir.clone(),
            quarantine_dir: settings.quarantine_dir.clone(),
        }
    }

    pub fn incoming_directory(&self) -> &Path {
        &self.incoming
    }

    pub fn processed_directory(&self) -> &Path {
        &self.processed
    }

    pub fn quarantine_directory(&self) -> &Path {
        &self.quarantine
    }

    /// Output path relative to the processed partition: source with `.md`.
    fn output_relative(source_path: &str) -> Result<PathBuf, StorageError> {
        Ok(relative_path(source_path)?.with_extension("md"))
    }

    fn location(partition: &str, relative: &Path) -> String {
        match to_slash_path(relative) {
            Some(rel) => format!("{}/{}", partition, rel),
            None => format!("{}/{}", partition, relative.display()),
        }
    }
}

impl SourceStore for LocalStorage {
    fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [&self.incoming, &self.processed, &self.quarantine] {
            ensure_directory(dir)?;
        }
        Ok(())
    }

    fn read_source(&self, source_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.incoming.join(relative_path(source_path)?);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::SourceNotFound(source_path.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    fn list_incoming(&self) -> Result<Vec<String>, StorageError> {
        if !self.incoming.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.incoming).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(StorageError::ScanFailed {
                        path: self.incoming.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    log::warn!("Skipping unreadable incoming entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(&self.incoming) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            match to_slash_path(relative) {
                Some(path) => files.push(path),
                None => log::warn!(
                    "Skipping non UTF-8 incoming path: {}",
                    entry.path().display()
                ),
            }
        }

        files.sort();
        log::debug!(
            "Listed {} incoming files in {}",
            files.len(),
            self.incoming.display()
        );
        Ok(files)
    }

    fn write_processed(
        &self,
        source_path: &str,
        text: &str,
        assets: &[Asset],
    ) -> Result<String, StorageError> {
        let relative = Self::output_relative(source_path)?;
        let dest = self.processed.join(&relative);
        let asset_base = dest.parent().unwrap_or(&self.processed).to_path_buf();

        // Assets first, so the text never references a missing file.
        for asset in assets {
            let asset_path = asset_base.join(relative_path(&asset.path)?);
            write_atomic(&asset_path, &asset.data)?;
        }
        write_atomic(&dest, text.as_bytes())?;

        Ok(Self::location(&self.processed_dir, &relative))
    }

    fn move_to_quarantine(&self, source_path: &str) -> Result<String, StorageError> {
        let relative = relative_path(source_path)?;
        let src = self.incoming.join(&relative);
        if !src.is_file() {
            return Err(StorageError::SourceNotFound(source_path.to_string()));
        }

        move_file(&src, &self.quarantine.join(&relative))?;
        Ok(Self::location(&self.quarantine_dir, &relative))
    }

    fn source_exists(&self, source_path: &str) -> bool {
        relative_path(source_path)
            .map(|rel| self.incoming.join(rel).is_file())
            .unwrap_or(false)
    }

    fn processed_exists(&self, source_path: &str) -> bool {
        Self::output_relative(source_path)
            .map(|rel| self.processed.join(rel).is_file())
            .unwrap_or(false)
    }
}
