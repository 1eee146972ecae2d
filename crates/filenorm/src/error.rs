use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilenormError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl FilenormError {
    /// True when the error means the source file does not exist in incoming.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::SourceNotFound(_)))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid relative path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Renderer panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn {name} thread: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Job manager is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, FilenormError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err: FilenormError = StorageError::SourceNotFound("a.txt".to_string()).into();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("a.txt"));

        let err: FilenormError = RenderError::Conversion("boom".to_string()).into();
        assert!(!err.is_not_found());
    }
}
