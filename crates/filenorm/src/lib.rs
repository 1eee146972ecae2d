pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod render;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use config::{load_settings, LoggingConfig, Settings};
pub use db::job_repo::JobFilter;
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, FilenormError, RenderError, Result, StorageError, WorkerError,
};
pub use manager::JobManager;
pub use render::{Asset, RenderedDocument, Renderer, TextRenderer};
pub use storage::{fingerprint, LocalStorage, SourceStore};
pub use worker::{Job, JobStats, JobStatus};
