//! Test harness for isolated execution.
//!
//! Every harness owns a temp directory holding the storage root and the
//! database file, with settings tuned for fast tests (short poll interval,
//! tiny retry delays, scheduler off).

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use filenorm::{Database, Job, JobManager, JobStatus, LocalStorage, Renderer, Settings};

pub struct TestHarness {
    temp_dir: TempDir,
    pub settings: Settings,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut settings = Settings::rooted_at(temp_dir.path());
        settings.enable_scheduler = false;
        settings.max_concurrent_jobs = 2;
        settings.worker_poll_interval_ms = 10;
        settings.retry_initial_delay_secs = 0.01;
        settings.retry_backoff_factor = 2.0;

        let harness = Self { temp_dir, settings };
        for dir in [
            harness.incoming_dir(),
            harness.processed_dir(),
            harness.quarantine_dir(),
        ] {
            std::fs::create_dir_all(dir).expect("Failed to create storage dir");
        }
        harness
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn incoming_dir(&self) -> PathBuf {
        self.settings.incoming_path()
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.settings.processed_path()
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.settings.quarantine_path()
    }

    /// Writes a file below incoming, creating parent directories.
    pub fn write_incoming(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.incoming_dir().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create incoming subdir");
        }
        std::fs::write(&path, content).expect("Failed to write incoming file");
        path
    }

    pub fn remove_incoming(&self, rel: &str) {
        std::fs::remove_file(self.incoming_dir().join(rel)).expect("Failed to remove source");
    }

    /// Reads a file relative to the storage root, e.g. `processed/a.md`.
    pub fn read_stored(&self, location: &str) -> Option<String> {
        std::fs::read_to_string(self.settings.storage_root.join(location)).ok()
    }

    pub fn open_db(&self) -> Database {
        Database::open(&self.settings.database_path).expect("Failed to open database")
    }

    /// A manager over a fresh handle to the harness database.
    pub fn manager(&self, renderer: Arc<dyn Renderer>) -> JobManager {
        self.manager_with(self.settings.clone(), renderer)
    }

    pub fn manager_with(&self, settings: Settings, renderer: Arc<dyn Renderer>) -> JobManager {
        let store = Arc::new(LocalStorage::new(&settings));
        JobManager::new(settings, self.open_db(), store, renderer)
    }
}

/// Polls `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Waits for `job_id` to reach `status`; panics with the last seen state.
pub fn wait_for_status(manager: &JobManager, job_id: &str, status: JobStatus) -> Job {
    let mut last = None;
    let reached = wait_until(Duration::from_secs(10), || {
        last = manager.get_job(job_id).expect("get_job failed");
        last.as_ref().map(|j| j.status == status).unwrap_or(false)
    });
    assert!(
        reached,
        "job {} never reached {}; last seen: {:?}",
        job_id, status, last
    );
    last.expect("job disappeared")
}
