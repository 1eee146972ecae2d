use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Upper bound on a single backoff wait, however large the retry chain gets.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    #[serde(default = "default_incoming_dir")]
    pub incoming_dir: String,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: String,
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub retry_backoff_factor: f64,
    #[serde(default = "default_initial_delay")]
    pub retry_initial_delay_secs: f64,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_journal_page_size")]
    pub journal_page_size: usize,
    #[serde(default = "default_true")]
    pub enable_scheduler: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_worker_poll_interval")]
    pub worker_poll_interval_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_incoming_dir() -> String {
    "incoming".to_string()
}

fn default_processed_dir() -> String {
    "processed".to_string()
}

fn default_quarantine_dir() -> String {
    "failed_conversions".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./fns.db")
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_initial_delay() -> f64 {
    1.0
}

fn default_polling_interval() -> u64 {
    300
}

fn default_journal_page_size() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_worker_poll_interval() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            incoming_dir: default_incoming_dir(),
            processed_dir: default_processed_dir(),
            quarantine_dir: default_quarantine_dir(),
            database_path: default_database_path(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_retries: default_max_retries(),
            retry_backoff_factor: default_backoff_factor(),
            retry_initial_delay_secs: default_initial_delay(),
            polling_interval_secs: default_polling_interval(),
            journal_page_size: default_journal_page_size(),
            enable_scheduler: true,
            queue_capacity: default_queue_capacity(),
            worker_poll_interval_ms: default_worker_poll_interval(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Settings with every storage location placed under `root`.
    pub fn rooted_at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            storage_root: root.join("storage"),
            database_path: root.join("fns.db"),
            ..Self::default()
        }
    }

    pub fn incoming_path(&self) -> PathBuf {
        self.storage_root.join(&self.incoming_dir)
    }

    pub fn processed_path(&self) -> PathBuf {
        self.storage_root.join(&self.processed_dir)
    }

    pub fn quarantine_path(&self) -> PathBuf {
        self.storage_root.join(&self.quarantine_dir)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    /// Backoff before the retry that follows failed attempt number `retry_count`.
    ///
    /// `retry_count` is 1-based: the first failure waits the initial delay.
    /// Growth saturates at [`MAX_RETRY_DELAY`].
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        if self.retry_initial_delay_secs.is_nan() || self.retry_initial_delay_secs <= 0.0 {
            return Duration::ZERO;
        }
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.retry_initial_delay_secs * self.retry_backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= MAX_RETRY_DELAY.as_secs_f64() {
            return MAX_RETRY_DELAY;
        }
        Duration::from_secs_f64(secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(invalid("max_concurrent_jobs", "must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be at least 1"));
        }
        if self.worker_poll_interval_ms == 0 {
            return Err(invalid("worker_poll_interval_ms", "must be at least 1"));
        }
        if self.polling_interval_secs == 0 {
            return Err(invalid("polling_interval_secs", "must be at least 1"));
        }
        if self.journal_page_size == 0 {
            return Err(invalid("journal_page_size", "must be at least 1"));
        }
        if !self.retry_backoff_factor.is_finite() || self.retry_backoff_factor < 1.0 {
            return Err(invalid("retry_backoff_factor", "must be a finite number >= 1.0"));
        }
        if !self.retry_initial_delay_secs.is_finite() || self.retry_initial_delay_secs < 0.0 {
            return Err(invalid(
                "retry_initial_delay_secs",
                "must be a finite number >= 0.0",
            ));
        }

        let partitions = [
            ("incoming_dir", &self.incoming_dir),
            ("processed_dir", &self.processed_dir),
            ("quarantine_dir", &self.quarantine_dir),
        ];
        for (key, dir) in partitions {
            if dir.trim().is_empty() {
                return Err(invalid(key, "must not be empty"));
            }
        }
        if self.incoming_dir == self.processed_dir
            || self.incoming_dir == self.quarantine_dir
            || self.processed_dir == self.quarantine_dir
        {
            return Err(ConfigError::Validation {
                message: "incoming, processed and quarantine directories must differ".to_string(),
            });
        }

        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
