use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A conversion job. The only persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Path relative to the incoming partition, `/`-separated.
    pub source_path: String,
    /// Hex SHA-256 of the source bytes at last read.
    pub content_fingerprint: String,
    pub status: JobStatus,
    /// Failed attempts in the current chain.
    pub retry_count: u32,
    pub error_message: Option<String>,
    /// Output location relative to the storage root; set only when completed.
    pub processed_path: Option<String>,
    /// Tombstone: the source vanished from incoming.
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh queued job stamped with `now`.
    pub fn new(source_path: String, content_fingerprint: String, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_path,
            content_fingerprint,
            status: JobStatus::Queued,
            retry_count: 0,
            error_message: None,
            processed_path: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Filename component of the source path, handed to the renderer.
    pub fn source_filename(&self) -> &str {
        self.source_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.source_path)
    }

    /// Whether a re-ingest of `fingerprint` can be skipped.
    pub fn is_up_to_date(&self, fingerprint: &str, output_present: bool) -> bool {
        self.status == JobStatus::Completed
            && !self.is_deleted
            && output_present
            && self.content_fingerprint == fingerprint
    }

    /// Resets the job for a new processing chain.
    pub fn requeue(&mut self, fingerprint: String, now: DateTime<Utc>) {
        self.content_fingerprint = fingerprint;
        self.status = JobStatus::Queued;
        self.retry_count = 0;
        self.error_message = None;
        self.processed_path = None;
        self.is_deleted = false;
        self.updated_at = now;
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobStats {
    pub fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
        }
    }

    pub(crate) fn set(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Queued => self.queued = count,
            JobStatus::Processing => self.processing = count,
            JobStatus::Completed => self.completed = count,
            JobStatus::Failed => self.failed = count,
        }
    }

    pub fn total(&self) -> u64 {
        self.queued + self.processing + self.completed + self.failed
    }
}
