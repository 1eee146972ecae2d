//! Job event broadcaster for in-process observers of job transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::{Job, JobStatus};

/// What caused a transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Created,
    Requeued,
    Claimed,
    Completed,
    RetryScheduled,
    Failed,
    Tombstoned,
    Recovered,
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobEventKind::Created => write!(f, "Created"),
            JobEventKind::Requeued => write!(f, "Requeued"),
            JobEventKind::Claimed => write!(f, "Claimed"),
            JobEventKind::Completed => write!(f, "Completed"),
            JobEventKind::RetryScheduled => write!(f, "Retry scheduled"),
            JobEventKind::Failed => write!(f, "Failed"),
            JobEventKind::Tombstoned => write!(f, "Tombstoned"),
            JobEventKind::Recovered => write!(f, "Recovered"),
        }
    }
}

/// Snapshot of a job right after a committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub kind: JobEventKind,
    pub source_path: String,
    pub status: JobStatus,
    pub retry_count: u32,
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The job's `updated_at` after the transition.
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_job(kind: JobEventKind, job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            kind,
            source_path: job.source_path.clone(),
            status: job.status,
            retry_count: job.retry_count,
            is_deleted: job.is_deleted,
            error: job.error_message.clone(),
            at: job.updated_at,
        }
    }
}

/// Fans job events out to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn publish(&self, kind: JobEventKind, job: &Job) {
        self.send(JobEvent::from_job(kind, job));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
