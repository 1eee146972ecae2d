use std::time::Duration;

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};

/// Outcome of a single [`JobQueue::pop`].
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    Job(String),
    Timeout,
    Closed,
}

/// Bounded in-memory queue of job ids shared by producers and workers.
///
/// The queue only carries ids; the store holds the state. Losing an id
/// (full queue, shutdown) is recovered by the next scan or startup.
#[derive(Clone)]
pub struct JobQueue {
    sender: Sender<String>,
    receiver: Receiver<String>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Pushes without blocking. Returns false when the queue is full.
    pub fn push(&self, job_id: &str) -> bool {
        match self.sender.try_send(job_id.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(id)) => {
                log::warn!(
                    "Job queue full ({} entries); job {} stays queued until the next scan",
                    self.sender.len(),
                    id
                );
                false
            }
            Err(TrySendError::Disconnected(id)) => {
                log::warn!("Job queue closed; dropping push of job {}", id);
                false
            }
        }
    }

    /// Like [`push`](Self::push), but waits up to `timeout` for room.
    pub fn push_timeout(&self, job_id: &str, timeout: Duration) -> bool {
        match self.sender.send_timeout(job_id.to_string(), timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(id)) => {
                log::warn!(
                    "Job queue full ({} entries) for {:?}; job {} stays queued until the next scan",
                    self.sender.len(),
                    timeout,
                    id
                );
                false
            }
            Err(SendTimeoutError::Disconnected(id)) => {
                log::warn!("Job queue closed; dropping push of job {}", id);
                false
            }
        }
    }

    /// Pushes without blocking or logging; the caller owns the fallback.
    pub fn try_push(&self, job_id: &str) -> bool {
        self.sender.try_send(job_id.to_string()).is_ok()
    }

    pub fn pop(&self, timeout: Duration) -> Pop {
        match self.receiver.recv_timeout(timeout) {
            Ok(id) => Pop::Job(id),
            Err(RecvTimeoutError::Timeout) => Pop::Timeout,
            Err(RecvTimeoutError::Disconnected) => Pop::Closed,
        }
    }

    /// Discards every pending id.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
