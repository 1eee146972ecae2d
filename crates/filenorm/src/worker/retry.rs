//! Delay queue for backoff re-pushes.
//!
//! A single ticker thread owns a min-heap of pending retries and moves each
//! id onto the [`JobQueue`] once its deadline passes. Producers never block.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};

use crate::config::MAX_RETRY_DELAY;
use crate::error::WorkerError;
use crate::worker::queue::JobQueue;

struct RetryRequest {
    fire_at: Instant,
    job_id: String,
}

#[derive(PartialEq, Eq)]
struct Pending {
    fire_at: Instant,
    seq: u64,
    job_id: String,
}

// Reversed so the std max-heap pops the earliest deadline first.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Handle for scheduling delayed re-pushes. Cheap to clone.
#[derive(Clone)]
pub struct RetryQueue {
    sender: Sender<RetryRequest>,
    receiver: Receiver<RetryRequest>,
}

impl RetryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Re-pushes `job_id` onto the work queue after `delay`.
    /// Delays beyond [`MAX_RETRY_DELAY`] are clamped to it.
    pub fn schedule(&self, job_id: &str, delay: Duration) {
        let delay = delay.min(MAX_RETRY_DELAY);
        let now = Instant::now();
        let request = RetryRequest {
            fire_at: now.checked_add(delay).unwrap_or(now),
            job_id: job_id.to_string(),
        };
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.sender.send(request);
        debug!("Scheduled retry of job {} in {:?}", job_id, delay);
    }

    /// Spawns the ticker thread. It exits within `poll_interval` of
    /// `shutdown` being set; retries still pending at that point are dropped.
    pub fn spawn_ticker(
        &self,
        queue: JobQueue,
        poll_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>, WorkerError> {
        let receiver = self.receiver.clone();
        thread::Builder::new()
            .name("filenorm-retry".to_string())
            .spawn(move || run_ticker(receiver, queue, poll_interval, shutdown))
            .map_err(|e| WorkerError::SpawnFailed {
                name: "retry ticker".to_string(),
                source: e,
            })
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn run_ticker(
    receiver: Receiver<RetryRequest>,
    queue: JobQueue,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Retry ticker started");

    let mut heap = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        while heap
            .peek()
            .map(|p: &Pending| p.fire_at <= now)
            .unwrap_or(false)
        {
            if let Some(mut due) = heap.pop() {
                if queue.try_push(&due.job_id) {
                    debug!("Retry due for job {}", due.job_id);
                    continue;
                }
                // Work queue full: keep the entry and try again next round.
                debug!("Work queue full; deferring retry of job {}", due.job_id);
                seq += 1;
                due.fire_at = now + poll_interval.max(Duration::from_millis(1));
                due.seq = seq;
                heap.push(due);
            }
        }

        let wait = heap
            .peek()
            .map(|p| p.fire_at.saturating_duration_since(now))
            .unwrap_or(poll_interval)
            .min(poll_interval);

        match receiver.recv_timeout(wait) {
            Ok(request) => {
                seq += 1;
                heap.push(Pending {
                    fire_at: request.fire_at,
                    seq,
                    job_id: request.job_id,
                });
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if !heap.is_empty() {
        info!(
            "Retry ticker stopping with {} pending retries; they resume on next start",
            heap.len()
        );
    }
    debug!("Retry ticker stopped");
}
