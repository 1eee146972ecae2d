use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};

use crate::error::WorkerError;
use crate::worker::queue::{JobQueue, Pop};

/// Work performed for each job id taken off the queue.
///
/// Handlers own all failure handling; a panic is caught and logged so the
/// worker keeps running.
pub trait JobHandler: Send + Sync + 'static {
    fn handle(&self, job_id: &str);
}

impl<F> JobHandler for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn handle(&self, job_id: &str) {
        self(job_id)
    }
}

/// Fixed set of OS threads draining a shared [`JobQueue`].
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers. Each checks `shutdown` at least once
    /// per `poll_interval`.
    pub fn start(
        worker_count: usize,
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        poll_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let mut pool = Self {
            workers: Vec::with_capacity(worker_count),
            shutdown,
        };

        for worker_id in 0..worker_count {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let shutdown_flag = Arc::clone(&pool.shutdown);

            let spawned = thread::Builder::new()
                .name(format!("filenorm-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, queue, handler, poll_interval, shutdown_flag));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    // Tear down what already started before reporting.
                    pool.shutdown();
                    pool.wait();
                    return Err(WorkerError::SpawnFailed {
                        name: format!("worker {}", worker_id),
                        source: e,
                    });
                }
            }
        }

        info!("Started {} workers", worker_count);
        Ok(pool)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Release);
    }

    /// Joins every worker. In-flight jobs finish first.
    pub fn wait(&mut self) {
        for (i, worker) in self.workers.drain(..).enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    #[cfg(test)]
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn run_worker(
    worker_id: usize,
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Acquire) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match queue.pop(poll_interval) {
            Pop::Job(job_id) => {
                debug!("Worker {} processing job {}", worker_id, job_id);
                let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(&job_id)));
                if let Err(panic) = outcome {
                    error!(
                        "Worker {} contained a panic while handling job {}: {}",
                        worker_id,
                        job_id,
                        panic_message(panic.as_ref())
                    );
                }
            }
            Pop::Timeout => continue,
            Pop::Closed => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
