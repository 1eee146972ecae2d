//! Job orchestration: ingestion, processing, retries and the query surface.
//!
//! [`JobManager`] composes the job store, the staging storage and a
//! renderer. State lives only in the database; the in-memory queue carries
//! job ids and may lose them (full queue, restart) without losing work,
//! because recovery and reconciliation re-push anything left queued.

mod ingest;
mod process;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::config::Settings;
use crate::db::job_repo::{self, JobFilter};
use crate::db::Database;
use crate::error::{Result, WorkerError};
use crate::render::Renderer;
use crate::storage::SourceStore;
use crate::worker::{Job, JobHandler, JobQueue, JobStats, RetryQueue, WorkerPool};

pub use scheduler::ScanScheduler;

/// Shared state used by callers, workers, the retry ticker and the scheduler.
pub(crate) struct JobCore {
    settings: Settings,
    db: Database,
    store: Arc<dyn SourceStore>,
    renderer: Arc<dyn Renderer>,
    queue: JobQueue,
    retries: RetryQueue,
    events: JobEventBroadcaster,
}

impl JobHandler for JobCore {
    fn handle(&self, job_id: &str) {
        self.process_job(job_id);
    }
}

struct Running {
    shutdown: Arc<AtomicBool>,
    pool: WorkerPool,
    ticker: JoinHandle<()>,
    scheduler: Option<ScanScheduler>,
}

/// Entry point for everything job related.
pub struct JobManager {
    core: Arc<JobCore>,
    scan_trigger: broadcast::Sender<()>,
    running: Mutex<Option<Running>>,
}

impl JobManager {
    pub fn new(
        settings: Settings,
        db: Database,
        store: Arc<dyn SourceStore>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let queue = JobQueue::new(settings.queue_capacity);
        let (scan_trigger, _) = broadcast::channel(4);

        Self {
            core: Arc::new(JobCore {
                settings,
                db,
                store,
                renderer,
                queue,
                retries: RetryQueue::new(),
                events: JobEventBroadcaster::default(),
            }),
            scan_trigger,
            running: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.core.settings
    }

    /// Ensures the staging directories exist, recovers unfinished jobs and
    /// starts the workers, the retry ticker and (if enabled) the scheduler.
    pub fn start(&self) -> Result<()> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(WorkerError::AlreadyRunning.into());
        }

        let core = &self.core;
        core.store.ensure_dirs()?;

        // Recovery re-pushes every queued job, so stale ids are redundant.
        let stale = core.queue.drain();
        if stale > 0 {
            log::debug!("Discarded {} stale queue entries", stale);
        }
        let recovered = core.recover()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let poll_interval = core.settings.worker_poll_interval();

        let ticker =
            core.retries
                .spawn_ticker(core.queue.clone(), poll_interval, Arc::clone(&shutdown))?;

        let handler: Arc<dyn JobHandler> = Arc::clone(&self.core) as Arc<dyn JobHandler>;
        let pool = match WorkerPool::start(
            core.settings.max_concurrent_jobs,
            core.queue.clone(),
            handler,
            poll_interval,
            Arc::clone(&shutdown),
        ) {
            Ok(pool) => pool,
            Err(e) => {
                shutdown.store(true, Ordering::Release);
                join_ticker(ticker);
                return Err(e.into());
            }
        };

        let scheduler = if core.settings.enable_scheduler {
            let scan_core = Arc::clone(&self.core);
            match ScanScheduler::start(
                core.settings.polling_interval(),
                move || scan_core.scan(),
                self.scan_trigger.subscribe(),
            ) {
                Ok(scheduler) => Some(scheduler),
                Err(e) => {
                    let mut pool = pool;
                    pool.shutdown();
                    pool.wait();
                    join_ticker(ticker);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            "Job manager started: {} workers, {} jobs recovered, scheduler {}",
            core.settings.max_concurrent_jobs,
            recovered,
            if scheduler.is_some() { "enabled" } else { "disabled" }
        );

        *running = Some(Running {
            shutdown,
            pool,
            ticker,
            scheduler,
        });
        Ok(())
    }

    /// Stops the scheduler, the retry ticker and the workers. In-flight
    /// renders finish; queued work resumes on the next start.
    pub fn stop(&self) {
        let Some(mut running) = self.lock_running().take() else {
            return;
        };

        info!("Stopping job manager...");
        running.shutdown.store(true, Ordering::Release);
        if let Some(scheduler) = running.scheduler.take() {
            scheduler.stop();
        }
        running.pool.shutdown();
        running.pool.wait();
        join_ticker(running.ticker);
        info!("Job manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Registers (or re-registers) `source_path` and queues it unless its
    /// completed output is already up to date.
    pub fn enqueue(&self, source_path: &str) -> Result<Job> {
        self.core.enqueue(source_path)
    }

    /// Reconciles the store with the incoming directory. Returns the number
    /// of jobs left queued by this pass.
    pub fn scan(&self) -> Result<usize> {
        self.core.scan()
    }

    /// Asks the running scheduler to scan now. Returns false when no
    /// scheduler is listening.
    pub fn trigger_scan(&self) -> bool {
        self.scan_trigger.send(()).is_ok()
    }

    pub fn stats(&self) -> Result<JobStats> {
        Ok(self.core.db.with_conn(job_repo::count_by_status)?)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self
            .core
            .db
            .with_conn(|conn| job_repo::find_by_id(conn, job_id))?)
    }

    /// Jobs matching `filter`, most recently updated first.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        Ok(self.core.db.with_conn(|conn| job_repo::query(conn, filter))?)
    }

    /// Every job updated strictly after `since`, oldest first, tombstones
    /// included.
    pub fn journal_since(&self, since: &DateTime<Utc>) -> Result<Vec<Job>> {
        Ok(self
            .core
            .db
            .with_conn(|conn| job_repo::updated_since(conn, since, None))?)
    }

    /// One page of [`JobManager::journal_since`]. `limit` defaults to the
    /// configured page size. Resume from the last row's `updated_at`.
    pub fn journal_page(&self, since: &DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Job>> {
        let limit = limit.unwrap_or(self.core.settings.journal_page_size);
        Ok(self
            .core
            .db
            .with_conn(|conn| job_repo::updated_since(conn, since, Some(limit)))?)
    }

    /// Stream of committed job transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.core.events.subscribe()
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_ticker(ticker: JoinHandle<()>) {
    if let Err(e) = ticker.join() {
        error!("Retry ticker panicked: {:?}", e);
    }
}
