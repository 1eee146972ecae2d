use log::{debug, info, warn};

use crate::broadcast::JobEventKind;
use crate::db::job_repo;
use crate::error::{FilenormError, Result, StorageError};
use crate::storage::{fingerprint, relative_path, to_slash_path};
use crate::worker::{Job, JobStatus};

use super::JobCore;

enum Ingested {
    Created(Job),
    Requeued(Job),
    Unchanged(Job),
}

impl JobCore {
    pub(crate) fn enqueue(&self, source_path: &str) -> Result<Job> {
        let key = normalize(source_path)?;
        let bytes = self.store.read_source(&key)?;
        let content_fingerprint = fingerprint(&bytes);
        let output_present = self.store.processed_exists(&key);

        let ingested = self.db.transaction(|tx| -> Result<Ingested> {
            let now = self.db.next_stamp();
            match job_repo::find_by_source_path(tx, &key)? {
                None => {
                    let job = Job::new(key.clone(), content_fingerprint.clone(), now);
                    job_repo::insert(tx, &job)?;
                    Ok(Ingested::Created(job))
                }
                Some(mut job) if job.is_up_to_date(&content_fingerprint, output_present) => {
                    job.updated_at = now;
                    job_repo::update(tx, &job)?;
                    Ok(Ingested::Unchanged(job))
                }
                Some(mut job) => {
                    job.requeue(content_fingerprint.clone(), now);
                    job_repo::update(tx, &job)?;
                    Ok(Ingested::Requeued(job))
                }
            }
        })?;

        let (job, kind) = match ingested {
            Ingested::Unchanged(job) => {
                debug!("Job {} for {} is up to date", job.id, job.source_path);
                return Ok(job);
            }
            Ingested::Created(job) => (job, JobEventKind::Created),
            Ingested::Requeued(job) => (job, JobEventKind::Requeued),
        };

        debug!("Queued job {} for {}", job.id, job.source_path);
        self.events.publish(kind, &job);
        self.queue.push_timeout(&job.id, self.settings.worker_poll_interval());
        Ok(job)
    }

    /// Enqueue every incoming file, then tombstone jobs whose source is gone.
    pub(crate) fn scan(&self) -> Result<usize> {
        let files = self.store.list_incoming()?;

        let mut queued = 0;
        for path in &files {
            match self.enqueue(path) {
                Ok(job) if job.status == JobStatus::Queued => queued += 1,
                Ok(_) => {}
                Err(e) => warn!("Skipping {} during scan: {}", path, e),
            }
        }

        let tombstoned = self.tombstone_missing()?;

        info!(
            "Scan complete: {} files, {} queued, {} tombstoned",
            files.len(),
            queued,
            tombstoned
        );
        Ok(queued)
    }

    fn tombstone_missing(&self) -> Result<usize> {
        let tombstoned = self.db.transaction(|tx| -> Result<Vec<Job>> {
            let mut flagged = Vec::new();
            for mut job in job_repo::list_all(tx)? {
                if job.is_deleted || self.store.source_exists(&job.source_path) {
                    continue;
                }
                job.is_deleted = true;
                job.updated_at = self.db.next_stamp();
                job_repo::update(tx, &job)?;
                flagged.push(job);
            }
            Ok(flagged)
        })?;

        for job in &tombstoned {
            debug!("Source of job {} vanished: {}", job.id, job.source_path);
            self.events.publish(JobEventKind::Tombstoned, job);
        }
        Ok(tombstoned.len())
    }

    /// Resets unfinished jobs to queued and pushes them. Runs before any
    /// worker starts consuming.
    pub(crate) fn recover(&self) -> Result<usize> {
        let recovered = self.db.transaction(|tx| -> Result<Vec<Job>> {
            let mut jobs =
                job_repo::find_by_statuses(tx, &[JobStatus::Queued, JobStatus::Processing])?;
            for job in &mut jobs {
                if job.status == JobStatus::Processing {
                    warn!("Job {} was interrupted mid-processing; requeueing", job.id);
                }
                job.status = JobStatus::Queued;
                job.updated_at = self.db.next_stamp();
                job_repo::update(tx, job)?;
            }
            Ok(jobs)
        })?;

        for job in &recovered {
            self.events.publish(JobEventKind::Recovered, job);
            self.queue.push(&job.id);
        }
        if !recovered.is_empty() {
            info!("Recovered {} unfinished jobs", recovered.len());
        }
        Ok(recovered.len())
    }
}

/// Canonical `/`-separated form of a caller-supplied source path.
fn normalize(source_path: &str) -> Result<String> {
    let relative = relative_path(source_path)?;
    to_slash_path(&relative).ok_or_else(|| {
        FilenormError::from(StorageError::InvalidPath {
            path: source_path.to_string(),
            reason: "path is not valid UTF-8".to_string(),
        })
    })
}
