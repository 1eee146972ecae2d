use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{debug, error, info, warn};
use tracing::info_span;

use crate::broadcast::JobEventKind;
use crate::db::job_repo;
use crate::error::{RenderError, Result, StorageError};
use crate::render::RenderedDocument;
use crate::storage::fingerprint;
use crate::worker::pool::panic_message;
use crate::worker::{Job, JobStatus};

use super::JobCore;

/// A rendered document waiting to be written at finalize time.
struct Converted {
    document: RenderedDocument,
    fingerprint: String,
}

enum Finalized {
    Completed(Job),
    Retry(Job),
    Failed(Job),
    Dropped,
}

impl JobCore {
    /// Claim, render, write and finalize one job. Never panics or returns
    /// an error: failures become job state or log lines.
    pub(crate) fn process_job(&self, job_id: &str) {
        let job = match self.claim(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("Job {} not claimable; skipping", job_id);
                return;
            }
            Err(e) => {
                error!("Failed to claim job {}: {}", job_id, e);
                return;
            }
        };

        let _span = info_span!("process_job",
            job_id = %job.id,
            source = %job.source_path,
        )
        .entered();

        self.events.publish(JobEventKind::Claimed, &job);
        debug!("Processing {} (attempt {})", job.source_path, job.retry_count + 1);

        let outcome = self.convert(&job);
        if let Err(e) = self.finalize(&job, outcome) {
            error!(
                "Failed to record outcome of job {}; it will be recovered on restart: {}",
                job.id, e
            );
        }
    }

    fn claim(&self, job_id: &str) -> Result<Option<Job>> {
        self.db.transaction(|tx| -> Result<Option<Job>> {
            let now = self.db.next_stamp();
            Ok(job_repo::claim(tx, job_id, &now)?)
        })
    }

    fn convert(&self, job: &Job) -> Result<Converted> {
        let bytes = self.store.read_source(&job.source_path)?;

        let document = catch_unwind(AssertUnwindSafe(|| {
            self.renderer.render(&bytes, job.source_filename())
        }))
        .unwrap_or_else(|panic| Err(RenderError::Panicked(panic_message(panic.as_ref()))))?;

        Ok(Converted {
            document,
            fingerprint: fingerprint(&bytes),
        })
    }

    /// Applies the outcome of the attempt that claimed `claimed`. Output is
    /// written under the same transaction as the ownership check, so an
    /// attempt that lost its claim never touches the processed partition.
    fn finalize(&self, claimed: &Job, outcome: Result<Converted>) -> Result<()> {
        let max_retries = self.settings.max_retries;
        let job_id = claimed.id.as_str();

        let finalized = self.db.transaction(|tx| -> Result<Finalized> {
            let Some(mut job) = job_repo::find_claimed(tx, job_id, &claimed.updated_at)? else {
                return Ok(Finalized::Dropped);
            };

            let written = outcome.and_then(|converted| {
                let location = self.store.write_processed(
                    &job.source_path,
                    &converted.document.text,
                    &converted.document.assets,
                )?;
                Ok((location, converted.fingerprint))
            });

            job.updated_at = self.db.next_stamp();
            match written {
                Ok((processed_path, fingerprint)) => {
                    job.status = JobStatus::Completed;
                    job.processed_path = Some(processed_path);
                    job.content_fingerprint = fingerprint;
                    job.error_message = None;
                }
                Err(e) => {
                    job.retry_count += 1;
                    job.error_message = Some(e.to_string());
                    job.processed_path = None;
                    job.status = if job.retry_count > max_retries {
                        JobStatus::Failed
                    } else {
                        JobStatus::Queued
                    };
                }
            }

            if !job_repo::update(tx, &job)? {
                return Ok(Finalized::Dropped);
            }
            Ok(match job.status {
                JobStatus::Completed => Finalized::Completed(job),
                JobStatus::Failed => Finalized::Failed(job),
                _ => Finalized::Retry(job),
            })
        })?;

        match finalized {
            Finalized::Completed(job) => {
                info!(
                    "Job {} completed: {} -> {}",
                    job.id,
                    job.source_path,
                    job.processed_path.as_deref().unwrap_or_default()
                );
                self.events.publish(JobEventKind::Completed, &job);
            }
            Finalized::Retry(job) => {
                let delay = self.settings.retry_delay(job.retry_count);
                warn!(
                    "Job {} failed (attempt {}/{}), retrying in {:?}: {}",
                    job.id,
                    job.retry_count,
                    max_retries + 1,
                    delay,
                    job.error_message.as_deref().unwrap_or_default()
                );
                self.events.publish(JobEventKind::RetryScheduled, &job);
                self.retries.schedule(&job.id, delay);
            }
            Finalized::Failed(job) => {
                error!(
                    "Job {} permanently failed after {} attempts: {}",
                    job.id,
                    job.retry_count,
                    job.error_message.as_deref().unwrap_or_default()
                );
                self.events.publish(JobEventKind::Failed, &job);
                self.quarantine(&job);
            }
            Finalized::Dropped => {
                debug!("Job {} lost its claim while processing; outcome discarded", job_id);
            }
        }
        Ok(())
    }

    fn quarantine(&self, job: &Job) {
        match self.store.move_to_quarantine(&job.source_path) {
            Ok(location) => info!("Moved {} to {}", job.source_path, location),
            Err(StorageError::SourceNotFound(_)) => {
                warn!("Source of failed job {} is already gone: {}", job.id, job.source_path)
            }
            Err(e) => error!("Failed to quarantine {}: {}", job.source_path, e),
        }
    }
}
