//! Job repository — queries and mutations for the `jobs` table.
//!
//! Functions take a `&Connection` so they run equally on a plain connection
//! (via `Database::with_conn`) or inside a `Transaction` (which derefs to one).

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::worker::job::{Job, JobStats, JobStatus};

const COLUMNS: &str = "id, source_path, content_fingerprint, status, retry_count, error_message,
     processed_path, is_deleted, created_at, updated_at";

/// Formats a timestamp so that lexical order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, id: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

/// A raw job row, decoded into a [`Job`] by [`RawJob::into_job`].
struct RawJob {
    id: String,
    source_path: String,
    content_fingerprint: String,
    status: String,
    retry_count: u32,
    error_message: Option<String>,
    processed_path: Option<String>,
    is_deleted: bool,
    created_at: String,
    updated_at: String,
}

impl RawJob {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            source_path: row.get("source_path")?,
            content_fingerprint: row.get("content_fingerprint")?,
            status: row.get("status")?,
            retry_count: row.get("retry_count")?,
            error_message: row.get("error_message")?,
            processed_path: row.get("processed_path")?,
            is_deleted: row.get("is_deleted")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<Job, DatabaseError> {
        let status = self
            .status
            .parse::<JobStatus>()
            .map_err(|reason| DatabaseError::CorruptRow {
                id: self.id.clone(),
                reason,
            })?;
        let created_at = parse_timestamp(&self.created_at, &self.id)?;
        let updated_at = parse_timestamp(&self.updated_at, &self.id)?;

        Ok(Job {
            id: self.id,
            source_path: self.source_path,
            content_fingerprint: self.content_fingerprint,
            status,
            retry_count: self.retry_count,
            error_message: self.error_message,
            processed_path: self.processed_path,
            is_deleted: self.is_deleted,
            created_at,
            updated_at,
        })
    }
}

fn collect_jobs(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<Job>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(params, RawJob::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    raws.into_iter().map(RawJob::into_job).collect()
}

/// Query filter for job listing. All filters are conjunctive; bounds on
/// `updated_at` are inclusive.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &Job) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, source_path, content_fingerprint, status, retry_count,
         error_message, processed_path, is_deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            job.id,
            job.source_path,
            job.content_fingerprint,
            job.status.as_str(),
            job.retry_count,
            job.error_message,
            job.processed_path,
            job.is_deleted,
            format_timestamp(&job.created_at),
            format_timestamp(&job.updated_at),
        ],
    )?;
    Ok(())
}

/// Updates an existing job row. All fields except `id`, `source_path` and
/// `created_at` are overwritten. Returns false if the row no longer exists.
pub fn update(conn: &Connection, job: &Job) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET content_fingerprint=?2, status=?3, retry_count=?4, error_message=?5,
         processed_path=?6, is_deleted=?7, updated_at=?8
         WHERE id=?1",
        params![
            job.id,
            job.content_fingerprint,
            job.status.as_str(),
            job.retry_count,
            job.error_message,
            job.processed_path,
            job.is_deleted,
            format_timestamp(&job.updated_at),
        ],
    )?;
    Ok(changed == 1)
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Job>, DatabaseError> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?1", COLUMNS);
    conn.query_row(&sql, params![id], RawJob::from_row)
        .optional()?
        .map(RawJob::into_job)
        .transpose()
}

/// Finds the job tracking `source_path`.
pub fn find_by_source_path(
    conn: &Connection,
    source_path: &str,
) -> Result<Option<Job>, DatabaseError> {
    let sql = format!("SELECT {} FROM jobs WHERE source_path = ?1", COLUMNS);
    conn.query_row(&sql, params![source_path], RawJob::from_row)
        .optional()?
        .map(RawJob::into_job)
        .transpose()
}

/// Jobs in any of `statuses`, oldest update first.
pub fn find_by_statuses(
    conn: &Connection,
    statuses: &[JobStatus],
) -> Result<Vec<Job>, DatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT {} FROM jobs WHERE status IN ({}) ORDER BY updated_at ASC",
        COLUMNS,
        placeholders.join(", ")
    );
    let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        names.iter().map(|n| n as &dyn rusqlite::types::ToSql).collect();
    collect_jobs(conn, &sql, &params_ref)
}

/// Every job, tombstoned ones included.
pub fn list_all(conn: &Connection) -> Result<Vec<Job>, DatabaseError> {
    let sql = format!("SELECT {} FROM jobs ORDER BY source_path ASC", COLUMNS);
    collect_jobs(conn, &sql, &[])
}

/// Queries jobs with filters, most recently updated first.
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<Vec<Job>, DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.as_str()));
    }
    if let Some(ref start) = filter.start {
        conditions.push(format!("updated_at >= ?{}", param_values.len() + 1));
        param_values.push(Box::new(format_timestamp(start)));
    }
    if let Some(ref end) = filter.end {
        conditions.push(format!("updated_at <= ?{}", param_values.len() + 1));
        param_values.push(Box::new(format_timestamp(end)));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM jobs {} ORDER BY updated_at DESC",
        COLUMNS, where_clause
    );
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    collect_jobs(conn, &sql, &params_ref)
}

/// Jobs updated strictly after `since`, oldest first, tombstones included.
pub fn updated_since(
    conn: &Connection,
    since: &DateTime<Utc>,
    limit: Option<usize>,
) -> Result<Vec<Job>, DatabaseError> {
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let sql = format!(
        "SELECT {} FROM jobs WHERE updated_at > ?1 ORDER BY updated_at ASC LIMIT ?2",
        COLUMNS
    );
    let since = format_timestamp(since);
    let params_ref: [&dyn rusqlite::types::ToSql; 2] = [&since, &limit];
    collect_jobs(conn, &sql, &params_ref)
}

/// Counts jobs per status; statuses without jobs report zero.
pub fn count_by_status(conn: &Connection) -> Result<JobStats, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stats = JobStats::default();
    for (status, count) in rows {
        match status.parse::<JobStatus>() {
            Ok(status) => stats.set(status, count),
            Err(reason) => log::warn!("Skipping {} jobs: {}", count, reason),
        }
    }
    Ok(stats)
}

/// Moves a queued job to processing. Returns the claimed job, or `None` if
/// the job is gone or not queued (another worker already took it).
///
/// `now` doubles as the claim token checked by [`find_claimed`]; stamps are
/// unique, so a later claim of the same job never carries the same token.
pub fn claim(
    conn: &Connection,
    id: &str,
    now: &DateTime<Utc>,
) -> Result<Option<Job>, DatabaseError> {
    let stamp = format_timestamp(now);
    let changed = conn.execute(
        "UPDATE jobs SET status = ?2, updated_at = ?3, claimed_at = ?3
         WHERE id = ?1 AND status = ?4",
        params![
            id,
            JobStatus::Processing.as_str(),
            stamp,
            JobStatus::Queued.as_str(),
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    find_by_id(conn, id)
}

/// The job, if it is still processing under the claim taken at `claimed_at`.
/// `None` means the attempt lost ownership: the row was requeued, reclaimed,
/// finished by another attempt or removed.
pub fn find_claimed(
    conn: &Connection,
    id: &str,
    claimed_at: &DateTime<Utc>,
) -> Result<Option<Job>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE id = ?1 AND status = ?2 AND claimed_at = ?3",
        COLUMNS
    );
    conn.query_row(
        &sql,
        params![
            id,
            JobStatus::Processing.as_str(),
            format_timestamp(claimed_at)
        ],
        RawJob::from_row,
    )
    .optional()?
    .map(RawJob::into_job)
    .transpose()
}

/// Latest `updated_at` in the table, if any row parses.
pub fn latest_update(conn: &Connection) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    let latest: Option<String> =
        conn.query_row("SELECT MAX(updated_at) FROM jobs", [], |r| r.get(0))?;
    Ok(latest.and_then(|value| match parse_timestamp(&value, "<latest>") {
        Ok(ts) => Some(ts),
        Err(e) => {
            log::warn!("Ignoring unparseable latest update: {}", e);
            None
        }
    }))
}
