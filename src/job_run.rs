//! The idempotency and audit record for batch executions.
//!
//! One row per (job name, period year, period month); the UNIQUE constraint
//! on that triple is the gate that makes a periodic job run at most once per
//! period across restarts.

use std::{fmt, str::FromStr};

use rusqlite::{Connection, OptionalExtension, Row, named_params};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, db};

/// Alias for the id of a job-run row.
pub type JobRunId = i64;

/// Lifecycle state of a batch execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// The run has started and not yet finished.
    InProgress,
    /// The run finished; individual accounts may still have failed.
    Completed,
    /// Period-level setup failed; see the run's details.
    Failed,
}

impl JobStatus {
    /// The canonical string stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(JobStatus::InProgress),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(Error::NotFound),
        }
    }
}

/// One batch execution, keyed by job name and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    /// The id of the job-run row.
    pub id: JobRunId,
    /// The name of the batch job.
    pub job_name: String,
    /// Year of the processed period.
    pub period_year: i32,
    /// Month of the processed period (1-12).
    pub period_month: u8,
    /// When the run started.
    pub started_at: OffsetDateTime,
    /// When the run finished, if it has.
    pub finished_at: Option<OffsetDateTime>,
    /// Lifecycle state of the run.
    pub status: JobStatus,
    /// Failure details for FAILED runs.
    pub details: Option<String>,
}

/// Create the job-run table.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_job_run_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS job_run (
            id INTEGER PRIMARY KEY,
            job_name TEXT NOT NULL,
            period_year INTEGER NOT NULL,
            period_month INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,
            details TEXT,
            UNIQUE (job_name, period_year, period_month)
        )",
        (),
    )?;

    Ok(())
}

pub(crate) fn map_row_to_job_run(row: &Row) -> Result<JobRun, rusqlite::Error> {
    let status: String = row.get(6)?;
    let status = status.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown job status \"{status}\"").into(),
        )
    })?;

    Ok(JobRun {
        id: row.get(0)?,
        job_name: row.get(1)?,
        period_year: row.get(2)?,
        period_month: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        status,
        details: row.get(7)?,
    })
}

const JOB_RUN_COLUMNS: &str =
    "id, job_name, period_year, period_month, started_at, finished_at, status, details";

/// Record the start of a run for (job, period) in [JobStatus::InProgress].
///
/// # Errors
/// Returns [Error::DuplicateJobRun] if a run for the period is already
/// recorded, or [Error::SqlError] for other SQL errors.
pub fn start_job_run(
    connection: &Connection,
    job_name: &str,
    period_year: i32,
    period_month: u8,
    now: OffsetDateTime,
) -> Result<JobRun, Error> {
    let run = connection
        .prepare(&format!(
            "INSERT INTO job_run (job_name, period_year, period_month, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {JOB_RUN_COLUMNS}"
        ))?
        .query_row(
            (
                job_name,
                period_year,
                period_month,
                db::to_utc(now),
                JobStatus::InProgress.as_str(),
            ),
            map_row_to_job_run,
        )?;

    Ok(run)
}

/// The recorded run for (job, period), if any.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_job_run(
    connection: &Connection,
    job_name: &str,
    period_year: i32,
    period_month: u8,
) -> Result<Option<JobRun>, Error> {
    let run = connection
        .prepare(&format!(
            "SELECT {JOB_RUN_COLUMNS} FROM job_run \
             WHERE job_name = :job_name \
               AND period_year = :period_year AND period_month = :period_month"
        ))?
        .query_row(
            named_params! {
                ":job_name": job_name,
                ":period_year": period_year,
                ":period_month": period_month,
            },
            map_row_to_job_run,
        )
        .optional()?;

    Ok(run)
}

/// Mark a run [JobStatus::Completed] with a finish time.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a run, or
/// [Error::SqlError] for other SQL errors.
pub fn mark_completed(connection: &Connection, id: JobRunId, now: OffsetDateTime) -> Result<(), Error> {
    update_status(connection, id, JobStatus::Completed, now, None)
}

/// Mark a run [JobStatus::Failed] and record the failure details.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a run, or
/// [Error::SqlError] for other SQL errors.
pub fn mark_failed(
    connection: &Connection,
    id: JobRunId,
    now: OffsetDateTime,
    details: &str,
) -> Result<(), Error> {
    update_status(connection, id, JobStatus::Failed, now, Some(details))
}

fn update_status(
    connection: &Connection,
    id: JobRunId,
    status: JobStatus,
    now: OffsetDateTime,
    details: Option<&str>,
) -> Result<(), Error> {
    let rows_updated = connection.execute(
        "UPDATE job_run SET status = :status, finished_at = :finished_at, details = :details \
         WHERE id = :id",
        named_params! {
            ":status": status.as_str(),
            ":finished_at": db::to_utc(now),
            ":details": details,
            ":id": id,
        },
    )?;

    if rows_updated == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}
