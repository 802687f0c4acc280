//! Scheduled entry point for the monthly accrual job.
//!
//! The production trigger fires early on the first day of each month; at
//! that point the period due for processing is the month that just ended.
//! Idempotency lives in the job itself, so a trigger that fires twice, or
//! a manual invocation after the scheduled one, is harmless.

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error,
    monthly::{JobOutcome, Period, run_monthly_job},
};

/// Run the monthly accrual job for the period due at `now`: the calendar
/// month immediately before it.
///
/// # Errors
/// Returns an error when the run failed at the period level; see
/// [run_monthly_job].
pub fn run_due_monthly_job(connection: &Connection, now: OffsetDateTime) -> Result<JobOutcome, Error> {
    let period = Period::preceding(now);
    tracing::info!("scheduled trigger at {now}: processing period {}", period.label());

    run_monthly_job(connection, period, now)
}
