//! The monthly accrual batch engine.
//!
//! Once per period the job walks every account and applies interest, the
//! monthly fee, the minimum-balance penalty, and the transaction-alert
//! surcharge. A [JobRun](crate::job_run::JobRun) row keyed by (job name,
//! period) makes the walk idempotent: a period that is already recorded is
//! never reprocessed, whatever the recorded status.
//!
//! Each account is processed in its own unit of work so one account's
//! failure cannot abort the rest; failures are logged and reported in the
//! tagged per-account outcome list. Only period-level setup errors mark the
//! run FAILED.

use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use time::{Month, OffsetDateTime};

use crate::{
    Error, account,
    account::{Account, AccountId},
    db, job_run,
    job_run::JobStatus,
    reference,
    transaction::{self, NewTransaction, TransactionType},
};

/// The job name recorded on every monthly accrual run.
pub const MONTHLY_JOB_NAME: &str = "monthly_account_processing";

/// The flat fee debited from accounts that opted into transaction alerts.
pub const ALERT_SURCHARGE: Decimal = dec!(25.00);

/// How many account ids the batch walk loads per page.
const PAGE_SIZE: u32 = 200;

/// A processing period: one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    /// The calendar year.
    pub year: i32,
    /// The calendar month, 1-12.
    pub month: u8,
}

impl Period {
    /// The calendar month immediately before `now`: the period a scheduled
    /// trigger is due to process.
    pub fn preceding(now: OffsetDateTime) -> Self {
        let date = now.date();
        let month = u8::from(date.month());

        if month == u8::from(Month::January) {
            Period {
                year: date.year() - 1,
                month: 12,
            }
        } else {
            Period {
                year: date.year(),
                month: month - 1,
            }
        }
    }

    /// `YYYY-MM` label used in posting descriptions and logs.
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }
}

/// The postings the batch applied to one account; zero where a charge did
/// not apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCharges {
    /// Interest credited.
    pub interest: Decimal,
    /// Monthly fee debited.
    pub fee: Decimal,
    /// Minimum-balance penalty debited.
    pub penalty: Decimal,
    /// Transaction-alert surcharge debited.
    pub alert_surcharge: Decimal,
}

impl AppliedCharges {
    fn none() -> Self {
        AppliedCharges {
            interest: Decimal::ZERO,
            fee: Decimal::ZERO,
            penalty: Decimal::ZERO,
            alert_surcharge: Decimal::ZERO,
        }
    }
}

/// What happened to one account during the walk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOutcome {
    /// The processed account.
    pub account_id: AccountId,
    /// The applied postings, or the reason the account was skipped.
    pub outcome: Result<AppliedCharges, String>,
}

/// The result of triggering the job for a period.
#[derive(Debug, PartialEq, Serialize)]
pub enum JobOutcome {
    /// A run for the period was already recorded; nothing was processed.
    /// FAILED periods are not retried automatically; an operator must clear
    /// the recorded run first.
    AlreadyRecorded {
        /// The status of the recorded run.
        status: JobStatus,
    },
    /// The period was processed and marked COMPLETED; the outcome list
    /// includes accounts that individually failed.
    Completed {
        /// One entry per walked account, in walk order.
        outcomes: Vec<AccountOutcome>,
    },
}

/// Interest for one month of the annual percentage rate.
///
/// The annual rate is divided down to a monthly rate at 10 decimal places,
/// applied to the balance, and rounded half-up to cents.
pub fn monthly_interest(balance: Decimal, annual_rate_percent: Decimal) -> Decimal {
    let monthly_rate = (annual_rate_percent / dec!(1200))
        .round_dp_with_strategy(10, RoundingStrategy::MidpointAwayFromZero);

    (balance * monthly_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Run the monthly accrual job for `period`.
///
/// Returns [JobOutcome::AlreadyRecorded] without touching any account when
/// a run for the period exists. Otherwise records an IN_PROGRESS run,
/// walks every account (the clearing account excepted), and marks the run
/// COMPLETED. Per-account failures are contained; a period-level setup
/// failure marks the run FAILED with details and is returned as the error.
///
/// The minimum-balance penalty is evaluated against the balance at
/// processing time, not the true intra-month minimum.
///
/// # Errors
/// Returns an [Error::SqlError] (or whatever period-level error occurred)
/// after the run has been marked FAILED.
pub fn run_monthly_job(
    connection: &Connection,
    period: Period,
    now: OffsetDateTime,
) -> Result<JobOutcome, Error> {
    if let Some(existing) =
        job_run::get_job_run(connection, MONTHLY_JOB_NAME, period.year, period.month)?
    {
        tracing::info!(
            "monthly job for {} already recorded with status {}",
            period.label(),
            existing.status
        );
        return Ok(JobOutcome::AlreadyRecorded {
            status: existing.status,
        });
    }

    let run = job_run::start_job_run(connection, MONTHLY_JOB_NAME, period.year, period.month, now)?;
    tracing::info!("monthly job started for {}", period.label());

    match process_period(connection, period, now) {
        Ok(outcomes) => {
            job_run::mark_completed(connection, run.id, now)?;
            let failed = outcomes
                .iter()
                .filter(|outcome| outcome.outcome.is_err())
                .count();
            tracing::info!(
                "monthly job completed for {}: {} accounts processed, {} failed",
                period.label(),
                outcomes.len(),
                failed
            );
            Ok(JobOutcome::Completed { outcomes })
        }
        Err(error) => {
            tracing::error!("monthly job failed for {}: {}", period.label(), error);
            job_run::mark_failed(connection, run.id, now, &error.to_string())?;
            Err(error)
        }
    }
}

/// Walk every account in fixed-size id pages. Paging bounds memory on large
/// books; the page query itself failing is a period-level error.
fn process_period(
    connection: &Connection,
    period: Period,
    now: OffsetDateTime,
) -> Result<Vec<AccountOutcome>, Error> {
    let mut outcomes = Vec::new();
    let mut offset = 0;

    loop {
        let page = account::get_account_id_page(connection, PAGE_SIZE, offset)?;
        if page.is_empty() {
            break;
        }

        for &account_id in &page {
            match process_account(connection, account_id, period, now) {
                Ok(Some(applied)) => outcomes.push(AccountOutcome {
                    account_id,
                    outcome: Ok(applied),
                }),
                // The clearing account takes no postings against itself.
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(
                        "failed to process account {} for {}: {}",
                        account_id,
                        period.label(),
                        error
                    );
                    outcomes.push(AccountOutcome {
                        account_id,
                        outcome: Err(error.to_string()),
                    });
                }
            }
        }

        if page.len() < PAGE_SIZE as usize {
            break;
        }
        offset += PAGE_SIZE;
    }

    Ok(outcomes)
}

/// One account, one unit of work: reload the account inside the
/// transaction, apply the postings, commit. Any error rolls the whole
/// account back and is reported to the caller.
fn process_account(
    connection: &Connection,
    account_id: AccountId,
    period: Period,
    now: OffsetDateTime,
) -> Result<Option<AppliedCharges>, Error> {
    let unit = connection.unchecked_transaction()?;

    let mut account = account::get_account_by_id(&unit, account_id)?;
    if account.account_number == db::CLEARING_ACCOUNT_NUMBER {
        return Ok(None);
    }

    let mut applied = AppliedCharges::none();

    let interest = monthly_interest(account.balance, account.account_type.interest_rate());
    if interest > Decimal::ZERO {
        apply_credit(
            &unit,
            &mut account,
            interest,
            TransactionType::Interest,
            &format!("Monthly interest for {}", period.label()),
            now,
        )?;
        applied.interest = interest;
    }

    let fee = account.account_type.monthly_fee();
    if fee > Decimal::ZERO {
        apply_charge(
            &unit,
            &mut account,
            fee,
            &format!("Monthly fee for {}", period.label()),
            now,
        )?;
        applied.fee = fee;
    }

    // Uses the balance at processing time, not the intra-month minimum.
    if account.balance < account.account_type.minimum_balance() {
        let penalty = account.account_type.minimum_balance_penalty();
        if penalty > Decimal::ZERO {
            apply_charge(
                &unit,
                &mut account,
                penalty,
                &format!("Minimum balance penalty for {}", period.label()),
                now,
            )?;
            applied.penalty = penalty;
        }
    }

    if account.transaction_alert {
        apply_charge(
            &unit,
            &mut account,
            ALERT_SURCHARGE,
            &format!("Transaction alert charge for {}", period.label()),
            now,
        )?;
        applied.alert_surcharge = ALERT_SURCHARGE;
    }

    unit.commit()?;

    Ok(Some(applied))
}

/// Credit `amount` to the account with the clearing account as the paying
/// side. The clearing side carries no balance snapshot.
fn apply_credit(
    connection: &Connection,
    account: &mut Account,
    amount: Decimal,
    transaction_type: TransactionType,
    description: &str,
    now: OffsetDateTime,
) -> Result<(), Error> {
    let clearing = clearing_account(connection)?;

    account.balance += amount;
    account::update_balance(connection, account.id, account.balance)?;

    transaction::insert_transaction(
        connection,
        &NewTransaction {
            reference_number: reference::new_reference_number(),
            executed_at: now,
            transaction_type,
            amount,
            from_account_id: Some(clearing.id),
            to_account_id: Some(account.id),
            description: Some(description.to_string()),
            from_balance_after: None,
            to_balance_after: Some(account.balance),
        },
    )?;

    Ok(())
}

/// Debit `amount` from the account with the clearing account as the
/// receiving side.
fn apply_charge(
    connection: &Connection,
    account: &mut Account,
    amount: Decimal,
    description: &str,
    now: OffsetDateTime,
) -> Result<(), Error> {
    let clearing = clearing_account(connection)?;

    account.balance -= amount;
    account::update_balance(connection, account.id, account.balance)?;

    transaction::insert_transaction(
        connection,
        &NewTransaction {
            reference_number: reference::new_reference_number(),
            executed_at: now,
            transaction_type: TransactionType::Fee,
            amount,
            from_account_id: Some(account.id),
            to_account_id: Some(clearing.id),
            description: Some(description.to_string()),
            from_balance_after: Some(account.balance),
            to_balance_after: None,
        },
    )?;

    Ok(())
}

fn clearing_account(connection: &Connection) -> Result<Account, Error> {
    account::get_account_by_number(connection, db::CLEARING_ACCOUNT_NUMBER)?
        .ok_or_else(|| Error::AccountNotFound(db::CLEARING_ACCOUNT_NUMBER.to_string()))
}
