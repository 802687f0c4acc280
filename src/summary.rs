//! Read-side account summaries.
//!
//! Bundles an account with its month-to-date money movement and recent
//! postings, the view a statement or dashboard renders.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Duration, OffsetDateTime, Time};

use crate::{Error, account, account::Account, transaction, transaction::Transaction};

/// How many recent postings a summary carries.
const RECENT_LIMIT: usize = 10;

/// An account together with its type parameters and month-to-date activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    /// The summarized account.
    pub account: Account,
    /// Human-readable name of the account's type.
    pub type_name: &'static str,
    /// One-off charge the type applies at opening.
    pub opening_charge: Decimal,
    /// Annual interest rate of the account's type, as a percentage.
    pub interest_rate: Decimal,
    /// The type's monthly fee.
    pub monthly_fee: Decimal,
    /// The type's minimum-balance threshold.
    pub minimum_balance: Decimal,
    /// The type's daily withdrawal cap.
    pub max_daily_withdrawal: Decimal,
    /// The type's daily deposit cap.
    pub max_daily_deposit: Decimal,
    /// Total credited to the account this calendar month.
    pub month_incoming: Decimal,
    /// Total debited from the account this calendar month.
    pub month_outgoing: Decimal,
    /// The most recent postings, newest first.
    pub recent_transactions: Vec<Transaction>,
}

/// The half-open UTC range `[start of month, start of next month)`
/// containing `now`.
fn month_bounds(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let start =
        now.replace_time(Time::MIDNIGHT) - Duration::days(i64::from(now.date().day()) - 1);
    let length = time::util::days_in_year_month(start.year(), start.month());

    (start, start + Duration::days(i64::from(length)))
}

/// Summarise the account with `account_number` as of `now`.
///
/// # Errors
/// Returns [Error::AccountNotFound] if no such account exists, or an
/// [Error::SqlError] if there is an SQL error.
pub fn summarize_account(
    connection: &Connection,
    account_number: &str,
    now: OffsetDateTime,
) -> Result<AccountSummary, Error> {
    let account = account::get_account_by_number(connection, account_number)?
        .ok_or_else(|| Error::AccountNotFound(account_number.to_string()))?;

    let (month_start, month_end) = month_bounds(now);
    let month_incoming =
        transaction::sum_received_between(connection, account.id, month_start, month_end)?;
    let month_outgoing =
        transaction::sum_sent_between(connection, account.id, month_start, month_end)?;

    let mut recent_transactions = transaction::get_transactions_for_account(connection, account.id)?;
    recent_transactions.truncate(RECENT_LIMIT);

    let account_type = account.account_type;
    Ok(AccountSummary {
        account,
        type_name: account_type.display_name(),
        opening_charge: account_type.opening_charge(),
        interest_rate: account_type.interest_rate(),
        monthly_fee: account_type.monthly_fee(),
        minimum_balance: account_type.minimum_balance(),
        max_daily_withdrawal: account_type.max_daily_withdrawal(),
        max_daily_deposit: account_type.max_daily_deposit(),
        month_incoming,
        month_outgoing,
        recent_transactions,
    })
}

/// Summarise every account owned by `owner_id`, oldest account first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn summarize_accounts_for_owner(
    connection: &Connection,
    owner_id: crate::user::UserId,
    now: OffsetDateTime,
) -> Result<Vec<AccountSummary>, Error> {
    account::get_accounts_by_owner(connection, owner_id)?
        .into_iter()
        .map(|account| summarize_account(connection, &account.account_number, now))
        .collect()
}
