//! Database initialisation and shared SQL conversion helpers.
//!
//! Creates the schema for all ledger models and seeds the bank's reserved
//! clearing account, the counterparty for interest and fee postings.

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::{OffsetDateTime, UtcOffset};

use crate::{
    Error, account,
    account::NewAccount,
    account_type::AccountType,
    job_run, transaction,
    user::{self, NewUser},
};

/// The reserved account number of the bank's own clearing account.
///
/// Interest and fee postings use this account as their counterparty so that
/// every ledger record has two sides.
pub const CLEARING_ACCOUNT_NUMBER: &str = "000000000000";

/// Create the ledger schema and seed the clearing account.
///
/// Safe to call on an already-initialised database: table creation uses
/// `IF NOT EXISTS` and the clearing account is only created when absent.
///
/// # Errors
/// Returns an [Error::SqlError] if the schema could not be created.
pub fn initialize(connection: &Connection, now: OffsetDateTime) -> Result<(), Error> {
    user::create_user_table(connection)?;
    account::create_account_table(connection)?;
    transaction::create_transaction_table(connection)?;
    job_run::create_job_run_table(connection)?;

    seed_clearing_account(connection, now)?;

    Ok(())
}

fn seed_clearing_account(connection: &Connection, now: OffsetDateTime) -> Result<(), Error> {
    if account::get_account_by_number(connection, CLEARING_ACCOUNT_NUMBER)?.is_some() {
        return Ok(());
    }

    let bank = match user::get_user_by_crn(connection, "BANK0000")? {
        Some(user) => user,
        None => user::create_user(
            connection,
            &NewUser {
                crn: "BANK0000".to_string(),
                email: "clearing@bank.internal".to_string(),
                first_name: "Internal".to_string(),
                last_name: "Clearing".to_string(),
            },
        )?,
    };

    account::create_account(
        connection,
        &NewAccount {
            account_number: CLEARING_ACCOUNT_NUMBER.to_string(),
            balance: dec!(0.00),
            account_type: AccountType::Current,
            primary_account: false,
            transaction_alert: false,
            owner_id: bank.id,
        },
        now,
    )?;

    tracing::info!("seeded clearing account {}", CLEARING_ACCOUNT_NUMBER);

    Ok(())
}

/// Read a monetary column stored as a canonical decimal string.
///
/// Amounts and balances are stored as TEXT so that SQLite never coerces them
/// to floats; all arithmetic happens on [Decimal] values in Rust.
pub(crate) fn decimal_from_column(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let text: String = row.get(index)?;

    Decimal::from_str_exact(&text).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(error),
        )
    })
}

/// Read a nullable monetary column.
pub(crate) fn optional_decimal_from_column(
    row: &Row,
    index: usize,
) -> Result<Option<Decimal>, rusqlite::Error> {
    let text: Option<String> = row.get(index)?;

    match text {
        None => Ok(None),
        Some(text) => Decimal::from_str_exact(&text).map(Some).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        }),
    }
}

/// Normalise a datetime to UTC before it is bound to a SQL parameter.
///
/// Stored datetimes must share one offset so that SQL range comparisons on
/// their encoded form order chronologically.
pub(crate) fn to_utc(datetime: OffsetDateTime) -> OffsetDateTime {
    datetime.to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use super::{CLEARING_ACCOUNT_NUMBER, initialize};
    use crate::account;

    #[test]
    fn initialize_creates_schema_and_clearing_account() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        initialize(&connection, datetime!(2026-01-01 00:00 UTC)).expect("Could not initialise");

        let clearing = account::get_account_by_number(&connection, CLEARING_ACCOUNT_NUMBER)
            .expect("Could not query clearing account")
            .expect("Clearing account missing");
        assert_eq!(clearing.balance, dec!(0.00));
        assert!(!clearing.primary_account);
    }

    #[test]
    fn initialize_is_idempotent() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        initialize(&connection, datetime!(2026-01-01 00:00 UTC)).expect("first initialise failed");
        initialize(&connection, datetime!(2026-01-02 00:00 UTC)).expect("second initialise failed");

        let count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM account WHERE account_number = ?1",
                [CLEARING_ACCOUNT_NUMBER],
                |row| row.get(0),
            )
            .expect("Could not count clearing accounts");
        assert_eq!(count, 1);
    }
}
