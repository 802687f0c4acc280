//! The account model and its ledger-store queries.
//!
//! Balances may only be mutated inside a unit of work by the transfer engine
//! or the monthly accrual job; accounts are soft-closed, never deleted.

use rusqlite::{Connection, OptionalExtension, Row, named_params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, account_type::AccountType, db, user::UserId};

/// Alias for the id of an account row.
pub type AccountId = i64;

/// A customer bank account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The id of the account row.
    pub id: AccountId,
    /// Business-visible account number, unique and immutable.
    pub account_number: String,
    /// The current balance.
    pub balance: Decimal,
    /// The fixed type whose parameters govern fees, rates, and limits.
    pub account_type: AccountType,
    /// When the account was opened.
    pub opened_at: OffsetDateTime,
    /// Whether this is the owner's default receiving account.
    pub primary_account: bool,
    /// Whether the account is open for business.
    pub active: bool,
    /// When the account was soft-closed, if it was.
    pub closed_at: Option<OffsetDateTime>,
    /// Whether the owner opted into the transaction-alert surcharge.
    pub transaction_alert: bool,
    /// The id of the owning user.
    pub owner_id: UserId,
}

/// The fields required to open an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Business-visible account number, unique.
    pub account_number: String,
    /// The opening balance.
    pub balance: Decimal,
    /// The fixed account type.
    pub account_type: AccountType,
    /// Whether this is the owner's default receiving account.
    pub primary_account: bool,
    /// Whether the owner opted into transaction alerts.
    pub transaction_alert: bool,
    /// The id of the owning user.
    pub owner_id: UserId,
}

/// Create the account table.
///
/// The [user](crate::user) table must exist first.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            account_number TEXT NOT NULL UNIQUE,
            balance TEXT NOT NULL,
            account_type TEXT NOT NULL,
            opened_at TEXT NOT NULL,
            primary_account INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            closed_at TEXT,
            transaction_alert INTEGER NOT NULL DEFAULT 0,
            owner_id INTEGER NOT NULL,
            FOREIGN KEY(owner_id) REFERENCES user(id)
        )",
        (),
    )?;

    Ok(())
}

pub(crate) fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    let account_type: String = row.get(3)?;
    let account_type = account_type.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown account type \"{account_type}\"").into(),
        )
    })?;

    Ok(Account {
        id: row.get(0)?,
        account_number: row.get(1)?,
        balance: db::decimal_from_column(row, 2)?,
        account_type,
        opened_at: row.get(4)?,
        primary_account: row.get(5)?,
        active: row.get(6)?,
        closed_at: row.get(7)?,
        transaction_alert: row.get(8)?,
        owner_id: row.get(9)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, account_number, balance, account_type, opened_at, \
     primary_account, active, closed_at, transaction_alert, owner_id";

/// Open an account.
///
/// # Errors
/// Returns [Error::DuplicateAccountNumber] if the account number is taken,
/// or [Error::SqlError] for other SQL errors.
pub fn create_account(
    connection: &Connection,
    new_account: &NewAccount,
    now: OffsetDateTime,
) -> Result<Account, Error> {
    let account = connection
        .prepare(&format!(
            "INSERT INTO account \
             (account_number, balance, account_type, opened_at, primary_account, \
              transaction_alert, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING {ACCOUNT_COLUMNS}"
        ))?
        .query_row(
            (
                &new_account.account_number,
                new_account.balance.to_string(),
                new_account.account_type.as_str(),
                db::to_utc(now),
                new_account.primary_account,
                new_account.transaction_alert,
                new_account.owner_id,
            ),
            map_row_to_account,
        )?;

    Ok(account)
}

/// Retrieve an account by its row id.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to an account, or
/// [Error::SqlError] for other SQL errors.
pub fn get_account_by_id(connection: &Connection, id: AccountId) -> Result<Account, Error> {
    let account = connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = :id"
        ))?
        .query_row(&[(":id", &id)], map_row_to_account)?;

    Ok(account)
}

/// Look up an account by its account number; `None` when absent.
///
/// Callers that intend to mutate the balance must hold the enclosing unit of
/// work before fetching, and fetch pairs of accounts in
/// [lock order](crate::transfer::lock_order).
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_account_by_number(
    connection: &Connection,
    account_number: &str,
) -> Result<Option<Account>, Error> {
    let account = connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE account_number = :account_number"
        ))?
        .query_row(&[(":account_number", &account_number)], map_row_to_account)
        .optional()?;

    Ok(account)
}

/// The accounts owned by `owner_id`, oldest first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_accounts_by_owner(
    connection: &Connection,
    owner_id: UserId,
) -> Result<Vec<Account>, Error> {
    let mut statement = connection.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM account WHERE owner_id = :owner_id ORDER BY id"
    ))?;
    let accounts = statement
        .query_map(&[(":owner_id", &owner_id)], map_row_to_account)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(accounts)
}

/// The owner's primary (default receiving) account; `None` when the owner
/// has not designated one.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_primary_account_by_owner(
    connection: &Connection,
    owner_id: UserId,
) -> Result<Option<Account>, Error> {
    let account = connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account \
             WHERE owner_id = :owner_id AND primary_account = 1"
        ))?
        .query_row(&[(":owner_id", &owner_id)], map_row_to_account)
        .optional()?;

    Ok(account)
}

/// One page of account ids in stable id order, for the batch walk.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_account_id_page(
    connection: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<AccountId>, Error> {
    let mut statement =
        connection.prepare("SELECT id FROM account ORDER BY id LIMIT :limit OFFSET :offset")?;
    let ids = statement
        .query_map(
            named_params! {":limit": limit, ":offset": offset},
            |row| row.get(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ids)
}

/// Overwrite an account's balance.
///
/// Must only be called inside a unit of work that has already fetched the
/// account, so the new balance is derived from the locked row.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to an account, or
/// [Error::SqlError] for other SQL errors.
pub(crate) fn update_balance(
    connection: &Connection,
    id: AccountId,
    balance: Decimal,
) -> Result<(), Error> {
    let rows_updated = connection.execute(
        "UPDATE account SET balance = :balance WHERE id = :id",
        named_params! {":balance": balance.to_string(), ":id": id},
    )?;

    if rows_updated == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}
