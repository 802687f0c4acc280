//! The immutable ledger record created alongside every balance mutation.
//!
//! A record is always inserted in the same unit of work as the debit/credit
//! it reflects, so the ledger and account balances never diverge. Records
//! are write-once; nothing in this module updates or deletes them.

use rusqlite::{Connection, Row, named_params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use time::OffsetDateTime;

use crate::{Error, account::AccountId, db};

/// The status every record is created with; no partial or pending state
/// exists.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// The business category of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// A customer-initiated funds movement.
    Transfer,
    /// Monthly interest credited by the accrual job.
    Interest,
    /// A fee, penalty, or surcharge debited by the accrual job.
    Fee,
}

impl TransactionType {
    /// The canonical string stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Interest => "INTEREST",
            TransactionType::Fee => "FEE",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER" => Ok(TransactionType::Transfer),
            "INTEREST" => Ok(TransactionType::Interest),
            "FEE" => Ok(TransactionType::Fee),
            other => Err(Error::UnknownTransactionType(other.to_string())),
        }
    }
}

/// One immutable ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The id of the record.
    pub id: i64,
    /// Globally unique business reference number.
    pub reference_number: String,
    /// When the record was posted (UTC, set by the engine).
    pub executed_at: OffsetDateTime,
    /// The business category of the record.
    pub transaction_type: TransactionType,
    /// The amount moved; always positive.
    pub amount: Decimal,
    /// The debited account. Both sides are set for records created by this
    /// engine; the schema permits absence for externally imported entries.
    pub from_account_id: Option<AccountId>,
    /// The credited account.
    pub to_account_id: Option<AccountId>,
    /// Free-text description.
    pub description: Option<String>,
    /// The record status; always [STATUS_COMPLETED].
    pub status: String,
    /// The source balance immediately after posting, when a source exists.
    pub from_balance_after: Option<Decimal>,
    /// The destination balance immediately after posting, when known.
    pub to_balance_after: Option<Decimal>,
}

/// The fields required to post a ledger record.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Globally unique business reference number.
    pub reference_number: String,
    /// When the record is posted.
    pub executed_at: OffsetDateTime,
    /// The business category of the record.
    pub transaction_type: TransactionType,
    /// The amount moved; always positive.
    pub amount: Decimal,
    /// The debited account.
    pub from_account_id: Option<AccountId>,
    /// The credited account.
    pub to_account_id: Option<AccountId>,
    /// Free-text description.
    pub description: Option<String>,
    /// The source balance immediately after posting.
    pub from_balance_after: Option<Decimal>,
    /// The destination balance immediately after posting.
    pub to_balance_after: Option<Decimal>,
}

/// Create the transaction table and its range-query indexes.
///
/// The [account](crate::account) table must exist first. The table is named
/// `transaction_record` because `transaction` is a reserved word.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS transaction_record (
            id INTEGER PRIMARY KEY,
            reference_number TEXT NOT NULL UNIQUE,
            executed_at TEXT NOT NULL,
            transaction_type TEXT NOT NULL,
            amount TEXT NOT NULL,
            from_account_id INTEGER,
            to_account_id INTEGER,
            description TEXT,
            status TEXT NOT NULL,
            from_balance_after TEXT,
            to_balance_after TEXT,
            FOREIGN KEY(from_account_id) REFERENCES account(id),
            FOREIGN KEY(to_account_id) REFERENCES account(id)
        );
        CREATE INDEX IF NOT EXISTS idx_transaction_from
            ON transaction_record (from_account_id, executed_at);
        CREATE INDEX IF NOT EXISTS idx_transaction_to
            ON transaction_record (to_account_id, executed_at);",
    )?;

    Ok(())
}

pub(crate) fn map_row_to_transaction(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let transaction_type: String = row.get(3)?;
    let transaction_type = transaction_type.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown transaction type \"{transaction_type}\"").into(),
        )
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        reference_number: row.get(1)?,
        executed_at: row.get(2)?,
        transaction_type,
        amount: db::decimal_from_column(row, 4)?,
        from_account_id: row.get(5)?,
        to_account_id: row.get(6)?,
        description: row.get(7)?,
        status: row.get(8)?,
        from_balance_after: db::optional_decimal_from_column(row, 9)?,
        to_balance_after: db::optional_decimal_from_column(row, 10)?,
    })
}

const TRANSACTION_COLUMNS: &str = "id, reference_number, executed_at, transaction_type, amount, \
     from_account_id, to_account_id, description, status, from_balance_after, to_balance_after";

/// Post a ledger record with [STATUS_COMPLETED].
///
/// Callers must hold the unit of work that carries the matching balance
/// mutations.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn insert_transaction(
    connection: &Connection,
    new_transaction: &NewTransaction,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "INSERT INTO transaction_record \
             (reference_number, executed_at, transaction_type, amount, from_account_id, \
              to_account_id, description, status, from_balance_after, to_balance_after)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                &new_transaction.reference_number,
                db::to_utc(new_transaction.executed_at),
                new_transaction.transaction_type.as_str(),
                new_transaction.amount.to_string(),
                new_transaction.from_account_id,
                new_transaction.to_account_id,
                &new_transaction.description,
                STATUS_COMPLETED,
                new_transaction.from_balance_after.map(|d| d.to_string()),
                new_transaction.to_balance_after.map(|d| d.to_string()),
            ),
            map_row_to_transaction,
        )?;

    Ok(transaction)
}

/// Sum of amounts sent from `account_id` within `[from, to)`.
///
/// Amounts are summed as [Decimal] values in Rust; SQL `SUM` would coerce
/// the stored strings to floats.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn sum_sent_between(
    connection: &Connection,
    account_id: AccountId,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<Decimal, Error> {
    sum_amounts(connection, "from_account_id", account_id, from, to)
}

/// Sum of amounts received by `account_id` within `[from, to)`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn sum_received_between(
    connection: &Connection,
    account_id: AccountId,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<Decimal, Error> {
    sum_amounts(connection, "to_account_id", account_id, from, to)
}

fn sum_amounts(
    connection: &Connection,
    side_column: &str,
    account_id: AccountId,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<Decimal, Error> {
    let mut statement = connection.prepare(&format!(
        "SELECT amount FROM transaction_record \
         WHERE {side_column} = :account_id AND executed_at >= :from AND executed_at < :to"
    ))?;
    let mut rows = statement.query(named_params! {
        ":account_id": account_id,
        ":from": db::to_utc(from),
        ":to": db::to_utc(to),
    })?;

    let mut total = Decimal::ZERO;
    while let Some(row) = rows.next()? {
        total += db::decimal_from_column(row, 0)?;
    }

    Ok(total)
}

/// All records in which `account_id` is either side, newest first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_transactions_for_account(
    connection: &Connection,
    account_id: AccountId,
) -> Result<Vec<Transaction>, Error> {
    let mut statement = connection.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transaction_record \
         WHERE from_account_id = :account_id OR to_account_id = :account_id \
         ORDER BY executed_at DESC, id DESC"
    ))?;
    let transactions = statement
        .query_map(&[(":account_id", &account_id)], map_row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}
