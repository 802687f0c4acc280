//! Defines the crate-level error type shared by the transfer and accrual
//! engines.

use rust_decimal::Decimal;

/// The errors that may occur while moving money or running accruals.
///
/// A rejected operation never leaves partial writes behind: the enclosing
/// unit of work is rolled back before the error reaches the caller.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A transfer was requested with a zero or negative amount.
    #[error("transfer amounts must be greater than zero, got {0}")]
    NonPositiveAmount(Decimal),

    /// A transfer was requested with an empty account number.
    #[error("both account numbers are required for a transfer")]
    MissingAccountNumber,

    /// The source and destination of a transfer are the same account.
    #[error("cannot transfer from an account to itself")]
    SameAccount,

    /// No account with the given account number exists.
    #[error("account \"{0}\" could not be found")]
    AccountNotFound(String),

    /// No user matched the receiver identifier (CRN or email).
    #[error("no receiver matches \"{0}\"")]
    ReceiverNotFound(String),

    /// The resolved receiver has no primary account to deposit into.
    #[error("the receiver does not have a primary account")]
    NoPrimaryAccount,

    /// The acting user does not own the source account.
    #[error("the acting user is not allowed to transfer from this account")]
    NotAccountOwner,

    /// The provided receiver name does not match the destination owner.
    #[error("receiver details are incorrect")]
    ReceiverNameMismatch,

    /// The source account balance is less than the transfer amount.
    #[error("insufficient balance")]
    InsufficientFunds,

    /// The transfer would push the source account past its daily
    /// withdrawal cap.
    #[error("daily withdrawal limit exceeded for the source account")]
    WithdrawalLimitExceeded,

    /// The transfer would push the destination account past its daily
    /// deposit cap.
    #[error("daily deposit limit exceeded for the destination account")]
    DepositLimitExceeded,

    /// A stored account type string did not match the fixed catalog.
    #[error("\"{0}\" is not a known account type")]
    UnknownAccountType(String),

    /// A stored transaction type string did not match a known category.
    #[error("\"{0}\" is not a known transaction type")]
    UnknownTransactionType(String),

    /// The account number chosen for a new account is already taken.
    #[error("the account number is already in use")]
    DuplicateAccountNumber,

    /// A batch run is already recorded for the requested job and period.
    #[error("a job run is already recorded for this period")]
    DuplicateJobRun,

    /// The requested record could not be found.
    ///
    /// Internally, this error occurs when a query returns no rows.
    #[error("the requested record could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("job_run") =>
            {
                Error::DuplicateJobRun
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("account_number") =>
            {
                Error::DuplicateAccountNumber
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
