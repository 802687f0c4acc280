//! A small retail-banking core: customer funds transfers and a monthly
//! accrual batch, on top of SQLite.
//!
//! Money is decimal end to end ([rust_decimal::Decimal] stored as TEXT),
//! datetimes are stored in UTC so their encodings order chronologically,
//! and every mutating operation runs in a single SQLite transaction.
//!
//! The two engines are [transfer] (validated, limit-checked account to
//! account movement) and [monthly] (interest, fees, and penalties applied
//! once per calendar period under a [job_run] idempotency gate).

#![warn(missing_docs)]

pub mod account;
pub mod account_type;
pub mod db;
mod error;
pub mod job_run;
pub mod monthly;
pub mod reference;
pub mod schedule;
pub mod summary;
pub mod transaction;
pub mod transfer;
pub mod user;

pub use db::{CLEARING_ACCOUNT_NUMBER, initialize as initialize_db};
pub use error::Error;
