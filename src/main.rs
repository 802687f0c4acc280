use std::{path::Path, process::exit};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use corebank::{
    db, monthly,
    monthly::Period,
    schedule, summary,
    transfer::{self, TransferByAccount},
    transaction::TransactionType,
    user,
};

/// Operations console for the banking core.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema and the internal clearing account.
    Init {
        /// File path to the SQLite database to create.
        #[arg(long)]
        db_path: String,
    },
    /// Run the monthly accrual job.
    RunMonthly {
        /// File path to the application SQLite database.
        #[arg(long)]
        db_path: String,

        /// The period year; defaults to the period due now.
        #[arg(long, requires = "month")]
        year: Option<i32>,

        /// The period month (1-12); defaults to the period due now.
        #[arg(long, requires = "year")]
        month: Option<u8>,
    },
    /// Transfer funds between two accounts on behalf of a customer.
    Transfer {
        /// File path to the application SQLite database.
        #[arg(long)]
        db_path: String,

        /// Customer reference number of the sender.
        #[arg(long)]
        crn: String,

        /// The account to debit; must belong to the sender.
        #[arg(long)]
        from: String,

        /// The account to credit.
        #[arg(long)]
        to: String,

        /// The receiver's name as the sender knows it.
        #[arg(long)]
        to_name: String,

        /// The amount to move.
        #[arg(long)]
        amount: Decimal,

        /// An optional note recorded on the posting.
        #[arg(long)]
        description: Option<String>,
    },
    /// Print an account's month-to-date summary as JSON.
    Summary {
        /// File path to the application SQLite database.
        #[arg(long)]
        db_path: String,

        /// The account number to summarise.
        #[arg(long)]
        account_number: String,
    },
}

fn main() {
    setup_logging();

    let args = Args::parse();
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());

    let result = match args.command {
        Command::Init { db_path } => init(&db_path, now),
        Command::RunMonthly {
            db_path,
            year,
            month,
        } => run_monthly(&db_path, year, month, now),
        Command::Transfer {
            db_path,
            crn,
            from,
            to,
            to_name,
            amount,
            description,
        } => run_transfer(&db_path, &crn, from, to, to_name, amount, description, now),
        Command::Summary {
            db_path,
            account_number,
        } => print_summary(&db_path, &account_number, now),
    };

    if let Err(error) = result {
        eprintln!("{error}");
        exit(1);
    }
}

fn init(db_path: &str, now: OffsetDateTime) -> Result<(), Box<dyn std::error::Error>> {
    if Path::new(db_path).is_file() {
        return Err(format!("File already exists at {db_path:?}").into());
    }

    let connection = Connection::open(db_path)?;
    db::initialize(&connection, now)?;

    println!("Database created at {db_path:?}");
    Ok(())
}

fn run_monthly(
    db_path: &str,
    year: Option<i32>,
    month: Option<u8>,
    now: OffsetDateTime,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = open_existing(db_path)?;

    let outcome = match (year, month) {
        (Some(year), Some(month)) => {
            if !(1..=12).contains(&month) {
                return Err(format!("{month} is not a calendar month").into());
            }
            monthly::run_monthly_job(&connection, Period { year, month }, now)?
        }
        _ => schedule::run_due_monthly_job(&connection, now)?,
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_transfer(
    db_path: &str,
    crn: &str,
    from_account_number: String,
    to_account_number: String,
    to_account_name: String,
    amount: Decimal,
    description: Option<String>,
    now: OffsetDateTime,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = open_existing(db_path)?;

    let acting_user = user::get_user_by_crn(&connection, crn)?
        .ok_or_else(|| format!("No customer with CRN {crn}"))?;

    let reference_number = transfer::transfer_by_account(
        &connection,
        &TransferByAccount {
            from_account_number,
            to_account_number,
            to_account_name,
            amount,
            description,
            transaction_type: TransactionType::Transfer,
        },
        &acting_user,
        now,
    )?;

    println!("Transfer completed with reference {reference_number}");
    Ok(())
}

fn print_summary(
    db_path: &str,
    account_number: &str,
    now: OffsetDateTime,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = open_existing(db_path)?;
    let account_summary = summary::summarize_account(&connection, account_number, now)?;

    println!("{}", serde_json::to_string_pretty(&account_summary)?);
    Ok(())
}

fn open_existing(db_path: &str) -> Result<Connection, Box<dyn std::error::Error>> {
    if !Path::new(db_path).is_file() {
        return Err(format!("No database at {db_path:?}").into());
    }

    Ok(Connection::open(db_path)?)
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let filter = filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(stdout_log.with_filter(filter))
        .init();
}
