//! The funds-transfer engine.
//!
//! Validates and executes a single movement of money between two accounts:
//! ownership of the source, verification of the receiver's name, sufficient
//! funds, and the per-type daily withdrawal/deposit caps. The debit, the
//! credit, and the ledger record are committed in one unit of work; any
//! rejection rolls the whole unit back.
//!
//! Concurrent transfers that touch the same pair of accounts serialise on a
//! fixed lock order (see [lock_order]); disjoint pairs proceed
//! independently.

use rusqlite::Connection;
use rust_decimal::Decimal;
use time::{Duration, OffsetDateTime, Time};

use crate::{
    Error, account,
    account::Account,
    reference,
    transaction::{self, NewTransaction, TransactionType},
    user::{self, User},
};

/// A request to move funds to a destination identified by account number.
#[derive(Debug, Clone)]
pub struct TransferByAccount {
    /// The account to debit; must be owned by the acting user.
    pub from_account_number: String,
    /// The account to credit.
    pub to_account_number: String,
    /// The destination owner's name, verified before any money moves.
    pub to_account_name: String,
    /// The amount to move; must be positive.
    pub amount: Decimal,
    /// Free-text description carried on the ledger record.
    pub description: Option<String>,
    /// The category recorded on the ledger record.
    pub transaction_type: TransactionType,
}

/// A request to move funds to a person rather than an account number.
///
/// The destination is the receiver's primary account, resolved from a CRN
/// or email address.
#[derive(Debug, Clone)]
pub struct TransferByReceiver {
    /// The account to debit; must be owned by the acting user.
    pub from_account_number: String,
    /// CRN or email address of the receiving user.
    pub receiver_identifier: String,
    /// The receiver's name, verified against the resolved user.
    pub receiver_name: String,
    /// The amount to move; must be positive.
    pub amount: Decimal,
    /// Free-text description carried on the ledger record.
    pub description: Option<String>,
    /// The category recorded on the ledger record.
    pub transaction_type: TransactionType,
}

/// Canonical lock order for a pair of account numbers: lexicographically
/// smaller first.
///
/// Both directions of a transfer between the same two accounts acquire rows
/// in the same order, which rules out the circular wait behind
/// opposing-transfer deadlocks. Stores without row locks still fetch in
/// this order so the protocol holds everywhere.
pub fn lock_order<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Execute a transfer addressed by destination account number.
///
/// On success, both balance mutations and the ledger record are committed
/// atomically and the record's reference number is returned. `now` is the
/// caller's clock and fixes the calendar day used for daily-limit
/// accounting.
///
/// # Errors
/// - [Error::NonPositiveAmount], [Error::MissingAccountNumber], or
///   [Error::SameAccount] when the request is malformed,
/// - [Error::AccountNotFound] when either account does not exist,
/// - [Error::NotAccountOwner] when `acting_user` does not own the source,
/// - [Error::ReceiverNameMismatch] when the destination owner's name does
///   not match,
/// - [Error::InsufficientFunds], [Error::WithdrawalLimitExceeded], or
///   [Error::DepositLimitExceeded] when the movement is not allowed,
/// - [Error::SqlError] for unexpected storage errors.
pub fn transfer_by_account(
    connection: &Connection,
    request: &TransferByAccount,
    acting_user: &User,
    now: OffsetDateTime,
) -> Result<String, Error> {
    validate_amount(request.amount)?;
    if request.from_account_number.is_empty() || request.to_account_number.is_empty() {
        return Err(Error::MissingAccountNumber);
    }
    if request.from_account_number == request.to_account_number {
        return Err(Error::SameAccount);
    }

    let unit = connection.unchecked_transaction()?;

    let (first, second) = lock_order(&request.from_account_number, &request.to_account_number);
    let first_account = fetch_required(&unit, first)?;
    let second_account = fetch_required(&unit, second)?;
    let (from_account, to_account) = if first == request.from_account_number {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    if from_account.owner_id != acting_user.id {
        return Err(Error::NotAccountOwner);
    }

    let to_owner = user::get_user_by_id(&unit, to_account.owner_id)?;
    if !receiver_name_matches(&to_owner, &request.to_account_name) {
        return Err(Error::ReceiverNameMismatch);
    }

    let reference_number = post_transfer(
        &unit,
        from_account,
        to_account,
        request.amount,
        request.transaction_type,
        request.description.as_deref(),
        now,
    )?;
    unit.commit()?;

    Ok(reference_number)
}

/// Execute a transfer addressed by receiver identity (CRN or email).
///
/// The receiver's name is verified against the resolved user, not the
/// account; the money lands in the receiver's primary account.
///
/// # Errors
/// As [transfer_by_account], plus [Error::ReceiverNotFound] when no user
/// matches the identifier and [Error::NoPrimaryAccount] when the receiver
/// has not designated a primary account.
pub fn transfer_by_receiver(
    connection: &Connection,
    request: &TransferByReceiver,
    acting_user: &User,
    now: OffsetDateTime,
) -> Result<String, Error> {
    validate_amount(request.amount)?;
    if request.from_account_number.is_empty() {
        return Err(Error::MissingAccountNumber);
    }

    let unit = connection.unchecked_transaction()?;

    let receiver = match user::get_user_by_crn(&unit, &request.receiver_identifier)? {
        Some(receiver) => receiver,
        None => user::get_user_by_email(&unit, &request.receiver_identifier)?
            .ok_or_else(|| Error::ReceiverNotFound(request.receiver_identifier.clone()))?,
    };

    if !receiver_name_matches(&receiver, &request.receiver_name) {
        return Err(Error::ReceiverNameMismatch);
    }

    let to_account = account::get_primary_account_by_owner(&unit, receiver.id)?
        .ok_or(Error::NoPrimaryAccount)?;
    if to_account.account_number == request.from_account_number {
        return Err(Error::SameAccount);
    }

    let from_account = fetch_required(&unit, &request.from_account_number)?;
    if from_account.owner_id != acting_user.id {
        return Err(Error::NotAccountOwner);
    }

    let reference_number = post_transfer(
        &unit,
        from_account,
        to_account,
        request.amount,
        request.transaction_type,
        request.description.as_deref(),
        now,
    )?;
    unit.commit()?;

    Ok(reference_number)
}

fn validate_amount(amount: Decimal) -> Result<(), Error> {
    if amount <= Decimal::ZERO {
        return Err(Error::NonPositiveAmount(amount));
    }

    Ok(())
}

fn fetch_required(connection: &Connection, account_number: &str) -> Result<Account, Error> {
    account::get_account_by_number(connection, account_number)?
        .ok_or_else(|| Error::AccountNotFound(account_number.to_string()))
}

/// Funds, limits, debit, credit, and the ledger record. Callers have
/// already resolved and authorised both accounts and hold the unit of work.
fn post_transfer(
    connection: &Connection,
    mut from_account: Account,
    mut to_account: Account,
    amount: Decimal,
    transaction_type: TransactionType,
    description: Option<&str>,
    now: OffsetDateTime,
) -> Result<String, Error> {
    if from_account.balance < amount {
        return Err(Error::InsufficientFunds);
    }

    let (day_start, day_end) = day_bounds(now);

    let sent_today = transaction::sum_sent_between(connection, from_account.id, day_start, day_end)?;
    if sent_today + amount > from_account.account_type.max_daily_withdrawal() {
        return Err(Error::WithdrawalLimitExceeded);
    }

    let received_today =
        transaction::sum_received_between(connection, to_account.id, day_start, day_end)?;
    if received_today + amount > to_account.account_type.max_daily_deposit() {
        return Err(Error::DepositLimitExceeded);
    }

    from_account.balance -= amount;
    to_account.balance += amount;
    account::update_balance(connection, from_account.id, from_account.balance)?;
    account::update_balance(connection, to_account.id, to_account.balance)?;

    let record = transaction::insert_transaction(
        connection,
        &NewTransaction {
            reference_number: reference::new_reference_number(),
            executed_at: now,
            transaction_type,
            amount,
            from_account_id: Some(from_account.id),
            to_account_id: Some(to_account.id),
            description: description.map(str::to_string),
            from_balance_after: Some(from_account.balance),
            to_balance_after: Some(to_account.balance),
        },
    )?;

    tracing::info!(
        reference_number = %record.reference_number,
        from = %from_account.account_number,
        to = %to_account.account_number,
        %amount,
        "transfer completed"
    );

    Ok(record.reference_number)
}

/// The calendar day containing `now`, in `now`'s offset, as a half-open
/// datetime range.
fn day_bounds(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let start = now.replace_time(Time::MIDNIGHT);

    (start, start + Duration::days(1))
}

/// Whether `provided` names the receiver, ignoring case and repeated
/// whitespace. The receiver's first and last name tokens may be given in
/// either order.
fn receiver_name_matches(receiver: &User, provided: &str) -> bool {
    let provided = collapse_whitespace(provided);
    if provided.is_empty() {
        return false;
    }

    let actual = collapse_whitespace(&receiver.full_name());
    if actual == provided {
        return true;
    }

    let tokens: Vec<&str> = actual.split(' ').collect();
    if tokens.len() >= 2 {
        let reversed = format!("{} {}", tokens[tokens.len() - 1], tokens[0]);
        if reversed == provided {
            return true;
        }
    }

    false
}

fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::{OffsetDateTime, macros::datetime};

    use super::{
        TransferByAccount, TransferByReceiver, lock_order, receiver_name_matches,
        transfer_by_account, transfer_by_receiver,
    };
    use crate::{
        Error,
        account::{Account, NewAccount, create_account, get_account_by_number},
        account_type::AccountType,
        db,
        transaction::{NewTransaction, STATUS_COMPLETED, TransactionType, insert_transaction},
        user::{NewUser, User, create_user},
    };

    const NOW: OffsetDateTime = datetime!(2026-08-30 12:00 UTC);

    struct Fixture {
        connection: Connection,
        alice: User,
        bob: User,
    }

    fn fixture() -> Fixture {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");
        db::initialize(&connection, NOW).expect("Could not initialise database");

        let alice = create_user(
            &connection,
            &NewUser {
                crn: "CRN1".to_string(),
                email: "alice@test.com".to_string(),
                first_name: "Alice".to_string(),
                last_name: "Wonder".to_string(),
            },
        )
        .expect("Could not create user");
        let bob = create_user(
            &connection,
            &NewUser {
                crn: "CRN2".to_string(),
                email: "bob@test.com".to_string(),
                first_name: "Bob".to_string(),
                last_name: "Marley".to_string(),
            },
        )
        .expect("Could not create user");

        create_account(
            &connection,
            &NewAccount {
                account_number: "ACC1001".to_string(),
                balance: dec!(1000.00),
                account_type: AccountType::Savings,
                primary_account: true,
                transaction_alert: false,
                owner_id: alice.id,
            },
            NOW,
        )
        .expect("Could not create account");
        create_account(
            &connection,
            &NewAccount {
                account_number: "ACC2001".to_string(),
                balance: dec!(500.00),
                account_type: AccountType::Savings,
                primary_account: true,
                transaction_alert: false,
                owner_id: bob.id,
            },
            NOW,
        )
        .expect("Could not create account");

        Fixture {
            connection,
            alice,
            bob,
        }
    }

    fn to_bob(amount: Decimal) -> TransferByAccount {
        TransferByAccount {
            from_account_number: "ACC1001".to_string(),
            to_account_number: "ACC2001".to_string(),
            to_account_name: "Bob Marley".to_string(),
            amount,
            description: Some("rent".to_string()),
            transaction_type: TransactionType::Transfer,
        }
    }

    fn balance_of(connection: &Connection, account_number: &str) -> Decimal {
        get_account_by_number(connection, account_number)
            .expect("Could not query account")
            .expect("Account not found")
            .balance
    }

    fn account_of(connection: &Connection, account_number: &str) -> Account {
        get_account_by_number(connection, account_number)
            .expect("Could not query account")
            .expect("Account not found")
    }

    fn transaction_count(connection: &Connection) -> i64 {
        connection
            .query_row("SELECT COUNT(*) FROM transaction_record", [], |row| {
                row.get(0)
            })
            .expect("Could not count transactions")
    }

    /// Seed a prior same-day movement so daily-limit accounting has history.
    fn post_prior(
        connection: &Connection,
        from: &str,
        to: &str,
        amount: Decimal,
        executed_at: OffsetDateTime,
    ) {
        let from = account_of(connection, from);
        let to = account_of(connection, to);
        insert_transaction(
            connection,
            &NewTransaction {
                reference_number: crate::reference::new_reference_number(),
                executed_at,
                transaction_type: TransactionType::Transfer,
                amount,
                from_account_id: Some(from.id),
                to_account_id: Some(to.id),
                description: None,
                from_balance_after: Some(from.balance),
                to_balance_after: Some(to.balance),
            },
        )
        .expect("Could not insert prior transaction");
    }

    #[test]
    fn successful_transfer_moves_funds_and_records_snapshots() {
        let fixture = fixture();

        let reference =
            transfer_by_account(&fixture.connection, &to_bob(dec!(200.00)), &fixture.alice, NOW)
                .expect("Transfer should succeed");

        assert_eq!(reference.len(), 32);
        assert_eq!(balance_of(&fixture.connection, "ACC1001"), dec!(800.00));
        assert_eq!(balance_of(&fixture.connection, "ACC2001"), dec!(700.00));

        let record = fixture
            .connection
            .query_row(
                "SELECT status, amount, from_balance_after, to_balance_after \
                 FROM transaction_record WHERE reference_number = ?1",
                [&reference],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .expect("Ledger record missing");
        assert_eq!(record.0, STATUS_COMPLETED);
        assert_eq!(record.1, "200.00");
        assert_eq!(record.2, "800.00");
        assert_eq!(record.3, "700.00");
        assert_eq!(transaction_count(&fixture.connection), 1);
    }

    #[test]
    fn insufficient_funds_leaves_everything_untouched() {
        let fixture = fixture();

        let result =
            transfer_by_account(&fixture.connection, &to_bob(dec!(5000.00)), &fixture.alice, NOW);

        assert_eq!(result, Err(Error::InsufficientFunds));
        assert_eq!(balance_of(&fixture.connection, "ACC1001"), dec!(1000.00));
        assert_eq!(balance_of(&fixture.connection, "ACC2001"), dec!(500.00));
        assert_eq!(transaction_count(&fixture.connection), 0);
    }

    #[test]
    fn only_the_owner_may_send() {
        let fixture = fixture();

        let result =
            transfer_by_account(&fixture.connection, &to_bob(dec!(10.00)), &fixture.bob, NOW);

        assert_eq!(result, Err(Error::NotAccountOwner));
        assert_eq!(transaction_count(&fixture.connection), 0);
    }

    #[test]
    fn wrong_receiver_name_is_rejected() {
        let fixture = fixture();

        let mut request = to_bob(dec!(10.00));
        request.to_account_name = "Bob Dylan".to_string();
        let result = transfer_by_account(&fixture.connection, &request, &fixture.alice, NOW);

        assert_eq!(result, Err(Error::ReceiverNameMismatch));
        assert_eq!(balance_of(&fixture.connection, "ACC1001"), dec!(1000.00));
        assert_eq!(transaction_count(&fixture.connection), 0);
    }

    #[test]
    fn receiver_name_matching_is_lenient() {
        let fixture = fixture();

        for name in ["  bob   MARLEY ", "Marley Bob", "bob marley"] {
            let mut request = to_bob(dec!(1.00));
            request.to_account_name = name.to_string();
            transfer_by_account(&fixture.connection, &request, &fixture.alice, NOW)
                .unwrap_or_else(|error| panic!("name {name:?} should match: {error}"));
        }
    }

    #[test]
    fn malformed_requests_are_rejected_up_front() {
        let fixture = fixture();

        let result =
            transfer_by_account(&fixture.connection, &to_bob(dec!(0.00)), &fixture.alice, NOW);
        assert_eq!(result, Err(Error::NonPositiveAmount(dec!(0.00))));

        let result =
            transfer_by_account(&fixture.connection, &to_bob(dec!(-5.00)), &fixture.alice, NOW);
        assert_eq!(result, Err(Error::NonPositiveAmount(dec!(-5.00))));

        let mut request = to_bob(dec!(10.00));
        request.to_account_number = String::new();
        let result = transfer_by_account(&fixture.connection, &request, &fixture.alice, NOW);
        assert_eq!(result, Err(Error::MissingAccountNumber));

        let mut request = to_bob(dec!(10.00));
        request.to_account_number = "ACC1001".to_string();
        let result = transfer_by_account(&fixture.connection, &request, &fixture.alice, NOW);
        assert_eq!(result, Err(Error::SameAccount));

        assert_eq!(transaction_count(&fixture.connection), 0);
    }

    #[test]
    fn unknown_accounts_are_reported() {
        let fixture = fixture();

        let mut request = to_bob(dec!(10.00));
        request.to_account_number = "ACC9999".to_string();
        let result = transfer_by_account(&fixture.connection, &request, &fixture.alice, NOW);
        assert_eq!(result, Err(Error::AccountNotFound("ACC9999".to_string())));

        let mut request = to_bob(dec!(10.00));
        request.from_account_number = "ACC0000".to_string();
        let result = transfer_by_account(&fixture.connection, &request, &fixture.alice, NOW);
        assert_eq!(result, Err(Error::AccountNotFound("ACC0000".to_string())));
    }

    #[test]
    fn daily_withdrawal_cap_counts_todays_outgoings() {
        let fixture = fixture();
        // Savings cap is 5000.00/day; 4900.00 already left the account today.
        post_prior(
            &fixture.connection,
            "ACC1001",
            "ACC2001",
            dec!(4900.00),
            datetime!(2026-08-30 08:00 UTC),
        );

        let result =
            transfer_by_account(&fixture.connection, &to_bob(dec!(200.00)), &fixture.alice, NOW);

        assert_eq!(result, Err(Error::WithdrawalLimitExceeded));
        assert_eq!(balance_of(&fixture.connection, "ACC1001"), dec!(1000.00));
    }

    #[test]
    fn daily_limit_resets_at_the_day_boundary() {
        let fixture = fixture();
        post_prior(
            &fixture.connection,
            "ACC1001",
            "ACC2001",
            dec!(4900.00),
            datetime!(2026-08-30 23:59 UTC),
        );

        let at_2359 = transfer_by_account(
            &fixture.connection,
            &to_bob(dec!(200.00)),
            &fixture.alice,
            datetime!(2026-08-30 23:59 UTC),
        );
        assert_eq!(at_2359, Err(Error::WithdrawalLimitExceeded));

        transfer_by_account(
            &fixture.connection,
            &to_bob(dec!(200.00)),
            &fixture.alice,
            datetime!(2026-08-31 00:01 UTC),
        )
        .expect("The cap should reset on the next calendar day");
    }

    #[test]
    fn daily_deposit_cap_counts_todays_incomings() {
        let fixture = fixture();
        // Fill Bob's 100000.00 deposit cap for the day from elsewhere so
        // Alice's own withdrawal cap stays out of the picture.
        post_prior(
            &fixture.connection,
            db::CLEARING_ACCOUNT_NUMBER,
            "ACC2001",
            dec!(99950.00),
            datetime!(2026-08-30 08:00 UTC),
        );

        let result =
            transfer_by_account(&fixture.connection, &to_bob(dec!(200.00)), &fixture.alice, NOW);

        assert_eq!(result, Err(Error::DepositLimitExceeded));
        assert_eq!(balance_of(&fixture.connection, "ACC2001"), dec!(500.00));
    }

    #[test]
    fn transfer_by_receiver_resolves_crn_then_email() {
        let fixture = fixture();

        let by_crn = TransferByReceiver {
            from_account_number: "ACC1001".to_string(),
            receiver_identifier: "CRN2".to_string(),
            receiver_name: "Bob Marley".to_string(),
            amount: dec!(100.00),
            description: None,
            transaction_type: TransactionType::Transfer,
        };
        transfer_by_receiver(&fixture.connection, &by_crn, &fixture.alice, NOW)
            .expect("Transfer by CRN should succeed");

        let by_email = TransferByReceiver {
            receiver_identifier: "bob@test.com".to_string(),
            ..by_crn.clone()
        };
        transfer_by_receiver(&fixture.connection, &by_email, &fixture.alice, NOW)
            .expect("Transfer by email should succeed");

        assert_eq!(balance_of(&fixture.connection, "ACC1001"), dec!(800.00));
        assert_eq!(balance_of(&fixture.connection, "ACC2001"), dec!(700.00));
    }

    #[test]
    fn transfer_by_receiver_requires_a_known_receiver_with_primary_account() {
        let fixture = fixture();

        let mut request = TransferByReceiver {
            from_account_number: "ACC1001".to_string(),
            receiver_identifier: "CRN404".to_string(),
            receiver_name: "Bob Marley".to_string(),
            amount: dec!(100.00),
            description: None,
            transaction_type: TransactionType::Transfer,
        };
        let result = transfer_by_receiver(&fixture.connection, &request, &fixture.alice, NOW);
        assert_eq!(result, Err(Error::ReceiverNotFound("CRN404".to_string())));

        fixture
            .connection
            .execute(
                "UPDATE account SET primary_account = 0 WHERE account_number = 'ACC2001'",
                [],
            )
            .expect("Could not update account");
        request.receiver_identifier = "CRN2".to_string();
        let result = transfer_by_receiver(&fixture.connection, &request, &fixture.alice, NOW);
        assert_eq!(result, Err(Error::NoPrimaryAccount));
    }

    #[test]
    fn transfer_by_receiver_verifies_the_resolved_user() {
        let fixture = fixture();

        let request = TransferByReceiver {
            from_account_number: "ACC1001".to_string(),
            receiver_identifier: "CRN2".to_string(),
            receiver_name: "Ziggy Marley".to_string(),
            amount: dec!(100.00),
            description: None,
            transaction_type: TransactionType::Transfer,
        };
        let result = transfer_by_receiver(&fixture.connection, &request, &fixture.alice, NOW);

        assert_eq!(result, Err(Error::ReceiverNameMismatch));
        assert_eq!(transaction_count(&fixture.connection), 0);
    }

    #[test]
    fn lock_order_is_direction_independent() {
        assert_eq!(lock_order("ACC1001", "ACC2001"), ("ACC1001", "ACC2001"));
        assert_eq!(lock_order("ACC2001", "ACC1001"), ("ACC1001", "ACC2001"));
        assert_eq!(lock_order("ACC1001", "ACC1001"), ("ACC1001", "ACC1001"));
    }

    #[test]
    fn name_matching_rules() {
        let bob = User {
            id: 1,
            crn: "CRN2".to_string(),
            email: "bob@test.com".to_string(),
            first_name: "Bob".to_string(),
            last_name: "Marley".to_string(),
        };

        assert!(receiver_name_matches(&bob, "Bob Marley"));
        assert!(receiver_name_matches(&bob, "bob  marley"));
        assert!(receiver_name_matches(&bob, "Marley Bob"));
        assert!(!receiver_name_matches(&bob, ""));
        assert!(!receiver_name_matches(&bob, "   "));
        assert!(!receiver_name_matches(&bob, "Bob"));
        assert!(!receiver_name_matches(&bob, "Bob Marley Junior"));
    }
}
