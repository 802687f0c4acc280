//! The fixed account-type catalog.
//!
//! Each type carries an immutable set of financial parameters: fees, the
//! annual interest rate, the minimum-balance rule, and the daily movement
//! caps. These are constants in code and are looked up, never mutated.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::Error;

/// One of the fixed account types offered by the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Interest-bearing account with a minimum-balance rule.
    Savings,
    /// Salary account: low interest, monthly fee, no minimum balance.
    Salary,
    /// Current account: no interest, high movement caps.
    Current,
}

impl AccountType {
    /// Human-readable name of the account type.
    pub fn display_name(self) -> &'static str {
        match self {
            AccountType::Savings => "Savings Account",
            AccountType::Salary => "Salary Account",
            AccountType::Current => "Current Account",
        }
    }

    /// One-off charge applied when an account of this type is opened.
    pub fn opening_charge(self) -> Decimal {
        match self {
            AccountType::Savings => dec!(0.00),
            AccountType::Salary => dec!(0.00),
            AccountType::Current => dec!(500.00),
        }
    }

    /// Annual interest rate as a percentage, e.g. `3.50` for 3.5% p.a.
    pub fn interest_rate(self) -> Decimal {
        match self {
            AccountType::Savings => dec!(3.50),
            AccountType::Salary => dec!(1.50),
            AccountType::Current => dec!(0.00),
        }
    }

    /// Fee debited by the monthly accrual job.
    pub fn monthly_fee(self) -> Decimal {
        match self {
            AccountType::Savings => dec!(0.00),
            AccountType::Salary => dec!(500.00),
            AccountType::Current => dec!(500.00),
        }
    }

    /// Balance below which the minimum-balance penalty applies.
    pub fn minimum_balance(self) -> Decimal {
        match self {
            AccountType::Savings => dec!(500.00),
            AccountType::Salary => dec!(0.00),
            AccountType::Current => dec!(5000.00),
        }
    }

    /// Penalty debited when the balance is below [Self::minimum_balance].
    pub fn minimum_balance_penalty(self) -> Decimal {
        match self {
            AccountType::Savings => dec!(50.00),
            AccountType::Salary => dec!(0.00),
            AccountType::Current => dec!(250.00),
        }
    }

    /// Maximum cumulative amount the account may send in one calendar day.
    pub fn max_daily_withdrawal(self) -> Decimal {
        match self {
            AccountType::Savings => dec!(5000.00),
            AccountType::Salary => dec!(20000.00),
            AccountType::Current => dec!(100000.00),
        }
    }

    /// Maximum cumulative amount the account may receive in one calendar day.
    pub fn max_daily_deposit(self) -> Decimal {
        match self {
            AccountType::Savings => dec!(100000.00),
            AccountType::Salary => dec!(200000.00),
            AccountType::Current => dec!(2000000.00),
        }
    }

    /// The canonical string stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Savings => "SAVINGS",
            AccountType::Salary => "SALARY",
            AccountType::Current => "CURRENT",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAVINGS" => Ok(AccountType::Savings),
            "SALARY" => Ok(AccountType::Salary),
            "CURRENT" => Ok(AccountType::Current),
            other => Err(Error::UnknownAccountType(other.to_string())),
        }
    }
}
