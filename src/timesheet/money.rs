//! Fixed-point money amounts stored as integer cents.

use regex::Regex;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:rm|\$)?\s*(\d{1,9})(?:\.(\d{1,2}))?$").expect("amount regex is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("'{0}' is not a valid amount (expected e.g. 12 or 12.50)")]
    Invalid(String),
    #[error("amount must be greater than zero")]
    NotPositive,
}

/// An amount of money in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[cfg(test)]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Parse a user-supplied amount that must be strictly positive.
    pub fn parse_positive(input: &str) -> Result<Self, MoneyError> {
        let amount: Money = input.parse()?;
        if !amount.is_positive() {
            return Err(MoneyError::NotPositive);
        }
        Ok(amount)
    }

    /// `self * numerator / denominator`, rounded half away from zero.
    pub fn prorate(self, numerator: u32, denominator: u32) -> Money {
        if denominator == 0 {
            return Money::ZERO;
        }
        let scaled = i128::from(self.0) * i128::from(numerator) * 2;
        let denom = i128::from(denominator) * 2;
        let rounded = if scaled >= 0 {
            (scaled + i128::from(denominator)) / denom
        } else {
            (scaled - i128::from(denominator)) / denom
        };
        Money(rounded as i64)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = AMOUNT_RE
            .captures(trimmed)
            .ok_or_else(|| MoneyError::Invalid(trimmed.to_string()))?;

        let whole: i64 = caps[1]
            .parse()
            .map_err(|_| MoneyError::Invalid(trimmed.to_string()))?;
        let fraction = match caps.get(2) {
            Some(m) if m.as_str().len() == 1 => m.as_str().parse::<i64>().unwrap_or(0) * 10,
            Some(m) => m.as_str().parse::<i64>().unwrap_or(0),
            None => 0,
        };
        Ok(Money(whole * 100 + fraction))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Money)
    }
}
