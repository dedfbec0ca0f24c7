//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Currencies supported by the payment core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    IDR,
    USD,
    EUR,
    GBP,
    INR,
}

impl Currency {
    /// Returns the number of decimal places for this currency.
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::IDR | Currency::USD | Currency::EUR | Currency::GBP | Currency::INR => 2,
        }
    }

    /// Returns the currency symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::IDR => "Rp",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::INR => "₹",
        }
    }

    fn minor_per_major(&self) -> i64 {
        10_i64.pow(self.decimal_places() as u32)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDR" => Ok(Currency::IDR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "INR" => Ok(Currency::INR),
            other => Err(DomainError::ValidationError(format!(
                "Unsupported currency: {other}"
            ))),
        }
    }
}

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (cents, sen, etc.)
/// so totals never drift the way binary floating point does. A `Money` value
/// is never negative: every constructor, including deserialization, rejects
/// negative amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMoney")]
pub struct Money {
    amount: i64,
    currency: Currency,
}

#[derive(Deserialize)]
struct RawMoney {
    amount: i64,
    currency: Currency,
}

impl TryFrom<RawMoney> for Money {
    type Error = DomainError;

    fn try_from(raw: RawMoney) -> Result<Self, Self::Error> {
        Money::new(raw.amount, raw.currency)
    }
}

impl Money {
    /// Creates a new Money value from an amount in minor units.
    pub fn new(amount: i64, currency: Currency) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::InvalidAmount(format!(
                "amount cannot be negative: {amount}"
            )));
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Parses a decimal string such as `"102.50"` into minor units.
    ///
    /// At most `decimal_places` fractional digits are accepted; fewer are
    /// padded (`"2.5"` is 250 minor units for a two-place currency).
    pub fn parse(value: &str, currency: Currency) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidAmount(format!("malformed amount: {value:?}"));
        let value = value.trim();
        if value.starts_with('-') {
            return Err(DomainError::InvalidAmount(format!(
                "amount cannot be negative: {value}"
            )));
        }

        let (major, minor) = value.split_once('.').unwrap_or((value, ""));
        let places = currency.decimal_places() as usize;
        if major.is_empty()
            || minor.len() > places
            || !major.bytes().all(|b| b.is_ascii_digit())
            || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let major: i64 = major.parse().map_err(|_| invalid())?;
        let minor: i64 = if minor.is_empty() {
            0
        } else {
            let padded = format!("{minor:0<places$}");
            padded.parse().map_err(|_| invalid())?
        };

        major
            .checked_mul(currency.minor_per_major())
            .and_then(|m| m.checked_add(minor))
            .ok_or_else(invalid)
            .and_then(|amount| Money::new(amount, currency))
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(())
    }

    /// Checked addition - fails on currency mismatch or overflow.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(&other)?;
        let amount = self.amount.checked_add(other.amount).ok_or_else(|| {
            DomainError::InvalidAmount(format!("{} + {} overflows", self, other))
        })?;
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }

    /// Subtraction floored at zero.
    pub fn saturating_sub(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(&other)?;
        Ok(Money {
            amount: (self.amount - other.amount).max(0),
            currency: self.currency,
        })
    }

    /// Applies a rate expressed in basis points, rounding any fractional
    /// minor unit up.
    pub fn basis_points_ceil(&self, basis_points: u32) -> Result<Money, DomainError> {
        let scaled = i128::from(self.amount) * i128::from(basis_points);
        let amount = (scaled + 9_999) / 10_000;
        let amount = i64::try_from(amount).map_err(|_| {
            DomainError::InvalidAmount(format!("{} at {basis_points}bp overflows", self))
        })?;
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }

    /// Returns true if this Money is greater than or equal to the other.
    pub fn gte(&self, other: &Money) -> Result<bool, DomainError> {
        self.ensure_same_currency(other)?;
        Ok(self.amount >= other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_major = self.currency.minor_per_major();
        let major = self.amount / per_major;
        let minor = self.amount % per_major;
        write!(
            f,
            "{}{}.{:0width$}",
            self.currency.symbol(),
            major,
            minor,
            width = self.currency.decimal_places() as usize
        )
    }
}
