use std::{
    fmt,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, EngineError, ResultEngine};

/// Signed money amount backed by an exact decimal.
///
/// Use this type for **all** monetary values in the engine (balances and
/// transaction amounts). It never goes through binary floating point, and it
/// is persisted as a decimal string.
///
/// The value is signed:
/// - positive = increase
/// - negative = decrease
///
/// Transaction amounts are always positive magnitudes; the sign only shows up
/// in balances and balance deltas.
///
/// # Examples
///
/// ```rust
/// use engine::Money;
///
/// let amount: Money = "10,5".parse().unwrap();
/// assert_eq!(amount.to_string(), "10.5");
/// assert!("12,3.4".parse::<Money>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Returns the underlying decimal.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Validates a transaction amount: strictly positive and no more fraction
    /// digits than `currency` allows.
    pub fn ensure_transaction_amount(self, currency: Currency) -> ResultEngine<Self> {
        if !self.is_positive() {
            return Err(EngineError::InvalidAmount(
                "amount must be > 0".to_string(),
            ));
        }
        self.ensure_scale(currency)
    }

    /// Rejects amounts with more fraction digits than `currency` allows.
    pub fn ensure_scale(self, currency: Currency) -> ResultEngine<Self> {
        if self.0.normalize().scale() > currency.minor_units() {
            return Err(EngineError::InvalidAmount(format!(
                "{currency} amounts allow at most {} decimals",
                currency.minor_units()
            )));
        }
        Ok(self)
    }

    /// Parses a value read back from storage.
    pub(crate) fn from_storage(value: &str) -> ResultEngine<Self> {
        Decimal::from_str(value)
            .map(Money)
            .map_err(|_| EngineError::InvalidAmount(format!("invalid stored amount: {value}")))
    }

    /// Canonical decimal string written to storage.
    pub(crate) fn to_storage(self) -> String {
        self.0.normalize().to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
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

    fn sub(self, rhs: Money) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl FromStr for Money {
    type Err = EngineError;

    /// Parses a decimal string.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    /// Exponents, thousands separators and empty input are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidAmount(format!("invalid amount: {}", s.trim()));

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidAmount("empty amount".to_string()));
        }

        let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (true, stripped.trim())
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (false, stripped.trim())
        } else {
            (false, trimmed)
        };

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let units = parts.next().ok_or_else(invalid)?;
        let fraction = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }
        if units.is_empty() || !units.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if let Some(fraction) = fraction
            && !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let value = Decimal::from_str(&rest).map_err(|_| invalid())?;
        Ok(Money(if negative { -value } else { value }))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<Money>().unwrap().amount(), dec!(10));
        assert_eq!("10.5".parse::<Money>().unwrap().amount(), dec!(10.5));
        assert_eq!("10,50".parse::<Money>().unwrap().amount(), dec!(10.50));
        assert_eq!("-0.01".parse::<Money>().unwrap().amount(), dec!(-0.01));
        assert_eq!("+1.00".parse::<Money>().unwrap().amount(), dec!(1));
        assert_eq!("  2.30 ".parse::<Money>().unwrap().amount(), dec!(2.3));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!("1e3".parse::<Money>().is_err());
        assert!("1.000,50".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".5".parse::<Money>().is_err());
    }

    #[test]
    fn transaction_amount_must_be_positive_and_fit_the_currency() {
        assert!(Money::new(dec!(0)).ensure_transaction_amount(Currency::Ars).is_err());
        assert!(Money::new(dec!(-1)).ensure_transaction_amount(Currency::Ars).is_err());
        assert!(Money::new(dec!(10.5)).ensure_transaction_amount(Currency::Clp).is_err());
        assert!(Money::new(dec!(10.123)).ensure_transaction_amount(Currency::Usd).is_err());
        assert!(Money::new(dec!(10.50)).ensure_transaction_amount(Currency::Usd).is_ok());
        // Trailing zeros do not count as precision.
        assert!(Money::new(dec!(500.00)).ensure_transaction_amount(Currency::Clp).is_ok());
    }

    #[test]
    fn storage_round_trip_is_exact() {
        let value = Money::new(dec!(0.1)) + Money::new(dec!(0.2));
        assert_eq!(value.to_storage(), "0.3");
        assert_eq!(Money::from_storage("0.3").unwrap(), value);
    }
}
