use serde::{Deserialize, Serialize};

use crate::EngineError;

/// ISO 4217 currency of a transaction or an instrument.
///
/// The set is closed: codes outside this list are rejected at the boundary
/// instead of being persisted as free-form text.
///
/// ## Minor units
///
/// `minor_units()` is the maximum number of fraction digits an amount in this
/// currency may carry. `CLP` has none, so `10.5 CLP` is rejected while
/// `10.50 ARS` is fine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Ars,
    Usd,
    Eur,
    Brl,
    Clp,
    Uyu,
}

impl Currency {
    /// Canonical currency code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Ars => "ARS",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Brl => "BRL",
            Currency::Clp => "CLP",
            Currency::Uyu => "UYU",
        }
    }

    /// Number of fraction digits allowed for amounts in this currency.
    #[must_use]
    pub const fn minor_units(self) -> u32 {
        match self {
            Currency::Clp => 0,
            _ => 2,
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ARS" => Ok(Currency::Ars),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "BRL" => Ok(Currency::Brl),
            "CLP" => Ok(Currency::Clp),
            "UYU" => Ok(Currency::Uyu),
            other => Err(EngineError::InvalidInput(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!(Currency::try_from("ars").unwrap(), Currency::Ars);
        assert_eq!(Currency::try_from(" USD ").unwrap(), Currency::Usd);
        assert!(Currency::try_from("XYZ").is_err());
    }
}
