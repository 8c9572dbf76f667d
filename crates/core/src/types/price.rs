//! Product prices using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors raised when a price fails validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Price was zero or negative where a positive price is required.
    #[error("price must be greater than zero")]
    NotPositive,
    /// Price has more than two fractional digits.
    #[error("price cannot have more than two decimal places")]
    TooPrecise,
    /// Price, or a total built from prices, exceeds [`Price::MAX`].
    #[error("price cannot exceed 1000000000")]
    TooLarge,
}

/// A catalog price in the store currency.
///
/// Stored in documents as a decimal string so that no precision is lost on
/// the way through JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// The zero price (used for empty totals).
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount a catalog price or order total may reach.
    pub const MAX: Self = Self(Decimal::from_parts(1_000_000_000, 0, 0, false, 0));

    /// Validate a price that must be strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::NotPositive`] for zero or negative amounts and
    /// [`PriceError::TooPrecise`] for sub-cent amounts and
    /// [`PriceError::TooLarge`] above [`Price::MAX`].
    pub fn positive(amount: Decimal) -> Result<Self, PriceError> {
        if amount <= Decimal::ZERO {
            return Err(PriceError::NotPositive);
        }
        if amount > Self::MAX.0 {
            return Err(PriceError::TooLarge);
        }
        if amount.normalize().scale() > 2 {
            return Err(PriceError::TooPrecise);
        }
        Ok(Self(amount))
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiply by a quantity (line totals).
    ///
    /// # Errors
    ///
    /// [`PriceError::TooLarge`] when the product exceeds [`Price::MAX`].
    pub fn times(self, quantity: u32) -> Result<Self, PriceError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .filter(|p| *p <= Self::MAX)
            .ok_or(PriceError::TooLarge)
    }

    /// Add two amounts.
    ///
    /// # Errors
    ///
    /// [`PriceError::TooLarge`] when the sum exceeds [`Price::MAX`].
    pub fn plus(self, rhs: Self) -> Result<Self, PriceError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .filter(|p| *p <= Self::MAX)
            .ok_or(PriceError::TooLarge)
    }

    /// Sum a sequence of amounts, failing rather than exceeding
    /// [`Price::MAX`].
    ///
    /// # Errors
    ///
    /// [`PriceError::TooLarge`] on overflow.
    pub fn total<I>(amounts: I) -> Result<Self, PriceError>
    where
        I: IntoIterator<Item = Result<Self, PriceError>>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, p| acc.plus(p?))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.0, CurrencyCode::default().code())
    }
}

/// ISO 4217 currency codes the store can price in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    /// Egyptian pound, the store's trading currency.
    #[default]
    EGP,
    USD,
}

impl CurrencyCode {
    /// Three-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::EGP => "EGP",
            Self::USD => "USD",
        }
    }
}
