// Rust guideline compliant 2026-10-18

//! Loyalty points value type.
//!
//! [`Points`] wraps a [`Decimal`] so balances and rewards never pass through
//! binary floating point. Values are immutable: arithmetic returns a new value.
//! Arithmetic is checked and reports [`PointsError::Overflow`] instead of
//! panicking.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Errors raised while constructing [`Points`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointsError {
    /// Input was not a finite, representable number.
    #[error("invalid amount: {input:?} is not a finite number")]
    InvalidAmount {
        /// The rejected input, as text.
        input: String,
    },
    /// The result does not fit in the decimal range.
    #[error("points overflow: {lhs} {op} {rhs}")]
    Overflow {
        /// Left operand.
        lhs: Points,
        /// `+` or `-`.
        op: char,
        /// Right operand.
        rhs: Points,
    },
}

/// An exact, currency-like quantity of loyalty points.
///
/// Equality and ordering compare the decimal value exactly, so `Points(2.50)`
/// equals `Points(2.5)` and there is no epsilon tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Points(Decimal);

impl Points {
    /// Zero points.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap an already-validated decimal.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// The underlying decimal value.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Strictly greater than zero.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Strictly less than zero.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// `self + rhs`.
    ///
    /// # Errors
    ///
    /// Returns [`PointsError::Overflow`] when the sum is out of range.
    pub fn checked_add(self, rhs: Self) -> Result<Self, PointsError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(PointsError::Overflow { lhs: self, op: '+', rhs })
    }

    /// `self - rhs`.
    ///
    /// # Errors
    ///
    /// Returns [`PointsError::Overflow`] when the difference is out of range.
    pub fn checked_sub(self, rhs: Self) -> Result<Self, PointsError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(PointsError::Overflow { lhs: self, op: '-', rhs })
    }

    /// Sum of `values`, zero when empty.
    ///
    /// # Errors
    ///
    /// Returns [`PointsError::Overflow`] as soon as a partial sum is out of range.
    pub fn checked_sum<'a>(values: impl IntoIterator<Item = &'a Self>) -> Result<Self, PointsError> {
        values.into_iter().try_fold(Self::ZERO, |total, value| total.checked_add(*value))
    }

    /// Round toward negative infinity (`-2.5` becomes `-3`, not `-2`).
    #[must_use]
    pub fn to_integral(self) -> Self {
        Self(self.0.floor())
    }

    /// Numeric form used when the value crosses a JSON boundary.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }
}

impl From<Decimal> for Points {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<i64> for Points {
    fn from(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }
}

impl From<u32> for Points {
    fn from(amount: u32) -> Self {
        Self(Decimal::from(amount))
    }
}

impl TryFrom<f64> for Points {
    type Error = PointsError;

    /// # Errors
    ///
    /// Returns [`PointsError::InvalidAmount`] for NaN, infinities, and values
    /// outside the decimal range.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Decimal::try_from(value)
            .map(Self)
            .map_err(|_| PointsError::InvalidAmount { input: value.to_string() })
    }
}

impl FromStr for Points {
    type Err = PointsError;

    /// Parse plain (`"12.5"`) or scientific (`"1e3"`) notation.
    ///
    /// # Errors
    ///
    /// Returns [`PointsError::InvalidAmount`] when the text is not a number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map(Self)
            .map_err(|_| PointsError::InvalidAmount { input: s.to_owned() })
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

/// Accepts either a number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parsed = match RawAmount::deserialize(deserializer)? {
            RawAmount::Integer(n) => Ok(Self::from(n)),
            RawAmount::Float(x) => Self::try_from(x),
            RawAmount::Text(s) => s.parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}
