//! Fixed-point monetary amounts.
//!
//! All monetary values in the system are integers scaled by `10^18`. Every
//! arithmetic operation stays in the scaled integer domain; conversion to a
//! decimal string happens only at the display boundary. The raw representation
//! is `u128` because a 100-unit amount (`100 * 10^18`) already exceeds
//! `u64::MAX`.
//!
//! All arithmetic is checked and fails closed on overflow.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal places in the fixed-point representation.
pub const DECIMALS: u32 = 18;

/// Scaling factor for one whole unit (`10^18`).
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Divisor for basis-point ratios (1 bps = 1/100 of a percent).
pub const BPS_SCALE: u128 = 10_000;

/// Errors from amount arithmetic and decimal conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AmountError {
    /// A checked arithmetic operation overflowed.
    #[error("amount overflow in {operation}")]
    Overflow {
        /// The operation that overflowed.
        operation: &'static str,
    },

    /// A checked subtraction would have gone below zero.
    #[error("amount underflow in {operation}: {minuend} - {subtrahend}")]
    Underflow {
        /// The operation that underflowed.
        operation: &'static str,
        /// The left-hand side of the subtraction.
        minuend: u128,
        /// The right-hand side of the subtraction.
        subtrahend: u128,
    },

    /// A decimal string could not be parsed.
    #[error("malformed decimal amount {input:?}: {reason}")]
    Malformed {
        /// The rejected input.
        input: String,
        /// Why the input was rejected.
        reason: &'static str,
    },

    /// A decimal string carries more fractional digits than the scale holds.
    #[error("too many fractional digits in {input:?}: {digits} > {DECIMALS}")]
    TooPrecise {
        /// The rejected input.
        input: String,
        /// Number of fractional digits supplied.
        digits: usize,
    },
}

/// A monetary amount as a `10^18`-scaled unsigned integer.
///
/// Ordering, equality, and hashing follow the raw scaled value. The type is
/// deliberately free of unchecked `Add`/`Sub` operator impls: callers go
/// through the checked (or explicitly saturating) methods.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// The maximum representable amount.
    ///
    /// Used as the ledger's unlimited-allowance sentinel.
    pub const MAX: Self = Self(u128::MAX);

    /// Wraps an already-scaled raw value.
    #[must_use]
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Builds an amount from whole units (`units * 10^18`).
    ///
    /// Cannot overflow: `u64::MAX * 10^18` fits in `u128`.
    #[must_use]
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * UNIT)
    }

    /// Returns the raw scaled value.
    #[must_use]
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Returns `true` if the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns `AmountError::Overflow` if the sum exceeds `u128::MAX`.
    pub fn checked_add(self, rhs: Self) -> Result<Self, AmountError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(AmountError::Overflow { operation: "add" })
    }

    /// Checked subtraction.
    ///
    /// # Errors
    ///
    /// Returns `AmountError::Underflow` if `rhs > self`.
    pub fn checked_sub(self, rhs: Self) -> Result<Self, AmountError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(AmountError::Underflow {
                operation: "sub",
                minuend: self.0,
                subtrahend: rhs.0,
            })
    }

    /// Saturating addition (clamps at `Amount::MAX`).
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction (clamps at zero).
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Scales the amount by a basis-point ratio, flooring the result.
    ///
    /// `amount * bps / 10_000`, computed in `u128` with a checked multiply.
    ///
    /// # Errors
    ///
    /// Returns `AmountError::Overflow` if the intermediate product overflows.
    pub fn checked_scale_bps(self, bps: u32) -> Result<Self, AmountError> {
        self.0
            .checked_mul(u128::from(bps))
            .map(|product| Self(product / BPS_SCALE))
            .ok_or(AmountError::Overflow {
                operation: "scale_bps",
            })
    }

    /// Expresses `self` as a floored basis-point fraction of `whole`.
    ///
    /// Returns 0 when `whole` is zero.
    ///
    /// # Errors
    ///
    /// Returns `AmountError::Overflow` if the intermediate product overflows
    /// or the ratio does not fit in `u32`.
    pub fn ratio_bps_of(self, whole: Self) -> Result<u32, AmountError> {
        if whole.is_zero() {
            return Ok(0);
        }
        let product = self
            .0
            .checked_mul(BPS_SCALE)
            .ok_or(AmountError::Overflow {
                operation: "ratio_bps",
            })?;
        u32::try_from(product / whole.0).map_err(|_| AmountError::Overflow {
            operation: "ratio_bps",
        })
    }

    /// Parses a decimal string (`"1.5"`, `"0.000000000000000001"`) into a
    /// scaled amount.
    ///
    /// The integral part is required; the fractional part is optional but, if
    /// a decimal point is present, must be non-empty and carry at most 18
    /// digits.
    ///
    /// # Errors
    ///
    /// Returns `AmountError::Malformed` for empty, non-digit, or
    /// out-of-range input, and `AmountError::TooPrecise` for more than 18
    /// fractional digits.
    pub fn parse_decimal(input: &str) -> Result<Self, AmountError> {
        let malformed = |reason| AmountError::Malformed {
            input: input.to_string(),
            reason,
        };

        let (integral, fraction) = match input.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (input, None),
        };

        if integral.is_empty() {
            return Err(malformed("missing integer part"));
        }
        if !integral.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("integer part contains non-digit characters"));
        }
        let whole: u128 = integral
            .parse()
            .map_err(|_| malformed("integer part out of range"))?;
        let mut raw = whole
            .checked_mul(UNIT)
            .ok_or(AmountError::Overflow { operation: "parse" })?;

        if let Some(fraction) = fraction {
            if fraction.is_empty() {
                return Err(malformed("missing fractional digits after decimal point"));
            }
            if !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed("fractional part contains non-digit characters"));
            }
            let digits = fraction.len();
            if digits > DECIMALS as usize {
                return Err(AmountError::TooPrecise {
                    input: input.to_string(),
                    digits,
                });
            }
            // Fraction fits in u128: at most 18 digits.
            let frac: u128 = fraction
                .parse()
                .map_err(|_| malformed("fractional part out of range"))?;
            let scaled_frac = frac * 10u128.pow(DECIMALS - u32::try_from(digits).unwrap_or(0));
            raw = raw
                .checked_add(scaled_frac)
                .ok_or(AmountError::Overflow { operation: "parse" })?;
        }

        Ok(Self(raw))
    }

    /// Renders the amount as a trimmed decimal string.
    ///
    /// Whole amounts render without a decimal point; fractional amounts trim
    /// trailing zeros (`1.5`, not `1.500000000000000000`).
    #[must_use]
    pub fn format_decimal(self) -> String {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{frac:018}");
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}
