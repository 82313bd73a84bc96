//! Fixed-point decimal
//!
//! A decimal is a signed unscaled integer with an implied scale of 12
//! fractional digits. At most 26 integer digits are allowed, so every value
//! fits in 38 significant digits and an `i128`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NvlogError, Result};

/// Number of fractional digits
pub const MAX_SCALE: usize = 12;

/// Maximum number of digits left of the decimal point
pub const MAX_INTEGER_DIGITS: usize = 26;

/// 10^MAX_SCALE
pub const SCALE_FACTOR: i128 = 1_000_000_000_000;

/// Largest representable unscaled magnitude: 38 nines
pub const MAX_UNSCALED: u128 = 99_999_999_999_999_999_999_999_999_999_999_999_999;

/// Fixed-point decimal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Decimal {
    unscaled: i128,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal { unscaled: 0 };

    /// Build from an unscaled integer (value × 10^12)
    pub fn from_unscaled(unscaled: i128) -> Result<Self> {
        if unscaled.unsigned_abs() > MAX_UNSCALED {
            return Err(NvlogError::DecimalOverflow(format!(
                "unscaled value {} exceeds 38 digits",
                unscaled
            )));
        }
        Ok(Self { unscaled })
    }

    /// Build from sign and unscaled magnitude (the wire representation)
    pub fn from_parts(negative: bool, magnitude: u128) -> Result<Self> {
        if magnitude > MAX_UNSCALED {
            return Err(NvlogError::DecimalOverflow(format!(
                "unscaled magnitude {} exceeds 38 digits",
                magnitude
            )));
        }
        let unscaled = magnitude as i128;
        Ok(Self {
            unscaled: if negative { -unscaled } else { unscaled },
        })
    }

    /// Build from a whole number
    pub fn from_integer(whole: i64) -> Self {
        Self {
            unscaled: whole as i128 * SCALE_FACTOR,
        }
    }

    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    pub fn is_negative(&self) -> bool {
        self.unscaled < 0
    }

    pub fn magnitude(&self) -> u128 {
        self.unscaled.unsigned_abs()
    }
}

impl FromStr for Decimal {
    type Err = NvlogError;

    /// Parse `[-]digits[.digits]`
    fn from_str(txt: &str) -> Result<Self> {
        if txt.is_empty() {
            return Err(NvlogError::InvalidValue("empty decimal string".to_string()));
        }

        let (negative, body) = match txt.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, txt),
        };

        if body.chars().any(|c| !c.is_ascii_digit() && c != '.') {
            return Err(NvlogError::InvalidValue(format!(
                "invalid characters in decimal string: {}",
                txt
            )));
        }

        let (whole, fractional) = match body.split_once('.') {
            Some((whole, fractional)) => {
                if fractional.contains('.') {
                    return Err(NvlogError::InvalidValue(format!(
                        "too many decimal points: {}",
                        txt
                    )));
                }
                (whole, fractional)
            }
            None => (body, ""),
        };

        if whole.is_empty() && fractional.is_empty() {
            return Err(NvlogError::InvalidValue(format!("no digits in decimal string: {}", txt)));
        }

        let whole = whole.trim_start_matches('0');
        if whole.len() > MAX_INTEGER_DIGITS {
            return Err(NvlogError::DecimalOverflow(format!(
                "maximum precision exceeded: at most {} digits left of the decimal point",
                MAX_INTEGER_DIGITS
            )));
        }
        if fractional.len() > MAX_SCALE {
            return Err(NvlogError::DecimalOverflow(format!(
                "maximum scale exceeded: at most {} digits right of the decimal point",
                MAX_SCALE
            )));
        }

        // Both parts are bounded above, so the arithmetic cannot overflow u128
        let whole_value: u128 = if whole.is_empty() { 0 } else { parse_digits(whole)? };
        let mut fractional_value: u128 = if fractional.is_empty() { 0 } else { parse_digits(fractional)? };
        for _ in fractional.len()..MAX_SCALE {
            fractional_value *= 10;
        }

        Decimal::from_parts(negative, whole_value * SCALE_FACTOR as u128 + fractional_value)
    }
}

fn parse_digits(digits: &str) -> Result<u128> {
    digits
        .parse::<u128>()
        .map_err(|e| NvlogError::InvalidValue(format!("bad decimal digits {}: {}", digits, e)))
}

impl fmt::Display for Decimal {
    /// Sign, whole part, radix point, 12 zero-padded fractional digits
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.magnitude();
        let scale = SCALE_FACTOR as u128;
        if self.is_negative() {
            write!(f, "-")?;
        }
        write!(f, "{}.{:0width$}", magnitude / scale, magnitude % scale, width = MAX_SCALE)
    }
}
