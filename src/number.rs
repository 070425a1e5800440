//! Fixed-point decimal values and their engine encoding.
//!
//! The engine stores decimals in a fixed 22-byte element:
//!
//! ```text
//! [len] [exp] [d1] [d2] ... [dn] [102?]
//!   │     │    └── base-100 digits (d+1 when positive, 101-d when negative)
//!   │     └── sign bit + excess-65 base-100 exponent
//!   └── number of bytes that follow
//! ```
//!
//! A negative value with fewer than 20 digits carries a `102` terminator.
//! Zero is `[1, 0x80]`. An all-zero element decodes as zero so that slots
//! which were never fetched read as a well-defined value.

use std::fmt;
use std::str::FromStr;

use crate::error::{FetchError, FetchResult};
use crate::numeric::float_literal;

/// Size of one encoded decimal element.
pub const NUMBER_SIZE: usize = 22;

/// Most significant digits a [`Decimal`] holds.
pub const MAX_DIGITS: usize = 38;

const MAX_PAIRS: usize = 20;

// Decimal exponent range of the leading digit that fits the element.
const MIN_ADJUSTED: i64 = -130;
const MAX_ADJUSTED: i64 = 125;
const ZERO_EXP: u8 = 0x80;
const NEG_TERMINATOR: u8 = 102;

/// Exact decimal value: `mantissa * 10^exponent`.
///
/// Always normalized, so equal values compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    exponent: i32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        exponent: 0,
    };

    pub fn new(mut mantissa: i128, mut exponent: i32) -> Self {
        if mantissa == 0 {
            return Self::ZERO;
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }
        Self { mantissa, exponent }
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    /// Shortest exact decimal for a finite float.
    pub fn from_f64(value: f64) -> FetchResult<Self> {
        if !value.is_finite() {
            return Err(FetchError::type_error(format!(
                "{} has no decimal representation",
                value
            )));
        }
        format!("{:e}", value).parse()
    }

    pub fn to_f64(&self) -> f64 {
        format!("{}e{}", self.mantissa, self.exponent)
            .parse()
            .unwrap_or(f64::NAN)
    }

    /// Round half away from zero to an integer.
    ///
    /// Returns `None` when the result exceeds `i128`.
    pub fn round_half_away(&self) -> Option<i128> {
        if self.exponent >= 0 {
            let scale = 10i128.checked_pow(self.exponent as u32)?;
            return self.mantissa.checked_mul(scale);
        }
        let shift = self.exponent.unsigned_abs();
        if shift as usize > MAX_DIGITS {
            // |value| < 0.5
            return Some(0);
        }
        let divisor = 10i128.pow(shift);
        let quotient = self.mantissa / divisor;
        let remainder = (self.mantissa % divisor).abs();
        if remainder >= divisor - remainder {
            Some(quotient + self.mantissa.signum())
        } else {
            Some(quotient)
        }
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal::new(v as i128, 0)
    }
}

impl From<u64> for Decimal {
    fn from(v: u64) -> Self {
        Decimal::new(v as i128, 0)
    }
}

impl FromStr for Decimal {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || FetchError::type_error(format!("can't convert \"{}\" to decimal", s));
        match float_literal(text) {
            Ok(("", _)) => {}
            _ => return Err(invalid()),
        }

        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (number, exp) = match body.find(['e', 'E']) {
            Some(idx) => (&body[..idx], &body[idx + 1..]),
            None => (body, "0"),
        };
        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        let exp: i64 = exp
            .parse()
            .map_err(|_| FetchError::overflow(format!("exponent of \"{}\" out of range", s)))?;

        let digits: String = int_part.chars().chain(frac_part.chars()).collect();
        let digits = digits.trim_start_matches('0');
        let trimmed = digits.trim_end_matches('0');
        if trimmed.is_empty() {
            return Ok(Decimal::ZERO);
        }
        if trimmed.len() > MAX_DIGITS {
            return Err(FetchError::overflow(format!(
                "\"{}\" has more than {} significant digits",
                s, MAX_DIGITS
            )));
        }

        let exponent = exp - frac_part.len() as i64 + (digits.len() - trimmed.len()) as i64;
        let adjusted = exponent + trimmed.len() as i64 - 1;
        if !(MIN_ADJUSTED..=MAX_ADJUSTED).contains(&adjusted) {
            return Err(FetchError::overflow(format!(
                "\"{}\" is out of the decimal range",
                s
            )));
        }
        let exponent = i32::try_from(exponent)
            .map_err(|_| FetchError::overflow(format!("exponent of \"{}\" out of range", s)))?;
        let mantissa: i128 = trimmed.parse().map_err(|_| invalid())?;
        Ok(Decimal::new(
            if negative { -mantissa } else { mantissa },
            exponent,
        ))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mantissa < 0 {
            f.write_str("-")?;
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        if self.exponent >= 0 {
            f.write_str(&digits)?;
            for _ in 0..self.exponent {
                f.write_str("0")?;
            }
            return Ok(());
        }
        let shift = self.exponent.unsigned_abs() as usize;
        if digits.len() > shift {
            let (int, frac) = digits.split_at(digits.len() - shift);
            write!(f, "{}.{}", int, frac)
        } else {
            write!(f, "0.{}{}", "0".repeat(shift - digits.len()), digits)
        }
    }
}

/// Encode a decimal into the engine's element format.
pub fn encode(value: &Decimal) -> FetchResult<[u8; NUMBER_SIZE]> {
    let mut out = [0u8; NUMBER_SIZE];
    if value.is_zero() {
        out[0] = 1;
        out[1] = ZERO_EXP;
        return Ok(out);
    }

    // value = 0.<digits> * 10^point
    let mut digits = value.mantissa.unsigned_abs().to_string();
    let mut point = digits.len() as i64 + value.exponent as i64;
    if point.rem_euclid(2) == 1 {
        digits.insert(0, '0');
        point += 1;
    }
    if digits.len() % 2 == 1 {
        digits.push('0');
    }
    let pairs: Vec<u8> = digits
        .as_bytes()
        .chunks(2)
        .map(|p| (p[0] - b'0') * 10 + (p[1] - b'0'))
        .collect();

    let exp = point / 2 - 1;
    if !(-65..=62).contains(&exp) || pairs.len() > MAX_PAIRS {
        return Err(FetchError::overflow(format!(
            "{} is out of the decimal range",
            value
        )));
    }

    let mut len = 1;
    if value.is_negative() {
        out[1] = (62 - exp) as u8;
        for (i, d) in pairs.iter().enumerate() {
            out[2 + i] = 101 - d;
        }
        len += pairs.len();
        if pairs.len() < MAX_PAIRS {
            out[2 + pairs.len()] = NEG_TERMINATOR;
            len += 1;
        }
    } else {
        out[1] = (193 + exp) as u8;
        for (i, d) in pairs.iter().enumerate() {
            out[2 + i] = d + 1;
        }
        len += pairs.len();
    }
    out[0] = len as u8;
    Ok(out)
}

/// Decode one element of the engine's decimal format.
pub fn decode(bytes: &[u8]) -> FetchResult<Decimal> {
    let malformed = || FetchError::type_error("malformed decimal element");
    let len = *bytes.first().ok_or_else(malformed)? as usize;
    if len == 0 {
        return Ok(Decimal::ZERO);
    }
    if len > NUMBER_SIZE - 1 || len >= bytes.len() {
        return Err(malformed());
    }
    let exp = bytes[1];
    let body = &bytes[2..1 + len];
    if body.is_empty() {
        return match exp {
            ZERO_EXP => Ok(Decimal::ZERO),
            0 => Err(FetchError::overflow("negative infinity")),
            _ => Err(malformed()),
        };
    }

    let positive = exp & 0x80 != 0;
    let weight: i64 = if positive {
        exp as i64 - 193
    } else {
        62 - exp as i64
    };

    let mut digits: Vec<u8> = Vec::with_capacity(2 * MAX_PAIRS);
    for &b in body {
        let digit = if positive {
            if !(1..=100).contains(&b) {
                return match (exp, b) {
                    (255, 101) => Err(FetchError::overflow("positive infinity")),
                    _ => Err(malformed()),
                };
            }
            b - 1
        } else {
            if b == NEG_TERMINATOR {
                break;
            }
            if !(1..=101).contains(&b) {
                return Err(malformed());
            }
            101 - b
        };
        digits.push(digit / 10);
        digits.push(digit % 10);
    }

    let pairs = (digits.len() / 2) as i64;
    let (mantissa, dropped) = fold_digits(&digits);
    let exponent = 2 * (weight - pairs + 1) + dropped;
    Ok(Decimal::new(
        if positive { mantissa } else { -mantissa },
        exponent as i32,
    ))
}

/// Fold decimal digits into a mantissa of at most [`MAX_DIGITS`] digits,
/// rounding the rest half away from zero. Returns the mantissa magnitude and
/// the number of digits dropped.
fn fold_digits(digits: &[u8]) -> (i128, i64) {
    let start = digits.iter().position(|&d| d != 0).unwrap_or(digits.len());
    let significant = &digits[start..];
    let kept = significant.len().min(MAX_DIGITS);
    let mut mantissa = significant[..kept]
        .iter()
        .fold(0i128, |m, &d| m * 10 + d as i128);
    if significant.get(kept).is_some_and(|&d| d >= 5) {
        mantissa += 1;
    }
    (mantissa, (significant.len() - kept) as i64)
}
