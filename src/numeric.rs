//! Numeric conversion rules.
//!
//! Float → integer narrowing rounds half away from zero and fails with an
//! overflow instead of truncating. Text is parsed strictly: the whole value
//! (after trimming surrounding whitespace) must match the literal grammar.
//!
//! ```text
//! integer  := sign? digit+
//! float    := sign? (digit+ ('.' digit*)? | '.' digit+) (('e'|'E') sign? digit+)?
//! ```

use nom::{
    branch::alt,
    character::complete::{char, digit0, digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};
use std::num::{IntErrorKind, ParseIntError};
use std::str::FromStr;
use tracing::warn;

use crate::error::{FetchError, FetchResult};

/// Integer target types.
pub trait Integral: Copy + TryFrom<i128> + FromStr<Err = ParseIntError> {
    const NAME: &'static str;
    const MIN: i128;
    const MAX: i128;
}

macro_rules! integral {
    ($($t:ty => $name:literal),* $(,)?) => {
        $(
            impl Integral for $t {
                const NAME: &'static str = $name;
                const MIN: i128 = <$t>::MIN as i128;
                const MAX: i128 = <$t>::MAX as i128;
            }
        )*
    };
}

integral! {
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
}

/// Round half away from zero.
pub fn round_half_away(value: f64) -> f64 {
    if value >= 0.0 {
        (value + 0.5).floor()
    } else {
        (value - 0.5).ceil()
    }
}

/// Narrow an exact integer to `T`.
pub fn narrow<T: Integral>(value: i128) -> FetchResult<T> {
    T::try_from(value)
        .map_err(|_| FetchError::overflow(format!("{} does not fit in {}", value, T::NAME)))
}

/// Narrow a float to integer `T`, rounding half away from zero.
pub fn float_to_integer<T: Integral>(value: f64) -> FetchResult<T> {
    // Half-unit margin so values that round onto the boundary are accepted.
    let max = T::MAX as f64 + 0.5;
    let min = T::MIN as f64 - 0.5;
    if value.is_nan() || value > max || value < min {
        warn!("overflow when trying to read {} from float {}", T::NAME, value);
        return Err(FetchError::overflow(format!(
            "float {} does not fit in {}",
            value,
            T::NAME
        )));
    }
    narrow(round_half_away(value) as i128)
}

/// Narrow a double to single precision.
pub fn float_to_f32(value: f64) -> FetchResult<f32> {
    if value.is_finite() && value.abs() > f32::MAX as f64 {
        return Err(FetchError::overflow(format!("float {} does not fit in f32", value)));
    }
    Ok(value as f32)
}

/// Significant digits when rendering a float as text.
pub const FLOAT_TEXT_DIGITS: usize = 24;

/// Render a float with [`FLOAT_TEXT_DIGITS`] significant digits.
///
/// Fixed notation when the decimal exponent is in `-4..24`, scientific
/// (`1.5e+30`) otherwise. Trailing zeros are dropped.
pub fn float_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let sci = format!("{:.*e}", FLOAT_TEXT_DIGITS - 1, value);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let digits = digits.trim_end_matches('0');
    if digits.is_empty() {
        return format!("{}0", sign);
    }

    if (-4..FLOAT_TEXT_DIGITS as i32).contains(&exp) {
        if exp < 0 {
            let zeros = "0".repeat((-exp - 1) as usize);
            return format!("{}0.{}{}", sign, zeros, digits);
        }
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            format!("{}{}{}", sign, digits, "0".repeat(int_len - digits.len()))
        } else {
            let (int, frac) = digits.split_at(int_len);
            format!("{}{}.{}", sign, int, frac)
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let point = if rest.is_empty() { "" } else { "." };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!(
            "{}{}{}{}e{}{:02}",
            sign,
            first,
            point,
            rest,
            exp_sign,
            exp.unsigned_abs()
        )
    }
}

fn sign(input: &str) -> IResult<&str, char> {
    one_of("+-")(input)
}

fn integer_literal(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(sign), digit1))(input)
}

/// Floating/decimal literal.
pub(crate) fn float_literal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(sign),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(preceded(one_of("eE"), pair(opt(sign), digit1))),
    )))(input)
}

/// Check `text` fully matches `grammar` and return the trimmed literal.
fn literal<'a>(
    text: &'a str,
    grammar: fn(&'a str) -> IResult<&'a str, &'a str>,
) -> Option<&'a str> {
    let text = text.trim();
    all_consuming(grammar)(text).ok().map(|(_, lit)| lit)
}

/// Parse text as integer `T`.
pub fn parse_integer<T: Integral>(text: &str) -> FetchResult<T> {
    let lit = literal(text, integer_literal).ok_or_else(|| cannot_convert(text, T::NAME))?;
    lit.parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            FetchError::overflow(format!("\"{}\" does not fit in {}", lit, T::NAME))
        }
        _ => cannot_convert(text, T::NAME),
    })
}

/// Parse text as a double.
///
/// A decimal comma is accepted in place of the decimal point.
pub fn parse_float(text: &str, type_name: &str) -> FetchResult<f64> {
    let normalized = text.replace(',', ".");
    let lit = literal(&normalized, float_literal).ok_or_else(|| cannot_convert(text, type_name))?;
    lit.parse::<f64>()
        .map_err(|_| cannot_convert(text, type_name))
}

pub(crate) fn cannot_convert(text: &str, type_name: &str) -> FetchError {
    FetchError::type_error(format!("can't convert \"{}\" to {}", text, type_name))
}
