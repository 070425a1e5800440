//! Typed value extraction.
//!
//! Every getter follows the same order: NULL check, then the compatibility
//! matrix ([`accepts`]), then the conversion for the column's representation
//! kind. A rejected conversion never touches the buffer.
//!
//! | Kind | bool / integers / floats / decimal | char | text | blob | date / time / datetime |
//! |---|---|---|---|---|---|
//! | temporal | - | - | ISO-8601 | - | handle decoder |
//! | signed, unsigned, float, decimal | convert | - | decimal rendering | - | - |
//! | lob | - | - | - | full payload | - |
//! | text | parse | first char | bytes | - | - |
//! | raw | parse | first char | bytes | bytes | - |

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tracing::trace;

use crate::column::{BoundColumn, Stored};
use crate::error::{FetchError, FetchResult};
use crate::number::Decimal;
use crate::numeric::{
    cannot_convert, float_text, float_to_f32, float_to_integer, narrow, parse_float, parse_integer,
    Integral,
};
use crate::repr::Repr;

/// Requested target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Bool,
    I16,
    I32,
    I64,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    Text,
    Blob,
    Date,
    Time,
    Datetime,
}

impl Target {
    pub const ALL: [Target; 16] = [
        Target::Bool,
        Target::I16,
        Target::I32,
        Target::I64,
        Target::U16,
        Target::U32,
        Target::U64,
        Target::F32,
        Target::F64,
        Target::Decimal,
        Target::Char,
        Target::Text,
        Target::Blob,
        Target::Date,
        Target::Time,
        Target::Datetime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Target::Bool => "bool",
            Target::I16 => "i16",
            Target::I32 => "i32",
            Target::I64 => "i64",
            Target::U16 => "u16",
            Target::U32 => "u32",
            Target::U64 => "u64",
            Target::F32 => "f32",
            Target::F64 => "f64",
            Target::Decimal => "decimal",
            Target::Char => "char",
            Target::Text => "string",
            Target::Blob => "blob",
            Target::Date => "date",
            Target::Time => "time",
            Target::Datetime => "datetime",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            Target::Bool
                | Target::I16
                | Target::I32
                | Target::I64
                | Target::U16
                | Target::U32
                | Target::U64
                | Target::F32
                | Target::F64
                | Target::Decimal
        )
    }

    fn is_temporal(self) -> bool {
        matches!(self, Target::Date | Target::Time | Target::Datetime)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a column of kind `repr` can produce `target`.
pub fn accepts(repr: Repr, target: Target) -> bool {
    match repr {
        Repr::Temporal => target == Target::Text || target.is_temporal(),
        Repr::Signed | Repr::Unsigned | Repr::Float | Repr::Decimal => {
            target.is_numeric() || target == Target::Text
        }
        Repr::Lob => target == Target::Blob,
        Repr::Text => !target.is_temporal() && target != Target::Blob,
        // Binary columns answer blob requests with their inline bytes.
        Repr::Raw => !target.is_temporal(),
    }
}

/// A type that can be read from a bound column.
pub trait FromColumn: Sized {
    const TARGET: Target;

    /// Convert a non-NULL stored value. `column` gives access to the
    /// out-of-line handles.
    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self>;
}

fn mismatch(column: &BoundColumn, target: Target) -> FetchError {
    FetchError::type_error(format!(
        "can't read {} column '{}' as {}",
        column.repr(),
        column.name(),
        target
    ))
}

fn text(bytes: &[u8], target: Target) -> FetchResult<&str> {
    std::str::from_utf8(bytes).map_err(|_| {
        FetchError::type_error(format!("column value is not valid UTF-8 for {}", target))
    })
}

impl BoundColumn {
    /// Read the value at `row` as `T`.
    ///
    /// Fails with [`FetchError::NullValue`] on NULL and with a type error
    /// when the column kind cannot produce `T`.
    ///
    /// # Panics
    /// If `row` is not below the batch capacity.
    pub fn get<T: FromColumn>(&self, row: usize) -> FetchResult<T> {
        if self.is_null(row) {
            return Err(FetchError::NullValue);
        }
        if !accepts(self.repr(), T::TARGET) {
            return Err(mismatch(self, T::TARGET));
        }
        trace!("get {} from '{}' row {}", T::TARGET, self.name(), row);
        T::from_stored(self.stored(row)?, self)
    }

    /// Like [`get`](Self::get), with NULL as `None`.
    pub fn get_opt<T: FromColumn>(&self, row: usize) -> FetchResult<Option<T>> {
        if self.is_null(row) {
            return Ok(None);
        }
        self.get(row).map(Some)
    }
}

macro_rules! named_getters {
    ($($name:ident => $t:ty),* $(,)?) => {
        impl BoundColumn {
            $(
                pub fn $name(&self, row: usize) -> FetchResult<$t> {
                    self.get::<$t>(row)
                }
            )*
        }
    };
}

named_getters! {
    get_bool => bool,
    get_i16 => i16,
    get_i32 => i32,
    get_i64 => i64,
    get_u16 => u16,
    get_u32 => u32,
    get_u64 => u64,
    get_f32 => f32,
    get_f64 => f64,
    get_decimal => Decimal,
    get_char => char,
    get_string => String,
    get_blob => Vec<u8>,
    get_date => NaiveDate,
    get_time => NaiveTime,
    get_datetime => NaiveDateTime,
}

impl FromColumn for bool {
    const TARGET: Target = Target::Bool;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Signed(v) => Ok(v != 0),
            Stored::Unsigned(v) => Ok(v != 0),
            Stored::Float(v) => Ok(v != 0.0),
            Stored::Decimal(d) => Ok(!d.is_zero()),
            Stored::Text(b) | Stored::Raw(b) => {
                Ok(matches!(b.first(), Some(b't' | b'T' | b'y' | b'Y' | b'1')))
            }
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

fn integer<T: Integral>(stored: Stored<'_>, column: &BoundColumn, target: Target) -> FetchResult<T> {
    match stored {
        Stored::Signed(v) => narrow(v as i128),
        Stored::Unsigned(v) => narrow(v as i128),
        Stored::Float(v) => float_to_integer(v),
        Stored::Decimal(d) => {
            let rounded = d.round_half_away().ok_or_else(|| {
                FetchError::overflow(format!("{} does not fit in {}", d, T::NAME))
            })?;
            narrow(rounded)
        }
        Stored::Text(b) | Stored::Raw(b) => parse_integer(text(b, target)?),
        _ => Err(mismatch(column, target)),
    }
}

macro_rules! from_column_integer {
    ($($t:ty => $target:ident),* $(,)?) => {
        $(
            impl FromColumn for $t {
                const TARGET: Target = Target::$target;

                fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
                    integer(stored, column, Self::TARGET)
                }
            }
        )*
    };
}

from_column_integer! {
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u16 => U16,
    u32 => U32,
    u64 => U64,
}

impl FromColumn for f64 {
    const TARGET: Target = Target::F64;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Signed(v) => Ok(v as f64),
            Stored::Unsigned(v) => Ok(v as f64),
            Stored::Float(v) => Ok(v),
            Stored::Decimal(d) => Ok(d.to_f64()),
            Stored::Text(b) | Stored::Raw(b) => parse_float(text(b, Self::TARGET)?, "f64"),
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

impl FromColumn for f32 {
    const TARGET: Target = Target::F32;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        let value = match stored {
            Stored::Text(b) | Stored::Raw(b) => parse_float(text(b, Self::TARGET)?, "f32")?,
            other => f64::from_stored(other, column)?,
        };
        float_to_f32(value)
    }
}

impl FromColumn for Decimal {
    const TARGET: Target = Target::Decimal;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Signed(v) => Ok(Decimal::from(v)),
            Stored::Unsigned(v) => Ok(Decimal::from(v)),
            Stored::Float(v) => Decimal::from_f64(v),
            Stored::Decimal(d) => Ok(d),
            Stored::Text(b) | Stored::Raw(b) => text(b, Self::TARGET)?.parse(),
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

impl FromColumn for char {
    const TARGET: Target = Target::Char;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Text(b) | Stored::Raw(b) => {
                let s = text(b, Self::TARGET)?;
                s.chars()
                    .next()
                    .ok_or_else(|| cannot_convert(s, Self::TARGET.name()))
            }
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

impl FromColumn for String {
    const TARGET: Target = Target::Text;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Signed(v) => Ok(v.to_string()),
            Stored::Unsigned(v) => Ok(v.to_string()),
            Stored::Float(v) => Ok(float_text(v)),
            Stored::Decimal(d) => Ok(d.to_string()),
            Stored::Text(b) | Stored::Raw(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            Stored::Temporal(d) => Ok(iso_datetime(&column.handles()?.read_datetime(d)?)),
            Stored::Lob(_) => Err(mismatch(column, Self::TARGET)),
        }
    }
}

impl FromColumn for Vec<u8> {
    const TARGET: Target = Target::Blob;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Lob(d) => column.handles()?.materialize_blob(d),
            Stored::Raw(b) => Ok(b.to_vec()),
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

impl FromColumn for NaiveDateTime {
    const TARGET: Target = Target::Datetime;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Temporal(d) => column.handles()?.read_datetime(d),
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

impl FromColumn for NaiveDate {
    const TARGET: Target = Target::Date;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Temporal(d) => Ok(column.handles()?.read_datetime(d)?.date()),
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

impl FromColumn for NaiveTime {
    const TARGET: Target = Target::Time;

    fn from_stored(stored: Stored<'_>, column: &BoundColumn) -> FetchResult<Self> {
        match stored {
            Stored::Temporal(d) => Ok(column.handles()?.read_datetime(d)?.time()),
            _ => Err(mismatch(column, Self::TARGET)),
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SS`, with milliseconds when nonzero.
pub fn iso_datetime(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() / 1_000_000 == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{Cell, MemoryCursor, MemoryEnv};
    use crate::engine::{ColumnMetadata, Cursor, Environment, TypeTag};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    /// Bind a single column holding `cells` and run one fetch.
    fn column_of(tag: TypeTag, width: usize, cells: Vec<Cell>) -> (MemoryEnv, BoundColumn) {
        let mem = MemoryEnv::new();
        let env: Rc<dyn Environment> = Rc::new(mem.clone());
        let batch = cells.len().max(1);
        let mut cursor = MemoryCursor::new(&mem, vec![ColumnMetadata::new("c", tag, width)])
            .with_rows(cells.into_iter().map(|c| vec![c]));
        let mut column = BoundColumn::bind(&mut cursor, &env, 0, batch).unwrap();
        let reply = cursor.fetch(batch, &mut [column.slot()]);
        assert!(!reply.status.is_failure());
        (mem, column)
    }

    fn datetime(s: &str) -> NaiveDateTime {
        crate::engine::memory::parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_null_checked_first() {
        for tag in [
            TypeTag::INT,
            TypeTag::UIN,
            TypeTag::FLT,
            TypeTag::NUM,
            TypeTag::VCS,
            TypeTag::BIN,
            TypeTag::BLOB,
            TypeTag::TIMESTAMP,
        ] {
            let (_mem, col) = column_of(tag, 10, vec![Cell::Null]);
            assert!(col.is_null(0));
            assert!(col.get_i32(0).unwrap_err().is_null_value(), "{tag}");
            assert!(col.get_string(0).unwrap_err().is_null_value(), "{tag}");
            assert!(col.get_blob(0).unwrap_err().is_null_value(), "{tag}");
            assert!(col.get_datetime(0).unwrap_err().is_null_value(), "{tag}");
            assert_eq!(col.get_opt::<String>(0).unwrap(), None);
        }
    }

    #[test]
    fn test_matrix_rejections_are_type_errors() {
        let samples = [
            (TypeTag::TIMESTAMP, Cell::Timestamp(datetime("2024-05-06 07:08:09"))),
            (TypeTag::INT, Cell::Int(1)),
            (TypeTag::UIN, Cell::Uint(1)),
            (TypeTag::FLT, Cell::Float(1.0)),
            (TypeTag::NUM, Cell::Number(Decimal::from(1i64))),
            (TypeTag::BLOB, Cell::Bytes(vec![1])),
            (TypeTag::VCS, Cell::from("1")),
            (TypeTag::BIN, Cell::from("1")),
        ];
        for (tag, cell) in samples {
            let (_mem, col) = column_of(tag, 8, vec![cell]);
            let repr = col.repr();
            let outcomes = [
                (Target::Bool, col.get_bool(0).err()),
                (Target::I16, col.get_i16(0).err()),
                (Target::I32, col.get_i32(0).err()),
                (Target::I64, col.get_i64(0).err()),
                (Target::U16, col.get_u16(0).err()),
                (Target::U32, col.get_u32(0).err()),
                (Target::U64, col.get_u64(0).err()),
                (Target::F32, col.get_f32(0).err()),
                (Target::F64, col.get_f64(0).err()),
                (Target::Decimal, col.get_decimal(0).err()),
                (Target::Char, col.get_char(0).err()),
                (Target::Text, col.get_string(0).err()),
                (Target::Blob, col.get_blob(0).err()),
                (Target::Date, col.get_date(0).err()),
                (Target::Time, col.get_time(0).err()),
                (Target::Datetime, col.get_datetime(0).err()),
            ];
            for (target, err) in outcomes {
                let rejected = err.map(|e| e.is_type_error()).unwrap_or(false);
                assert_eq!(rejected, !accepts(repr, target), "{repr} as {target}");
            }
        }
    }

    #[test]
    fn test_temporal_rejects_numeric_getters() {
        for tag in [
            TypeTag::DAT,
            TypeTag::TIMESTAMP,
            TypeTag::TIMESTAMP_TZ,
            TypeTag::TIMESTAMP_LTZ,
        ] {
            let (_mem, col) =
                column_of(tag, 11, vec![Cell::Timestamp(datetime("2024-01-01 00:00:00"))]);
            assert!(col.get_i32(0).unwrap_err().is_type_error());
            assert!(col.get_f64(0).unwrap_err().is_type_error());
            assert!(col.get_decimal(0).unwrap_err().is_type_error());
            assert!(col.get_bool(0).unwrap_err().is_type_error());
        }
    }

    #[test]
    fn test_temporal_values() {
        let (_mem, col) = column_of(
            TypeTag::TIMESTAMP,
            11,
            vec![
                Cell::Timestamp(datetime("2024-05-06 07:08:09.250")),
                Cell::Timestamp(datetime("2024-05-06 07:08:09")),
            ],
        );
        assert_eq!(col.get_string(0).unwrap(), "2024-05-06T07:08:09.250");
        assert_eq!(col.get_string(1).unwrap(), "2024-05-06T07:08:09");
        assert_eq!(
            col.get_date(0).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
        );
        assert_eq!(
            col.get_time(1).unwrap(),
            NaiveTime::from_hms_opt(7, 8, 9).unwrap()
        );
    }

    #[test]
    fn test_integer_narrowing() {
        let (_mem, col) = column_of(TypeTag::INT, 8, vec![Cell::Int(40000), Cell::Int(-5)]);
        assert_eq!(col.get_i64(0).unwrap(), 40000);
        assert_eq!(col.get_i32(0).unwrap(), 40000);
        assert!(col.get_i16(0).unwrap_err().is_overflow());
        assert!(col.get_u32(1).unwrap_err().is_overflow());
        assert!(col.get_bool(0).unwrap());
        assert_eq!(col.get_string(1).unwrap(), "-5");
        assert_eq!(col.get_decimal(1).unwrap(), Decimal::from(-5i64));
    }

    #[test]
    fn test_float_rounding() {
        let (_mem, col) = column_of(
            TypeTag::FLT,
            8,
            vec![
                Cell::Float(2.5),
                Cell::Float(-2.5),
                Cell::Float(2.4),
                Cell::Float(-2.4),
                Cell::Float(1.0e10),
                Cell::Float(0.1),
            ],
        );
        assert_eq!(col.get_i32(0).unwrap(), 3);
        assert_eq!(col.get_i32(1).unwrap(), -3);
        assert_eq!(col.get_i32(2).unwrap(), 2);
        assert_eq!(col.get_i32(3).unwrap(), -2);
        assert!(col.get_i32(4).unwrap_err().is_overflow());
        assert_eq!(col.get_i64(4).unwrap(), 10_000_000_000);
        assert_eq!(col.get_string(0).unwrap(), "2.5");
        assert_eq!(col.get_string(4).unwrap(), "10000000000");
        assert_eq!(col.get_string(5).unwrap(), "0.100000000000000005551115");
        assert_eq!(col.get_f64(5).unwrap(), 0.1);
        assert_eq!(col.get_f32(3).unwrap(), -2.4f32);
    }

    #[test]
    fn test_decimal_comma_only_for_floats() {
        let (_mem, col) = column_of(TypeTag::VCS, 8, vec![Cell::from("3,14")]);
        assert_eq!(col.get_f64(0).unwrap(), 3.14);
        assert_eq!(col.get_f32(0).unwrap(), 3.14f32);
        assert!(col.get_i32(0).unwrap_err().is_type_error());
        assert!(col.get_decimal(0).unwrap_err().is_type_error());
        assert_eq!(col.get_string(0).unwrap(), "3,14");
    }

    #[test]
    fn test_text_parsing() {
        let (_mem, col) = column_of(
            TypeTag::AFC,
            8,
            vec![
                Cell::from("  42 "),
                Cell::from("12abc"),
                Cell::from("Yes"),
                Cell::from("40000"),
            ],
        );
        assert_eq!(col.get_i32(0).unwrap(), 42);
        assert_eq!(col.get_char(0).unwrap(), ' ');
        assert!(col.get_i32(1).unwrap_err().is_type_error());
        assert!(col.get_bool(2).unwrap());
        assert!(!col.get_bool(3).unwrap());
        assert!(col.get_i16(3).unwrap_err().is_overflow());
        assert!(col.get_blob(0).unwrap_err().is_type_error());
    }

    #[test]
    fn test_raw_blob_is_trimmed_bytes() {
        let (_mem, col) = column_of(TypeTag::BIN, 16, vec![Cell::Bytes(vec![0xde, 0xad])]);
        assert_eq!(col.repr(), Repr::Raw);
        assert_eq!(col.get_blob(0).unwrap(), vec![0xde, 0xad]);
    }

    #[test]
    fn test_decimal_values() {
        let (_mem, col) = column_of(
            TypeTag::NUM,
            22,
            vec![
                Cell::Number("123456789012345678.901234".parse().unwrap()),
                Cell::Number("-2.5".parse().unwrap()),
            ],
        );
        assert_eq!(col.get_string(0).unwrap(), "123456789012345678.901234");
        assert_eq!(col.get_i64(0).unwrap(), 123456789012345679);
        assert_eq!(col.get_i32(1).unwrap(), -3);
        assert!(col.get_u16(1).unwrap_err().is_overflow());
        assert!(col.get_i16(0).unwrap_err().is_overflow());
        assert_eq!(col.get_f64(1).unwrap(), -2.5);
    }

    #[test]
    fn test_blob_materialized_past_declared_width() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let (_mem, col) = column_of(TypeTag::BLOB, 16, vec![Cell::Bytes(payload.clone())]);
        assert_eq!(col.element_width(), 8);
        assert_eq!(col.get_blob(0).unwrap(), payload);
        assert!(col.get_string(0).unwrap_err().is_type_error());
    }

    #[test]
    fn test_repeated_reads_are_stable() {
        let (_mem, col) = column_of(TypeTag::FLT, 8, vec![Cell::Float(7.75)]);
        assert_eq!(col.get_f64(0).unwrap(), col.get_f64(0).unwrap());
        assert_eq!(col.get_i32(0).unwrap(), 8);
        assert_eq!(col.get_i32(0).unwrap(), 8);
    }
}
