//! Engine boundary.
//!
//! The traits here are everything the extraction core needs from a database
//! engine's native call interface:
//!
//! - [`Cursor`] - column metadata, buffer registration and fetch cycles
//! - [`Environment`] - out-of-line descriptor allocation and decoding
//! - [`Diagnostics`] - the error handle read by [`crate::report`]
//!
//! Engine calls never return Rust errors. They return a raw [`Status`] (and a
//! value, wrapped in [`Reply`]) which the caller routes through the reporting
//! bridge.

pub mod any;
pub mod memory;

use chrono::NaiveDateTime;
use std::fmt;

/// Raw completion status of an engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    SuccessWithInfo,
    NeedData,
    NoData,
    Error,
    InvalidHandle,
    StillExecuting,
}

impl Status {
    /// Numeric code as used by the classic call interface.
    pub fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::SuccessWithInfo => 1,
            Status::NeedData => 99,
            Status::NoData => 100,
            Status::Error => -1,
            Status::InvalidHandle => -2,
            Status::StillExecuting => -3123,
        }
    }

    /// Map a numeric code back to a status. Unknown codes are errors.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Success,
            1 => Status::SuccessWithInfo,
            99 => Status::NeedData,
            100 => Status::NoData,
            -2 => Status::InvalidHandle,
            -3123 => Status::StillExecuting,
            _ => Status::Error,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Status::Error | Status::InvalidHandle | Status::NeedData | Status::StillExecuting
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "SUCCESS",
            Status::SuccessWithInfo => "SUCCESS_WITH_INFO",
            Status::NeedData => "NEED_DATA",
            Status::NoData => "NO_DATA",
            Status::Error => "ERROR",
            Status::InvalidHandle => "INVALID_HANDLE",
            Status::StillExecuting => "STILL_EXECUTING",
        };
        f.write_str(name)
    }
}

/// Status plus the value produced by a successful call.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub status: Status,
    pub value: Option<T>,
}

impl<T> Reply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            status: Status::Success,
            value: Some(value),
        }
    }

    pub fn with_info(value: T) -> Self {
        Self {
            status: Status::SuccessWithInfo,
            value: Some(value),
        }
    }

    pub fn no_data(value: T) -> Self {
        Self {
            status: Status::NoData,
            value: Some(value),
        }
    }

    pub fn fail(status: Status) -> Self {
        Self {
            status,
            value: None,
        }
    }
}

/// An error record as held by the engine's error handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: i32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Engine declared type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(pub u16);

impl TypeTag {
    pub const CHR: TypeTag = TypeTag(1);
    pub const NUM: TypeTag = TypeTag(2);
    pub const INT: TypeTag = TypeTag(3);
    pub const FLT: TypeTag = TypeTag(4);
    pub const STR: TypeTag = TypeTag(5);
    pub const VNU: TypeTag = TypeTag(6);
    pub const LNG: TypeTag = TypeTag(8);
    pub const VCS: TypeTag = TypeTag(9);
    pub const DAT: TypeTag = TypeTag(12);
    pub const BIN: TypeTag = TypeTag(23);
    pub const LBI: TypeTag = TypeTag(24);
    pub const UIN: TypeTag = TypeTag(68);
    pub const AFC: TypeTag = TypeTag(96);
    pub const AVC: TypeTag = TypeTag(97);
    pub const CLOB: TypeTag = TypeTag(112);
    pub const BLOB: TypeTag = TypeTag(113);
    pub const TIMESTAMP: TypeTag = TypeTag(187);
    pub const TIMESTAMP_TZ: TypeTag = TypeTag(188);
    pub const TIMESTAMP_LTZ: TypeTag = TypeTag(232);

    /// Resolve a type name as written in fixtures and on the command line.
    pub fn from_name(name: &str) -> Option<TypeTag> {
        let tag = match name.to_ascii_uppercase().as_str() {
            "CHR" | "CHAR" | "VARCHAR" | "VARCHAR2" => TypeTag::CHR,
            "NUM" | "NUMBER" | "NUMERIC" | "DECIMAL" => TypeTag::NUM,
            "INT" | "INTEGER" => TypeTag::INT,
            "FLT" | "FLOAT" | "DOUBLE" => TypeTag::FLT,
            "STR" => TypeTag::STR,
            "VNU" => TypeTag::VNU,
            "LNG" | "LONG" => TypeTag::LNG,
            "VCS" => TypeTag::VCS,
            "DAT" | "DATE" => TypeTag::DAT,
            "BIN" | "RAW" => TypeTag::BIN,
            "LBI" | "LONG RAW" => TypeTag::LBI,
            "UIN" | "UNSIGNED" => TypeTag::UIN,
            "AFC" => TypeTag::AFC,
            "AVC" => TypeTag::AVC,
            "CLOB" => TypeTag::CLOB,
            "BLOB" => TypeTag::BLOB,
            "TIMESTAMP" => TypeTag::TIMESTAMP,
            "TIMESTAMP_TZ" | "TIMESTAMP WITH TIME ZONE" => TypeTag::TIMESTAMP_TZ,
            "TIMESTAMP_LTZ" | "TIMESTAMP WITH LOCAL TIME ZONE" => TypeTag::TIMESTAMP_LTZ,
            other => return other.parse().ok().map(TypeTag),
        };
        Some(tag)
    }

    /// Short mnemonic, or the numeric code for unnamed tags.
    pub fn name(self) -> String {
        let name = match self {
            TypeTag::CHR => "CHR",
            TypeTag::NUM => "NUM",
            TypeTag::INT => "INT",
            TypeTag::FLT => "FLT",
            TypeTag::STR => "STR",
            TypeTag::VNU => "VNU",
            TypeTag::LNG => "LNG",
            TypeTag::VCS => "VCS",
            TypeTag::DAT => "DAT",
            TypeTag::BIN => "BIN",
            TypeTag::LBI => "LBI",
            TypeTag::UIN => "UIN",
            TypeTag::AFC => "AFC",
            TypeTag::AVC => "AVC",
            TypeTag::CLOB => "CLOB",
            TypeTag::BLOB => "BLOB",
            TypeTag::TIMESTAMP => "TIMESTAMP",
            TypeTag::TIMESTAMP_TZ => "TIMESTAMP_TZ",
            TypeTag::TIMESTAMP_LTZ => "TIMESTAMP_LTZ",
            TypeTag(code) => return code.to_string(),
        };
        name.to_string()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Column metadata as described by the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub type_tag: TypeTag,
    /// Declared width in bytes.
    pub width: usize,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_tag: TypeTag, width: usize) -> Self {
        Self {
            name: name.into(),
            type_tag,
            width,
        }
    }
}

/// Shape of a buffer registered for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefineSpec {
    /// Zero-based column position.
    pub position: usize,
    /// Representation the engine must write.
    pub wire: TypeTag,
    pub element_width: usize,
    pub batch: usize,
}

/// Registration handle returned by [`Cursor::define`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefineId(pub u64);

/// Opaque out-of-line resource handle.
///
/// Stored pointer-sized (native-endian `u64`) inside batch buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub u64);

impl Descriptor {
    pub const WIDTH: usize = std::mem::size_of::<u64>();

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_ne_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Descriptor> {
        let raw: [u8; 8] = bytes.get(..Self::WIDTH)?.try_into().ok()?;
        Some(Descriptor(u64::from_ne_bytes(raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Timestamp,
    Lob,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::Timestamp => f.write_str("TIMESTAMP"),
            DescriptorKind::Lob => f.write_str("LOB"),
        }
    }
}

/// Mutable view of one bound column handed to [`Cursor::fetch`].
pub struct ColumnSlot<'a> {
    pub define: DefineId,
    /// `batch * element_width` bytes.
    pub data: &'a mut [u8],
    /// Nonzero means NULL.
    pub indicators: &'a mut [i16],
    /// Bytes written per row.
    pub lengths: &'a mut [u32],
}

/// Access to the engine's error handle.
pub trait Diagnostics {
    /// The most recent error record, if any.
    fn last_error(&self) -> Option<Diagnostic>;
}

/// Session-level engine context.
pub trait Environment: Diagnostics {
    fn alloc_descriptor(&self, kind: DescriptorKind) -> Reply<Descriptor>;

    fn free_descriptor(&self, descriptor: Descriptor, kind: DescriptorKind) -> Status;

    /// Release a buffer registration.
    fn free_define(&self, define: DefineId) -> Status;

    /// Stream the whole large object behind `descriptor`.
    fn lob_read(&self, descriptor: Descriptor) -> Reply<Vec<u8>>;

    /// Decode a timestamp descriptor.
    fn datetime_read(&self, descriptor: Descriptor) -> Reply<NaiveDateTime>;
}

/// A positioned, column-described result cursor.
pub trait Cursor: Diagnostics {
    fn column_count(&self) -> Reply<usize>;

    fn describe(&self, position: usize) -> Reply<ColumnMetadata>;

    /// Register a buffer shape for a column.
    fn define(&mut self, position: usize, spec: &DefineSpec) -> Reply<DefineId>;

    /// Fill up to `rows` rows of every slot in place.
    ///
    /// Returns the number of rows written; `NoData` once the result is
    /// exhausted.
    fn fetch(&mut self, rows: usize, slots: &mut [ColumnSlot<'_>]) -> Reply<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [
            Status::Success,
            Status::SuccessWithInfo,
            Status::NeedData,
            Status::NoData,
            Status::Error,
            Status::InvalidHandle,
            Status::StillExecuting,
        ] {
            assert_eq!(Status::from_code(status.code()), status);
        }
        assert_eq!(Status::from_code(-42), Status::Error);
        assert!(!Status::SuccessWithInfo.is_failure());
        assert!(!Status::NoData.is_failure());
        assert!(Status::InvalidHandle.is_failure());
    }

    #[test]
    fn test_type_tag_names() {
        assert_eq!(TypeTag::from_name("number"), Some(TypeTag::NUM));
        assert_eq!(TypeTag::from_name("TIMESTAMP_TZ"), Some(TypeTag::TIMESTAMP_TZ));
        assert_eq!(TypeTag::from_name("254"), Some(TypeTag(254)));
        assert_eq!(TypeTag::from_name("nonsense"), None);
        assert_eq!(TypeTag(254).to_string(), "254");
        assert_eq!(TypeTag::BLOB.to_string(), "BLOB");
    }

    #[test]
    fn test_descriptor_bytes() {
        let d = Descriptor(0x0102_0304_0506_0708);
        assert_eq!(Descriptor::from_bytes(&d.to_bytes()), Some(d));
        assert_eq!(Descriptor::from_bytes(&[1, 2, 3]), None);
    }
}
