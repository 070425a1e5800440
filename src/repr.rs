//! Representation kinds.
//!
//! A column's declared engine type decides how its batch buffer is laid out
//! and which conversions are legal. The mapping is a single table; tags not
//! in the table fall back to [`Repr::Raw`].

use std::fmt;

use crate::engine::{Descriptor, DescriptorKind, TypeTag};
use crate::number::NUMBER_SIZE;

/// Extra bytes allocated per text/binary element. Some engines report the
/// declared width before terminator or encoding overhead.
pub const TEXT_MARGIN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repr {
    /// Timestamp descriptor handles.
    Temporal,
    Signed,
    Unsigned,
    Float,
    /// Fixed-size decimal elements.
    Decimal,
    /// Large-object descriptor handles.
    Lob,
    /// Declared character types.
    Text,
    /// Binary and unrecognised types.
    Raw,
}

impl Repr {
    pub const ALL: [Repr; 8] = [
        Repr::Temporal,
        Repr::Signed,
        Repr::Unsigned,
        Repr::Float,
        Repr::Decimal,
        Repr::Lob,
        Repr::Text,
        Repr::Raw,
    ];

    /// Resolve the kind for a declared type tag.
    pub fn of(tag: TypeTag) -> Repr {
        REPR_TABLE
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, repr)| *repr)
            .unwrap_or(Repr::Raw)
    }

    /// Bytes per batch element.
    pub fn element_width(self, declared: usize) -> usize {
        match self {
            Repr::Temporal | Repr::Lob => Descriptor::WIDTH,
            Repr::Signed => std::mem::size_of::<i64>(),
            Repr::Unsigned => std::mem::size_of::<u64>(),
            Repr::Float => std::mem::size_of::<f64>(),
            Repr::Decimal => NUMBER_SIZE,
            Repr::Text | Repr::Raw => declared + TEXT_MARGIN,
        }
    }

    /// Type tag the engine is asked to write.
    pub fn wire_tag(self, declared: TypeTag) -> TypeTag {
        match self {
            Repr::Temporal => TypeTag::TIMESTAMP,
            Repr::Signed => TypeTag::INT,
            Repr::Unsigned => TypeTag::UIN,
            Repr::Float => TypeTag::FLT,
            Repr::Decimal => TypeTag::VNU,
            Repr::Lob => TypeTag::BLOB,
            Repr::Text => TypeTag::AFC,
            Repr::Raw if declared == TypeTag::BIN || declared == TypeTag::LBI => TypeTag::BIN,
            Repr::Raw => TypeTag::AFC,
        }
    }

    /// Descriptor kind for kinds stored out of line.
    pub fn descriptor_kind(self) -> Option<DescriptorKind> {
        match self {
            Repr::Temporal => Some(DescriptorKind::Timestamp),
            Repr::Lob => Some(DescriptorKind::Lob),
            _ => None,
        }
    }

    /// The buffer must be zero-filled before binding.
    pub fn zero_fill(self) -> bool {
        self == Repr::Decimal
    }

    pub fn name(self) -> &'static str {
        match self {
            Repr::Temporal => "temporal",
            Repr::Signed => "signed",
            Repr::Unsigned => "unsigned",
            Repr::Float => "float",
            Repr::Decimal => "decimal",
            Repr::Lob => "lob",
            Repr::Text => "text",
            Repr::Raw => "raw",
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type tag → representation kind.
pub const REPR_TABLE: &[(TypeTag, Repr)] = &[
    (TypeTag::DAT, Repr::Temporal),
    (TypeTag::TIMESTAMP, Repr::Temporal),
    (TypeTag::TIMESTAMP_TZ, Repr::Temporal),
    (TypeTag::TIMESTAMP_LTZ, Repr::Temporal),
    (TypeTag::INT, Repr::Signed),
    (TypeTag::UIN, Repr::Unsigned),
    (TypeTag::FLT, Repr::Float),
    (TypeTag::NUM, Repr::Decimal),
    (TypeTag::VNU, Repr::Decimal),
    (TypeTag::BLOB, Repr::Lob),
    (TypeTag::CHR, Repr::Text),
    (TypeTag::STR, Repr::Text),
    (TypeTag::LNG, Repr::Text),
    (TypeTag::VCS, Repr::Text),
    (TypeTag::AFC, Repr::Text),
    (TypeTag::AVC, Repr::Text),
    (TypeTag::CLOB, Repr::Text),
    (TypeTag::BIN, Repr::Raw),
    (TypeTag::LBI, Repr::Raw),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporal_tags() {
        for tag in [
            TypeTag::DAT,
            TypeTag::TIMESTAMP,
            TypeTag::TIMESTAMP_TZ,
            TypeTag::TIMESTAMP_LTZ,
        ] {
            assert_eq!(Repr::of(tag), Repr::Temporal);
        }
    }

    #[test]
    fn test_unknown_tag_falls_back() {
        assert_eq!(Repr::of(TypeTag(254)), Repr::Raw);
        assert_eq!(Repr::Raw.wire_tag(TypeTag(254)), TypeTag::AFC);
        assert_eq!(Repr::Raw.wire_tag(TypeTag::BIN), TypeTag::BIN);
        assert_eq!(Repr::Raw.element_width(10), 26);
    }

    #[test]
    fn test_element_widths() {
        assert_eq!(Repr::Decimal.element_width(0), NUMBER_SIZE);
        assert_eq!(Repr::Lob.element_width(4000), 8);
        assert_eq!(Repr::Text.element_width(30), 30 + TEXT_MARGIN);
        assert!(Repr::Decimal.zero_fill());
        assert!(!Repr::Text.zero_fill());
    }

    #[test]
    fn test_table_has_no_duplicates() {
        for (i, (tag, _)) in REPR_TABLE.iter().enumerate() {
            assert!(REPR_TABLE[i + 1..].iter().all(|(t, _)| t != tag), "{tag}");
        }
    }
}
