use crate::error::ConfigError;
use crate::schema::ScalarKind;
use crate::table::{CompactTable, PackedArray, PackedRecord};
use std::collections::BTreeMap;

/// A scalar configuration value.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// Signed 64-bit integer.
    I64(i64),
    /// Utf8 string.
    Str(String),
}

impl Scalar {
    /// The kind of this scalar.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::U8(_) => ScalarKind::U8,
            Self::U16(_) => ScalarKind::U16,
            Self::U32(_) => ScalarKind::U32,
            Self::U64(_) => ScalarKind::U64,
            Self::I64(_) => ScalarKind::I64,
            Self::Str(_) => ScalarKind::Str,
        }
    }

    /// Parses a literal under a kind, as used for query values in paths.
    pub fn parse(kind: ScalarKind, text: &str) -> Result<Self, ConfigError> {
        let err = || ConfigError::type_mismatch(format!("{text:?} is not a {kind:?}"));
        Ok(match kind {
            ScalarKind::Bool => match text {
                "true" => Self::Bool(true),
                "false" => Self::Bool(false),
                _ => return Err(err()),
            },
            ScalarKind::U8 => Self::U8(text.parse().map_err(|_| err())?),
            ScalarKind::U16 => Self::U16(text.parse().map_err(|_| err())?),
            ScalarKind::U32 => Self::U32(text.parse().map_err(|_| err())?),
            ScalarKind::U64 => Self::U64(text.parse().map_err(|_| err())?),
            ScalarKind::I64 => Self::I64(text.parse().map_err(|_| err())?),
            ScalarKind::Str => Self::Str(text.to_string()),
        })
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Array storage. The grammar decides the variant; the two must never be
/// mixed for one node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ArrayValue {
    /// Contiguous packed elements, grown by reallocation.
    Packed(PackedArray),
    /// An ordered sequence of values, grown in place.
    Generic(Vec<Value>),
}

impl ArrayValue {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Packed(a) => a.len(),
            Self::Generic(v) => v.len(),
        }
    }

    /// True when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Table storage, one variant per storage-hint combination.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TableValue {
    /// Packed keys and values in a hash table.
    Compact(CompactTable),
    /// Keyed by the projected string key field.
    StringKeyed(BTreeMap<String, Value>),
    /// Keyed by the packed key record; values arbitrary.
    KeyedPacked(BTreeMap<PackedRecord, Value>),
    /// Association list with structural key equality.
    Generic(Vec<(Value, Value)>),
}

impl TableValue {
    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            Self::Compact(t) => t.len(),
            Self::StringKeyed(m) => m.len(),
            Self::KeyedPacked(m) => m.len(),
            Self::Generic(v) => v.len(),
        }
    }

    /// True when the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A configuration tree. Shapes mirror the grammar: the parser only builds
/// values whose storage variant matches the node's storage hints.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// A leaf.
    Scalar(Scalar),
    /// Named children, keys normalized.
    Struct(BTreeMap<String, Value>),
    /// An ordered sequence.
    Array(ArrayValue),
    /// A keyed collection.
    Table(TableValue),
}

impl Value {
    /// Borrows the struct fields, if this is a struct.
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Borrows the scalar, if this is a leaf.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_literals() {
        assert_eq!(
            Scalar::parse(ScalarKind::Bool, "true").unwrap(),
            Scalar::Bool(true)
        );
        assert_eq!(
            Scalar::parse(ScalarKind::U32, "4000000000").unwrap(),
            Scalar::U32(4_000_000_000)
        );
        assert_eq!(
            Scalar::parse(ScalarKind::I64, "-7").unwrap(),
            Scalar::I64(-7)
        );
        assert!(Scalar::parse(ScalarKind::U8, "256").is_err());
        assert!(Scalar::parse(ScalarKind::Bool, "yes").is_err());
    }
}
