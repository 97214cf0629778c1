use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Normalizes a schema identifier for lookup: `-` and `_` spell the same
/// field, matching the convention of the modelling language the schemas are
/// loaded from.
pub fn normalize_id(id: &str) -> String {
    id.replace('-', "_")
}

/// The primitive kinds a scalar node can take.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ScalarKind {
    /// Boolean.
    Bool,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 64-bit integer.
    I64,
    /// Utf8 string.
    Str,
}

impl ScalarKind {
    /// Returns the packed width in bytes, or `None` for kinds that cannot
    /// be packed.
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::U8 => Some(1),
            Self::U16 => Some(2),
            Self::U32 => Some(4),
            Self::U64 | Self::I64 => Some(8),
            Self::Str => None,
        }
    }

    /// Returns true if values of this kind have a fixed packed width.
    pub const fn is_fixed(self) -> bool {
        self.width().is_some()
    }
}

/// One field of a packed record: a name, a fixed-width kind and the byte
/// offset the field is stored at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldLayout {
    /// Normalized field name.
    pub name: String,
    /// Field kind; always fixed-width.
    pub kind: ScalarKind,
    /// Byte offset within the record.
    pub offset: usize,
}

/// The layout of a fixed-size packed record. Fields are stored back to back
/// in declaration order, little-endian, with no padding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordLayout {
    fields: Vec<FieldLayout>,
    size: usize,
}

impl RecordLayout {
    /// Builds a layout from `(name, kind)` pairs. Fails if any kind is not
    /// fixed-width.
    pub fn new(fields: &[(&str, ScalarKind)]) -> Result<Self, ConfigError> {
        let mut laid = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for (name, kind) in fields {
            let width = kind.width().ok_or_else(|| {
                ConfigError::type_mismatch(format!("field {name} is not packable"))
            })?;
            laid.push(FieldLayout {
                name: normalize_id(name),
                kind: *kind,
                offset,
            });
            offset += width;
        }
        Ok(Self {
            fields: laid,
            size: offset,
        })
    }

    /// Total record size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The fields in storage order.
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Looks up a field by normalized name.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        let name = normalize_id(name);
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The storage variant a table grammar selects. All four are first-class;
/// collapsing them to one representation would lose the memory-layout
/// guarantees the dataplane relies on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableVariant {
    /// Packed keys and packed values in a hash table.
    Compact,
    /// A single string key field projects to the map key.
    StringKeyed,
    /// Packed keys, arbitrary values.
    KeyedPacked,
    /// Structural keys, arbitrary values.
    Generic,
}

/// A table node: an ordered key tuple, a value grammar, and the storage
/// hints that select one of the four variants.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableGrammar {
    /// The key tuple in declaration order, names normalized.
    pub keys: Vec<(String, ScalarKind)>,
    /// Grammar of the table values.
    pub value: Box<Grammar>,
    /// Layout of the packed key record, when every key field is fixed.
    pub key_layout: Option<RecordLayout>,
    /// Layout of the packed value record, when the value grammar packs.
    pub value_layout: Option<RecordLayout>,
    /// Name of the single string key field, when there is exactly one.
    pub string_key: Option<String>,
}

impl TableGrammar {
    /// The variant the hints select. Precedence: both layouts set wins,
    /// then a string key, then a packed key alone.
    pub fn variant(&self) -> TableVariant {
        if self.key_layout.is_some() && self.value_layout.is_some() {
            TableVariant::Compact
        } else if self.string_key.is_some() {
            TableVariant::StringKeyed
        } else if self.key_layout.is_some() {
            TableVariant::KeyedPacked
        } else {
            TableVariant::Generic
        }
    }

    /// Returns the kind of a key field by normalized name.
    pub fn key_kind(&self, name: &str) -> Option<ScalarKind> {
        let name = normalize_id(name);
        self.keys
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, kind)| *kind)
    }
}

/// The structural grammar of a configuration node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Grammar {
    /// A leaf of the given kind.
    Scalar(ScalarKind),
    /// Named children, keys normalized.
    Struct(BTreeMap<String, Grammar>),
    /// An ordered sequence. `packed` is set for ctype arrays whose elements
    /// pack to a fixed size.
    Array {
        /// Element grammar.
        elem: Box<Grammar>,
        /// Set when elements are stored as contiguous packed records.
        packed: bool,
    },
    /// A keyed collection.
    Table(TableGrammar),
}

impl Grammar {
    /// A struct grammar from `(name, grammar)` pairs.
    pub fn strukt(fields: Vec<(&str, Grammar)>) -> Self {
        Self::Struct(
            fields
                .into_iter()
                .map(|(name, g)| (normalize_id(name), g))
                .collect(),
        )
    }

    /// An array grammar; packs automatically when the element grammar does.
    pub fn array(elem: Grammar) -> Self {
        let packed = packed_layout_of(&elem).is_some();
        Self::Array {
            elem: Box::new(elem),
            packed,
        }
    }

    /// A table grammar; the storage hints are derived from the key tuple
    /// and the value grammar, mirroring how the schema loader assigns them.
    pub fn table(keys: Vec<(&str, ScalarKind)>, value: Grammar) -> Self {
        let keys: Vec<(String, ScalarKind)> = keys
            .into_iter()
            .map(|(name, kind)| (normalize_id(name), kind))
            .collect();
        let all_fixed = keys.iter().all(|(_, kind)| kind.is_fixed());
        let key_layout = if all_fixed {
            let fields: Vec<(&str, ScalarKind)> =
                keys.iter().map(|(n, k)| (n.as_str(), *k)).collect();
            RecordLayout::new(&fields).ok()
        } else {
            None
        };
        let value_layout = match packed_layout_of(&value) {
            Some(PackedShape::Record(layout)) if key_layout.is_some() => Some(layout),
            _ => None,
        };
        let string_key = match keys.as_slice() {
            [(name, ScalarKind::Str)] => Some(name.clone()),
            _ => None,
        };
        Self::Table(TableGrammar {
            keys,
            value: Box::new(value),
            key_layout,
            value_layout,
            string_key,
        })
    }

    /// Looks up a struct child by normalized name.
    pub fn child(&self, name: &str) -> Option<&Grammar> {
        match self {
            Self::Struct(fields) => fields.get(&normalize_id(name)),
            _ => None,
        }
    }
}

/// The packed shape of a grammar node, when it has one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PackedShape {
    /// A bare fixed-width scalar.
    Scalar(ScalarKind),
    /// A struct of fixed-width scalars.
    Record(RecordLayout),
}

impl PackedShape {
    /// Packed size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Scalar(kind) => kind.width().unwrap_or(0),
            Self::Record(layout) => layout.size(),
        }
    }
}

/// Computes the packed shape of a grammar node: a fixed scalar, or a struct
/// whose fields are all fixed scalars. Anything else does not pack.
pub fn packed_layout_of(grammar: &Grammar) -> Option<PackedShape> {
    match grammar {
        Grammar::Scalar(kind) if kind.is_fixed() => Some(PackedShape::Scalar(*kind)),
        Grammar::Struct(fields) => {
            let mut laid = Vec::with_capacity(fields.len());
            for (name, child) in fields {
                match child {
                    Grammar::Scalar(kind) if kind.is_fixed() => {
                        laid.push((name.as_str(), *kind));
                    }
                    _ => return None,
                }
            }
            if laid.is_empty() {
                return None;
            }
            RecordLayout::new(&laid).ok().map(PackedShape::Record)
        }
        _ => None,
    }
}

/// A named schema: the unit the registry hands out and the leader validates
/// against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Schema {
    name: String,
    grammar: Grammar,
}

impl Schema {
    /// Creates a schema.
    pub fn new(name: impl Into<String>, grammar: Grammar) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            grammar,
        })
    }

    /// The schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root grammar.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets() {
        let layout = RecordLayout::new(&[
            ("addr", ScalarKind::U32),
            ("port", ScalarKind::U16),
            ("up", ScalarKind::Bool),
        ])
        .unwrap();
        assert_eq!(layout.size(), 7);
        assert_eq!(layout.field("addr").unwrap().offset, 0);
        assert_eq!(layout.field("port").unwrap().offset, 4);
        assert_eq!(layout.field("up").unwrap().offset, 6);
    }

    #[test]
    fn layout_rejects_strings() {
        assert!(RecordLayout::new(&[("name", ScalarKind::Str)]).is_err());
    }

    #[test]
    fn table_variant_derivation() {
        let compact = Grammar::table(
            vec![("addr", ScalarKind::U32)],
            Grammar::strukt(vec![("counter", Grammar::Scalar(ScalarKind::U64))]),
        );
        let string_keyed = Grammar::table(
            vec![("name", ScalarKind::Str)],
            Grammar::strukt(vec![("mtu", Grammar::Scalar(ScalarKind::U32))]),
        );
        let keyed_packed = Grammar::table(
            vec![("id", ScalarKind::U64)],
            Grammar::strukt(vec![("description", Grammar::Scalar(ScalarKind::Str))]),
        );
        let generic = Grammar::table(
            vec![("name", ScalarKind::Str), ("unit", ScalarKind::U32)],
            Grammar::Scalar(ScalarKind::U64),
        );
        for (grammar, variant) in [
            (compact, TableVariant::Compact),
            (string_keyed, TableVariant::StringKeyed),
            (keyed_packed, TableVariant::KeyedPacked),
            (generic, TableVariant::Generic),
        ] {
            match grammar {
                Grammar::Table(t) => assert_eq!(t.variant(), variant),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn identifier_normalization() {
        let g = Grammar::strukt(vec![("ethernet-address", Grammar::Scalar(ScalarKind::U64))]);
        assert!(g.child("ethernet_address").is_some());
        assert!(g.child("ethernet-address").is_some());
    }
}
