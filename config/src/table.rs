use crate::error::ConfigError;
use crate::schema::{PackedShape, RecordLayout, ScalarKind};
use crate::value::{Scalar, Value};
use fnv::FnvHashMap;
use std::collections::BTreeMap;

fn write_scalar(buf: &mut [u8], kind: ScalarKind, scalar: &Scalar) -> Result<(), ConfigError> {
    match (kind, scalar) {
        (ScalarKind::Bool, Scalar::Bool(b)) => buf[0] = u8::from(*b),
        (ScalarKind::U8, Scalar::U8(v)) => buf[0] = *v,
        (ScalarKind::U16, Scalar::U16(v)) => buf.copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::U32, Scalar::U32(v)) => buf.copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::U64, Scalar::U64(v)) => buf.copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::I64, Scalar::I64(v)) => buf.copy_from_slice(&v.to_le_bytes()),
        _ => {
            return Err(ConfigError::type_mismatch(format!(
                "cannot pack {scalar:?} as {kind:?}"
            )))
        }
    }
    Ok(())
}

fn read_scalar(buf: &[u8], kind: ScalarKind) -> Scalar {
    match kind {
        ScalarKind::Bool => Scalar::Bool(buf[0] != 0),
        ScalarKind::U8 => Scalar::U8(buf[0]),
        ScalarKind::U16 => Scalar::U16(u16::from_le_bytes(buf.try_into().unwrap())),
        ScalarKind::U32 => Scalar::U32(u32::from_le_bytes(buf.try_into().unwrap())),
        ScalarKind::U64 => Scalar::U64(u64::from_le_bytes(buf.try_into().unwrap())),
        ScalarKind::I64 => Scalar::I64(i64::from_le_bytes(buf.try_into().unwrap())),
        ScalarKind::Str => unreachable!("strings have no packed form"),
    }
}

/// A fixed-size record packed at the offsets of a [`RecordLayout`].
///
/// Records compare and hash as raw bytes, which is exactly structural
/// equality because the layout admits no padding.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PackedRecord(Box<[u8]>);

impl PackedRecord {
    /// Packs named scalar fields into a record. Every layout field must be
    /// present with the layout's kind.
    pub fn pack(
        layout: &RecordLayout,
        fields: &BTreeMap<String, Scalar>,
    ) -> Result<Self, ConfigError> {
        let mut buf = vec![0u8; layout.size()].into_boxed_slice();
        for field in layout.fields() {
            let scalar = fields.get(&field.name).ok_or_else(|| {
                ConfigError::MissingKeyField(field.name.clone())
            })?;
            let width = field.kind.width().expect("layout fields are fixed");
            write_scalar(
                &mut buf[field.offset..field.offset + width],
                field.kind,
                scalar,
            )?;
        }
        Ok(Self(buf))
    }

    /// Unpacks the record into named scalars.
    pub fn unpack(&self, layout: &RecordLayout) -> BTreeMap<String, Scalar> {
        let mut fields = BTreeMap::new();
        for field in layout.fields() {
            let width = field.kind.width().expect("layout fields are fixed");
            let scalar = read_scalar(&self.0[field.offset..field.offset + width], field.kind);
            fields.insert(field.name.clone(), scalar);
        }
        fields
    }

    /// The raw record bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Packs a struct value into a record under a layout.
pub fn pack_record(layout: &RecordLayout, value: &Value) -> Result<PackedRecord, ConfigError> {
    pack_value(&PackedShape::Record(layout.clone()), value).map(PackedRecord)
}

/// Unpacks a record into a struct value under a layout.
pub fn unpack_record(layout: &RecordLayout, record: &PackedRecord) -> Value {
    unpack_value(&PackedShape::Record(layout.clone()), record.as_bytes())
}

impl std::fmt::Debug for PackedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackedRecord({})", hex::encode(&self.0))
    }
}

/// Packs a value under a packed shape: either a bare scalar or a struct of
/// fixed scalars.
pub fn pack_value(shape: &PackedShape, value: &Value) -> Result<Box<[u8]>, ConfigError> {
    match (shape, value) {
        (PackedShape::Scalar(kind), Value::Scalar(scalar)) => {
            let width = kind.width().expect("packed shapes are fixed");
            let mut buf = vec![0u8; width].into_boxed_slice();
            write_scalar(&mut buf, *kind, scalar)?;
            Ok(buf)
        }
        (PackedShape::Record(layout), Value::Struct(fields)) => {
            let mut scalars = BTreeMap::new();
            for (name, v) in fields {
                match v {
                    Value::Scalar(s) => {
                        scalars.insert(name.clone(), s.clone());
                    }
                    _ => {
                        return Err(ConfigError::type_mismatch(format!(
                            "field {name} is not scalar"
                        )))
                    }
                }
            }
            PackedRecord::pack(layout, &scalars).map(|r| r.0)
        }
        _ => Err(ConfigError::type_mismatch(
            "value does not fit its packed shape".to_string(),
        )),
    }
}

/// Unpacks bytes produced by [`pack_value`] back into a value.
pub fn unpack_value(shape: &PackedShape, bytes: &[u8]) -> Value {
    match shape {
        PackedShape::Scalar(kind) => Value::Scalar(read_scalar(bytes, *kind)),
        PackedShape::Record(layout) => {
            let record = PackedRecord(bytes.to_vec().into_boxed_slice());
            Value::Struct(
                record
                    .unpack(layout)
                    .into_iter()
                    .map(|(name, s)| (name, Value::Scalar(s)))
                    .collect(),
            )
        }
    }
}

/// A hash table over packed key and value records: the compact-table
/// storage variant.
#[derive(Clone)]
pub struct CompactTable {
    key_layout: RecordLayout,
    value_layout: RecordLayout,
    entries: FnvHashMap<PackedRecord, PackedRecord>,
}

impl CompactTable {
    /// An empty table for the given layouts.
    pub fn new(key_layout: RecordLayout, value_layout: RecordLayout) -> Self {
        Self {
            key_layout,
            value_layout,
            entries: FnvHashMap::default(),
        }
    }

    /// The key record layout.
    pub fn key_layout(&self) -> &RecordLayout {
        &self.key_layout
    }

    /// The value record layout.
    pub fn value_layout(&self) -> &RecordLayout {
        &self.value_layout
    }

    /// Returns the stored value record for a key, if present.
    pub fn lookup_ptr(&self, key: &PackedRecord) -> Option<&PackedRecord> {
        self.entries.get(key)
    }

    /// Inserts a fresh entry. Fails without touching the table if the key
    /// is already present.
    pub fn add(&mut self, key: PackedRecord, value: PackedRecord) -> Result<(), ConfigError> {
        if self.entries.contains_key(&key) {
            return Err(ConfigError::DuplicateEntry(format!("{key:?}")));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Overwrites an existing entry. Fails if the key is absent.
    pub fn update(&mut self, key: &PackedRecord, value: PackedRecord) -> Result<(), ConfigError> {
        match self.entries.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ConfigError::not_found(format!("{key:?}"))),
        }
    }

    /// Deletes an entry. Fails if the key is absent.
    pub fn remove(&mut self, key: &PackedRecord) -> Result<PackedRecord, ConfigError> {
        self.entries
            .remove(key)
            .ok_or_else(|| ConfigError::not_found(format!("{key:?}")))
    }

    /// Iterates entries in unspecified order.
    pub fn iterate(&self) -> impl Iterator<Item = (&PackedRecord, &PackedRecord)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for CompactTable {
    fn eq(&self, other: &Self) -> bool {
        self.key_layout == other.key_layout
            && self.value_layout == other.value_layout
            && self.entries == other.entries
    }
}

impl Eq for CompactTable {}

impl std::fmt::Debug for CompactTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut m = f.debug_map();
        for (k, v) in self.entries.iter() {
            m.entry(&hex::encode(k.as_bytes()), &hex::encode(v.as_bytes()));
        }
        m.finish()
    }
}

/// A contiguous buffer of fixed-size packed elements: the ctype-array
/// storage variant. The buffer is sized exactly; growth and shrinkage go
/// through reallocation by the mutators.
#[derive(Clone, Eq, PartialEq)]
pub struct PackedArray {
    elem_size: usize,
    data: Vec<u8>,
}

impl PackedArray {
    /// An empty array of `elem_size`-byte elements.
    pub fn new(elem_size: usize) -> Self {
        Self {
            elem_size,
            data: Vec::new(),
        }
    }

    /// Builds an array from packed elements. Every element must be exactly
    /// `elem_size` bytes.
    pub fn from_elems<I>(elem_size: usize, elems: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Box<[u8]>>,
    {
        let mut data = Vec::new();
        for elem in elems {
            if elem.len() != elem_size {
                return Err(ConfigError::type_mismatch(format!(
                    "packed element is {} bytes, expected {elem_size}",
                    elem.len()
                )));
            }
            data.extend_from_slice(&elem);
        }
        Ok(Self { elem_size, data })
    }

    /// Element size in bytes.
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        if self.elem_size == 0 {
            0
        } else {
            self.data.len() / self.elem_size
        }
    }

    /// True when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the bytes of element `i`.
    pub fn elem(&self, i: usize) -> Option<&[u8]> {
        if i < self.len() {
            Some(&self.data[i * self.elem_size..(i + 1) * self.elem_size])
        } else {
            None
        }
    }

    /// Overwrites element `i` in place.
    pub fn write_elem(&mut self, i: usize, bytes: &[u8]) -> Result<(), ConfigError> {
        if bytes.len() != self.elem_size {
            return Err(ConfigError::type_mismatch(format!(
                "packed element is {} bytes, expected {}",
                bytes.len(),
                self.elem_size
            )));
        }
        if i >= self.len() {
            return Err(ConfigError::not_found(format!("array index {}", i + 1)));
        }
        self.data[i * self.elem_size..(i + 1) * self.elem_size].copy_from_slice(bytes);
        Ok(())
    }

    /// Iterates the packed elements.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.elem_size.max(1))
    }
}

impl std::fmt::Debug for PackedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut l = f.debug_list();
        for elem in self.iter() {
            l.entry(&hex::encode(elem));
        }
        l.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RecordLayout;

    fn key_layout() -> RecordLayout {
        RecordLayout::new(&[("addr", ScalarKind::U32), ("port", ScalarKind::U16)]).unwrap()
    }

    fn val_layout() -> RecordLayout {
        RecordLayout::new(&[("counter", ScalarKind::U64)]).unwrap()
    }

    fn key(addr: u32, port: u16) -> PackedRecord {
        let mut fields = BTreeMap::new();
        fields.insert("addr".to_string(), Scalar::U32(addr));
        fields.insert("port".to_string(), Scalar::U16(port));
        PackedRecord::pack(&key_layout(), &fields).unwrap()
    }

    fn val(counter: u64) -> PackedRecord {
        let mut fields = BTreeMap::new();
        fields.insert("counter".to_string(), Scalar::U64(counter));
        PackedRecord::pack(&val_layout(), &fields).unwrap()
    }

    #[test]
    fn record_roundtrip() {
        let k = key(0x0a000001, 443);
        assert_eq!(k.as_bytes().len(), 6);
        let fields = k.unpack(&key_layout());
        assert_eq!(fields["addr"], Scalar::U32(0x0a000001));
        assert_eq!(fields["port"], Scalar::U16(443));
    }

    #[test]
    fn record_rejects_kind_mismatch() {
        let mut fields = BTreeMap::new();
        fields.insert("addr".to_string(), Scalar::Str("nope".into()));
        fields.insert("port".to_string(), Scalar::U16(1));
        assert!(matches!(
            PackedRecord::pack(&key_layout(), &fields),
            Err(ConfigError::TypeMismatch(_))
        ));
    }

    #[test]
    fn compact_table_add_update_remove() {
        let mut t = CompactTable::new(key_layout(), val_layout());
        t.add(key(1, 1), val(10)).unwrap();
        assert!(matches!(
            t.add(key(1, 1), val(11)),
            Err(ConfigError::DuplicateEntry(_))
        ));
        assert_eq!(t.lookup_ptr(&key(1, 1)), Some(&val(10)));
        t.update(&key(1, 1), val(11)).unwrap();
        assert_eq!(t.lookup_ptr(&key(1, 1)), Some(&val(11)));
        assert!(matches!(
            t.update(&key(2, 2), val(0)),
            Err(ConfigError::NotFound(_))
        ));
        t.remove(&key(1, 1)).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn packed_array_elements() {
        let shape = PackedShape::Scalar(ScalarKind::U32);
        let elems: Vec<Box<[u8]>> = (1u32..=4)
            .map(|v| pack_value(&shape, &Value::Scalar(Scalar::U32(v))).unwrap())
            .collect();
        let mut arr = PackedArray::from_elems(4, elems).unwrap();
        assert_eq!(arr.len(), 4);
        assert_eq!(
            unpack_value(&shape, arr.elem(2).unwrap()),
            Value::Scalar(Scalar::U32(3))
        );
        arr.write_elem(0, &9u32.to_le_bytes()).unwrap();
        assert_eq!(
            unpack_value(&shape, arr.elem(0).unwrap()),
            Value::Scalar(Scalar::U32(9))
        );
        assert!(arr.write_elem(4, &9u32.to_le_bytes()).is_err());
    }
}
