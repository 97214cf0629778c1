//! Grammar-directed conversion between configuration values and their
//! printed (JSON) text form. Parsing is strict: the text must fit the
//! sub-grammar it is addressed to, and the storage variant of every
//! collection is dictated by the grammar, never by the text.

use crate::error::ConfigError;
use crate::schema::{normalize_id, packed_layout_of, Grammar, ScalarKind, TableGrammar, TableVariant};
use crate::table::{pack_record, pack_value, unpack_record, unpack_value, CompactTable, PackedArray};
use crate::value::{ArrayValue, Scalar, TableValue, Value};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Largest integer JSON readers agree on; bigger u64s print as strings.
const JSON_SAFE_MAX: u64 = 1 << 53;

/// Parses text under a grammar.
pub fn parse_value(grammar: &Grammar, text: &str) -> Result<Value, ConfigError> {
    let json: Json = serde_json::from_str(text)
        .map_err(|err| ConfigError::type_mismatch(format!("invalid payload: {err}")))?;
    from_json(grammar, &json)
}

/// Prints a value under a grammar. The output is canonical: object keys
/// sorted, table entries ordered by key.
pub fn print_value(grammar: &Grammar, value: &Value) -> Result<String, ConfigError> {
    Ok(to_json(grammar, value)?.to_string())
}

fn scalar_from_json(kind: ScalarKind, json: &Json) -> Result<Scalar, ConfigError> {
    let err = || ConfigError::type_mismatch(format!("{json} is not a {kind:?}"));
    if let Json::String(s) = json {
        if kind != ScalarKind::Bool {
            return Scalar::parse(kind, s);
        }
    }
    Ok(match kind {
        ScalarKind::Bool => Scalar::Bool(json.as_bool().ok_or_else(err)?),
        ScalarKind::U8 => {
            Scalar::U8(u8::try_from(json.as_u64().ok_or_else(err)?).map_err(|_| err())?)
        }
        ScalarKind::U16 => {
            Scalar::U16(u16::try_from(json.as_u64().ok_or_else(err)?).map_err(|_| err())?)
        }
        ScalarKind::U32 => {
            Scalar::U32(u32::try_from(json.as_u64().ok_or_else(err)?).map_err(|_| err())?)
        }
        ScalarKind::U64 => Scalar::U64(json.as_u64().ok_or_else(err)?),
        ScalarKind::I64 => Scalar::I64(json.as_i64().ok_or_else(err)?),
        ScalarKind::Str => Scalar::Str(json.as_str().ok_or_else(err)?.to_string()),
    })
}

fn scalar_to_json(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::Bool(v) => Json::Bool(*v),
        Scalar::U8(v) => Json::from(*v),
        Scalar::U16(v) => Json::from(*v),
        Scalar::U32(v) => Json::from(*v),
        Scalar::U64(v) if *v > JSON_SAFE_MAX => Json::String(v.to_string()),
        Scalar::U64(v) => Json::from(*v),
        Scalar::I64(v) => Json::from(*v),
        Scalar::Str(v) => Json::String(v.clone()),
    }
}

/// Builds a value from parsed JSON under a grammar.
pub fn from_json(grammar: &Grammar, json: &Json) -> Result<Value, ConfigError> {
    match grammar {
        Grammar::Scalar(kind) => Ok(Value::Scalar(scalar_from_json(*kind, json)?)),
        Grammar::Struct(fields) => {
            let obj = json
                .as_object()
                .ok_or_else(|| ConfigError::type_mismatch(format!("{json} is not an object")))?;
            let mut out = BTreeMap::new();
            for (name, child_json) in obj {
                let name = normalize_id(name);
                let child = fields.get(&name).ok_or_else(|| {
                    ConfigError::type_mismatch(format!("unknown field {name}"))
                })?;
                out.insert(name, from_json(child, child_json)?);
            }
            Ok(Value::Struct(out))
        }
        Grammar::Array { elem, packed } => {
            let items = json
                .as_array()
                .ok_or_else(|| ConfigError::type_mismatch(format!("{json} is not an array")))?;
            if *packed {
                let shape = packed_layout_of(elem)
                    .expect("packed arrays have a packed element shape");
                let mut elems = Vec::with_capacity(items.len());
                for item in items {
                    elems.push(pack_value(&shape, &from_json(elem, item)?)?);
                }
                Ok(Value::Array(ArrayValue::Packed(PackedArray::from_elems(
                    shape.size(),
                    elems,
                )?)))
            } else {
                let mut elems = Vec::with_capacity(items.len());
                for item in items {
                    elems.push(from_json(elem, item)?);
                }
                Ok(Value::Array(ArrayValue::Generic(elems)))
            }
        }
        Grammar::Table(table) => table_from_json(table, json),
    }
}

fn entry_key_scalars(
    table: &TableGrammar,
    obj: &Map<String, Json>,
) -> Result<BTreeMap<String, Scalar>, ConfigError> {
    let mut scalars = BTreeMap::new();
    for (name, kind) in &table.keys {
        let json = lookup_field(obj, name)
            .ok_or_else(|| ConfigError::MissingKeyField(name.clone()))?;
        scalars.insert(name.clone(), scalar_from_json(*kind, json)?);
    }
    Ok(scalars)
}

fn lookup_field<'a>(obj: &'a Map<String, Json>, name: &str) -> Option<&'a Json> {
    obj.iter()
        .find(|(k, _)| normalize_id(k) == name)
        .map(|(_, v)| v)
}

fn entry_value_json(table: &TableGrammar, obj: &Map<String, Json>) -> Result<Json, ConfigError> {
    if matches!(&*table.value, Grammar::Struct(_)) {
        let mut rest = Map::new();
        for (name, json) in obj {
            let name = normalize_id(name);
            if table.keys.iter().any(|(k, _)| *k == name) {
                continue;
            }
            rest.insert(name, json.clone());
        }
        Ok(Json::Object(rest))
    } else {
        lookup_field(obj, "value")
            .cloned()
            .ok_or_else(|| ConfigError::type_mismatch("entry without value member".to_string()))
    }
}

fn table_from_json(table: &TableGrammar, json: &Json) -> Result<Value, ConfigError> {
    let items = json
        .as_array()
        .ok_or_else(|| ConfigError::type_mismatch(format!("{json} is not an entry list")))?;
    let mut out = match table.variant() {
        TableVariant::Compact => TableValue::Compact(CompactTable::new(
            table.key_layout.clone().expect("compact tables have a key layout"),
            table.value_layout.clone().expect("compact tables have a value layout"),
        )),
        TableVariant::StringKeyed => TableValue::StringKeyed(BTreeMap::new()),
        TableVariant::KeyedPacked => TableValue::KeyedPacked(BTreeMap::new()),
        TableVariant::Generic => TableValue::Generic(Vec::new()),
    };
    for item in items {
        let obj = item
            .as_object()
            .ok_or_else(|| ConfigError::type_mismatch(format!("{item} is not an entry")))?;
        let keys = entry_key_scalars(table, obj)?;
        let value = from_json(&table.value, &entry_value_json(table, obj)?)?;
        table_insert(table, &mut out, keys, value)?;
    }
    Ok(Value::Table(out))
}

pub(crate) fn table_insert(
    table: &TableGrammar,
    storage: &mut TableValue,
    keys: BTreeMap<String, Scalar>,
    value: Value,
) -> Result<(), ConfigError> {
    match storage {
        TableValue::Compact(t) => {
            let key = crate::table::PackedRecord::pack(
                table.key_layout.as_ref().expect("compact tables have a key layout"),
                &keys,
            )?;
            let value = pack_record(
                table.value_layout.as_ref().expect("compact tables have a value layout"),
                &value,
            )?;
            t.add(key, value)
        }
        TableValue::StringKeyed(m) => {
            let field = table.string_key.as_ref().expect("string-keyed tables have a key field");
            let key = match keys.get(field) {
                Some(Scalar::Str(s)) => s.clone(),
                _ => return Err(ConfigError::MissingKeyField(field.clone())),
            };
            if m.contains_key(&key) {
                return Err(ConfigError::DuplicateEntry(key));
            }
            m.insert(key, value);
            Ok(())
        }
        TableValue::KeyedPacked(m) => {
            let key = crate::table::PackedRecord::pack(
                table.key_layout.as_ref().expect("keyed-packed tables have a key layout"),
                &keys,
            )?;
            if m.contains_key(&key) {
                return Err(ConfigError::DuplicateEntry(format!("{key:?}")));
            }
            m.insert(key, value);
            Ok(())
        }
        TableValue::Generic(pairs) => {
            let key = Value::Struct(
                keys.into_iter()
                    .map(|(name, s)| (name, Value::Scalar(s)))
                    .collect(),
            );
            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(ConfigError::DuplicateEntry(format!("{key:?}")));
            }
            pairs.push((key, value));
            Ok(())
        }
    }
}

/// Renders a value as JSON under a grammar.
pub fn to_json(grammar: &Grammar, value: &Value) -> Result<Json, ConfigError> {
    match (grammar, value) {
        (Grammar::Scalar(kind), Value::Scalar(scalar)) => {
            if scalar.kind() != *kind {
                return Err(ConfigError::type_mismatch(format!(
                    "{scalar:?} under {kind:?} node"
                )));
            }
            Ok(scalar_to_json(scalar))
        }
        (Grammar::Struct(fields), Value::Struct(present)) => {
            let mut obj = Map::new();
            for (name, child) in present {
                let child_grammar = fields.get(name).ok_or_else(|| {
                    ConfigError::type_mismatch(format!("unknown field {name}"))
                })?;
                obj.insert(name.clone(), to_json(child_grammar, child)?);
            }
            Ok(Json::Object(obj))
        }
        (Grammar::Array { elem, .. }, Value::Array(array)) => {
            let mut items = Vec::new();
            match array {
                ArrayValue::Packed(packed) => {
                    let shape = packed_layout_of(elem)
                        .expect("packed arrays have a packed element shape");
                    for bytes in packed.iter() {
                        items.push(to_json(elem, &unpack_value(&shape, bytes))?);
                    }
                }
                ArrayValue::Generic(elems) => {
                    for v in elems {
                        items.push(to_json(elem, v)?);
                    }
                }
            }
            Ok(Json::Array(items))
        }
        (Grammar::Table(table), Value::Table(storage)) => table_to_json(table, storage),
        _ => Err(ConfigError::type_mismatch(
            "value does not match its grammar".to_string(),
        )),
    }
}

fn entry_to_json(
    table: &TableGrammar,
    keys: BTreeMap<String, Scalar>,
    value: &Value,
) -> Result<Json, ConfigError> {
    let mut obj = Map::new();
    for (name, scalar) in &keys {
        obj.insert(name.clone(), scalar_to_json(scalar));
    }
    if matches!(&*table.value, Grammar::Struct(_)) {
        let inner = to_json(&table.value, value)?;
        for (name, json) in inner.as_object().expect("struct values print as objects") {
            if obj.contains_key(name) {
                return Err(ConfigError::type_mismatch(format!(
                    "value field {name} shadows a key field"
                )));
            }
            obj.insert(name.clone(), json.clone());
        }
    } else {
        obj.insert("value".to_string(), to_json(&table.value, value)?);
    }
    Ok(Json::Object(obj))
}

fn table_to_json(table: &TableGrammar, storage: &TableValue) -> Result<Json, ConfigError> {
    let mut items = Vec::new();
    match storage {
        TableValue::Compact(t) => {
            let key_layout = t.key_layout().clone();
            let value_layout = t.value_layout().clone();
            let mut entries: Vec<_> = t.iterate().collect();
            entries.sort_by_key(|(k, _)| k.as_bytes().to_vec());
            for (key, value) in entries {
                let keys = key.unpack(&key_layout);
                let value = unpack_record(&value_layout, value);
                items.push(entry_to_json(table, keys, &value)?);
            }
        }
        TableValue::StringKeyed(m) => {
            let field = table.string_key.as_ref().expect("string-keyed tables have a key field");
            for (key, value) in m {
                let mut keys = BTreeMap::new();
                keys.insert(field.clone(), Scalar::Str(key.clone()));
                items.push(entry_to_json(table, keys, value)?);
            }
        }
        TableValue::KeyedPacked(m) => {
            let key_layout = table.key_layout.as_ref().expect("keyed-packed tables have a key layout");
            for (key, value) in m {
                items.push(entry_to_json(table, key.unpack(key_layout), value)?);
            }
        }
        TableValue::Generic(pairs) => {
            let mut rendered = Vec::new();
            for (key, value) in pairs {
                let keys = match key {
                    Value::Struct(fields) => fields
                        .iter()
                        .map(|(name, v)| match v {
                            Value::Scalar(s) => Ok((name.clone(), s.clone())),
                            _ => Err(ConfigError::type_mismatch(format!(
                                "non-scalar key field {name}"
                            ))),
                        })
                        .collect::<Result<BTreeMap<_, _>, _>>()?,
                    _ => {
                        return Err(ConfigError::type_mismatch(
                            "generic table key is not a struct".to_string(),
                        ))
                    }
                };
                rendered.push(entry_to_json(table, keys, value)?);
            }
            rendered.sort_by_key(|json| json.to_string());
            items = rendered;
        }
    }
    Ok(Json::Array(items))
}
