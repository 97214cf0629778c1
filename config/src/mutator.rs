//! Path-directed configuration operations.
//!
//! `resolve` checks a parsed path against a grammar and compiles it into a
//! step list; the operation entry points walk the steps with call-time
//! dispatch over the node kind and storage variant. Mutations reach through
//! packed boundaries by unpacking the record, editing the temporary and
//! repacking on the way out, so the stored representation of every node is
//! preserved.

use crate::error::ConfigError;
use crate::path::{Path, PathSegment, POSITION};
use crate::schema::{packed_layout_of, Grammar, Schema, TableGrammar};
use crate::table::{pack_record, pack_value, unpack_record, unpack_value, PackedArray, PackedRecord};
use crate::text::{parse_value, print_value};
use crate::value::{ArrayValue, Scalar, TableValue, Value};
use std::collections::BTreeMap;

/// A table entry selector, projected from a query per storage variant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TableKey {
    /// Packed key record (compact and keyed-packed variants).
    Record(PackedRecord),
    /// Projected string key (string-keyed variant).
    Str(String),
    /// Structural key (generic variant).
    Structural(Value),
}

/// One compiled traversal step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Step {
    /// Descend into a struct child.
    Child(String),
    /// Descend into an array element (0-based).
    Index(usize),
    /// Descend into a table entry.
    Key(TableKey),
}

/// A path resolved against a grammar: the steps to walk and the grammar of
/// the node they land on.
#[derive(Clone, Debug)]
pub struct Resolved<'g> {
    /// Traversal steps from the root.
    pub steps: Vec<Step>,
    /// Grammar of the addressed node.
    pub grammar: &'g Grammar,
}

fn storage_mismatch() -> ConfigError {
    ConfigError::type_mismatch("storage does not match grammar".to_string())
}

fn parse_position(seg: &PathSegment) -> Result<usize, ConfigError> {
    match seg.query.as_slice() {
        [(key, literal)] if key == POSITION => {
            let n: usize = literal
                .parse()
                .map_err(|_| ConfigError::bad_path(format!("array index {literal:?}")))?;
            if n == 0 {
                return Err(ConfigError::bad_path("array indices are 1-based".to_string()));
            }
            Ok(n - 1)
        }
        [(key, _)] => Err(ConfigError::MissingKeyField(key.clone())),
        _ => Err(ConfigError::bad_path(format!(
            "array {} takes a single position query",
            seg.name
        ))),
    }
}

fn table_key(table: &TableGrammar, seg: &PathSegment) -> Result<TableKey, ConfigError> {
    let mut scalars = BTreeMap::new();
    for (key, literal) in &seg.query {
        let kind = table
            .key_kind(key)
            .ok_or_else(|| ConfigError::MissingKeyField(key.clone()))?;
        scalars.insert(key.clone(), Scalar::parse(kind, literal)?);
    }
    for (name, _) in &table.keys {
        if !scalars.contains_key(name) {
            return Err(ConfigError::MissingKeyField(name.clone()));
        }
    }
    Ok(match (&table.key_layout, &table.string_key) {
        (Some(layout), None) => TableKey::Record(PackedRecord::pack(layout, &scalars)?),
        (_, Some(field)) => match scalars.remove(field) {
            Some(Scalar::Str(s)) => TableKey::Str(s),
            _ => return Err(ConfigError::MissingKeyField(field.clone())),
        },
        (None, None) => TableKey::Structural(Value::Struct(
            scalars
                .into_iter()
                .map(|(name, s)| (name, Value::Scalar(s)))
                .collect(),
        )),
    })
}

/// Resolves a path against a grammar, validating query placement and key
/// fields along the way.
pub fn resolve<'g>(grammar: &'g Grammar, path: &Path) -> Result<Resolved<'g>, ConfigError> {
    let mut steps = Vec::new();
    let mut cur = grammar;
    for seg in path.segments() {
        let child = cur
            .child(&seg.name)
            .ok_or_else(|| ConfigError::not_found(format!("no such node: {}", seg.name)))?;
        steps.push(Step::Child(seg.name.clone()));
        cur = child;
        if seg.has_query() {
            match cur {
                Grammar::Array { elem, .. } => {
                    steps.push(Step::Index(parse_position(seg)?));
                    cur = elem;
                }
                Grammar::Table(table) => {
                    steps.push(Step::Key(table_key(table, seg)?));
                    cur = &table.value;
                }
                _ => return Err(ConfigError::QueryOnScalar(seg.name.clone())),
            }
        }
    }
    Ok(Resolved {
        steps,
        grammar: cur,
    })
}

fn generic_find<'a>(pairs: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Reads the sub-value the steps address, unpacking through packed storage
/// as needed. Returns an owned copy.
pub fn get_at(grammar: &Grammar, value: &Value, steps: &[Step]) -> Result<Value, ConfigError> {
    let (step, rest) = match steps.split_first() {
        None => return Ok(value.clone()),
        Some(split) => split,
    };
    match step {
        Step::Child(name) => {
            let child_grammar = grammar
                .child(name)
                .ok_or_else(|| ConfigError::not_found(format!("no such node: {name}")))?;
            let child = value
                .as_struct()
                .and_then(|fields| fields.get(name))
                .ok_or_else(|| ConfigError::not_found(format!("no such node: {name}")))?;
            get_at(child_grammar, child, rest)
        }
        Step::Index(i) => match (grammar, value) {
            (Grammar::Array { elem, .. }, Value::Array(ArrayValue::Packed(arr))) => {
                let shape = packed_layout_of(elem).ok_or_else(storage_mismatch)?;
                let bytes = arr
                    .elem(*i)
                    .ok_or_else(|| ConfigError::not_found(format!("array index {}", i + 1)))?;
                get_at(elem, &unpack_value(&shape, bytes), rest)
            }
            (Grammar::Array { elem, .. }, Value::Array(ArrayValue::Generic(elems))) => {
                let child = elems
                    .get(*i)
                    .ok_or_else(|| ConfigError::not_found(format!("array index {}", i + 1)))?;
                get_at(elem, child, rest)
            }
            _ => Err(storage_mismatch()),
        },
        Step::Key(key) => match (grammar, value) {
            (Grammar::Table(table), Value::Table(storage)) => match (storage, key) {
                (TableValue::Compact(t), TableKey::Record(rec)) => {
                    let packed = t
                        .lookup_ptr(rec)
                        .ok_or_else(|| ConfigError::not_found(format!("{rec:?}")))?;
                    get_at(&table.value, &unpack_record(t.value_layout(), packed), rest)
                }
                (TableValue::StringKeyed(m), TableKey::Str(s)) => {
                    let child = m
                        .get(s)
                        .ok_or_else(|| ConfigError::not_found(s.clone()))?;
                    get_at(&table.value, child, rest)
                }
                (TableValue::KeyedPacked(m), TableKey::Record(rec)) => {
                    let child = m
                        .get(rec)
                        .ok_or_else(|| ConfigError::not_found(format!("{rec:?}")))?;
                    get_at(&table.value, child, rest)
                }
                (TableValue::Generic(pairs), TableKey::Structural(k)) => {
                    let child = generic_find(pairs, k)
                        .ok_or_else(|| ConfigError::not_found(format!("{k:?}")))?;
                    get_at(&table.value, child, rest)
                }
                _ => Err(storage_mismatch()),
            },
            _ => Err(storage_mismatch()),
        },
    }
}

/// Runs `f` on the node the steps address, with mutable access. Packed
/// records along the way are unpacked into a scratch value and repacked
/// after `f` returns, so edits inside packed storage stick.
fn with_node<R>(
    grammar: &Grammar,
    value: &mut Value,
    steps: &[Step],
    f: impl FnOnce(&Grammar, &mut Value) -> Result<R, ConfigError>,
) -> Result<R, ConfigError> {
    let (step, rest) = match steps.split_first() {
        None => return f(grammar, value),
        Some(split) => split,
    };
    match step {
        Step::Child(name) => {
            let child_grammar = grammar
                .child(name)
                .ok_or_else(|| ConfigError::not_found(format!("no such node: {name}")))?;
            let child = match value {
                Value::Struct(fields) => fields
                    .get_mut(name)
                    .ok_or_else(|| ConfigError::not_found(format!("no such node: {name}")))?,
                _ => return Err(storage_mismatch()),
            };
            with_node(child_grammar, child, rest, f)
        }
        Step::Index(i) => match (grammar, value) {
            (Grammar::Array { elem, .. }, Value::Array(ArrayValue::Packed(arr))) => {
                let shape = packed_layout_of(elem).ok_or_else(storage_mismatch)?;
                let bytes = arr
                    .elem(*i)
                    .ok_or_else(|| ConfigError::not_found(format!("array index {}", i + 1)))?;
                let mut scratch = unpack_value(&shape, bytes);
                let out = with_node(elem, &mut scratch, rest, f)?;
                arr.write_elem(*i, &pack_value(&shape, &scratch)?)?;
                Ok(out)
            }
            (Grammar::Array { elem, .. }, Value::Array(ArrayValue::Generic(elems))) => {
                let child = elems
                    .get_mut(*i)
                    .ok_or_else(|| ConfigError::not_found(format!("array index {}", i + 1)))?;
                with_node(elem, child, rest, f)
            }
            _ => Err(storage_mismatch()),
        },
        Step::Key(key) => match (grammar, value) {
            (Grammar::Table(table), Value::Table(storage)) => match (storage, key) {
                (TableValue::Compact(t), TableKey::Record(rec)) => {
                    let packed = t
                        .lookup_ptr(rec)
                        .cloned()
                        .ok_or_else(|| ConfigError::not_found(format!("{rec:?}")))?;
                    let value_layout = t.value_layout().clone();
                    let mut scratch = unpack_record(&value_layout, &packed);
                    let out = with_node(&table.value, &mut scratch, rest, f)?;
                    t.update(rec, pack_record(&value_layout, &scratch)?)?;
                    Ok(out)
                }
                (TableValue::StringKeyed(m), TableKey::Str(s)) => {
                    let child = m
                        .get_mut(s)
                        .ok_or_else(|| ConfigError::not_found(s.clone()))?;
                    with_node(&table.value, child, rest, f)
                }
                (TableValue::KeyedPacked(m), TableKey::Record(rec)) => {
                    let child = m
                        .get_mut(rec)
                        .ok_or_else(|| ConfigError::not_found(format!("{rec:?}")))?;
                    with_node(&table.value, child, rest, f)
                }
                (TableValue::Generic(pairs), TableKey::Structural(k)) => {
                    let child = pairs
                        .iter_mut()
                        .find(|(pk, _)| pk == k)
                        .map(|(_, v)| v)
                        .ok_or_else(|| ConfigError::not_found(format!("{k:?}")))?;
                    with_node(&table.value, child, rest, f)
                }
                _ => Err(storage_mismatch()),
            },
            _ => Err(storage_mismatch()),
        },
    }
}

/// `get`: prints the sub-value at `path`.
pub fn get_config(schema: &Schema, path: &Path, config: &Value) -> Result<String, ConfigError> {
    let resolved = resolve(schema.grammar(), path)?;
    let sub = get_at(schema.grammar(), config, &resolved.steps)?;
    print_value(resolved.grammar, &sub)
}

/// `set`: parses the payload under the sub-grammar at `path` and overwrites
/// the addressed slot.
pub fn set_config(
    schema: &Schema,
    path: &Path,
    config: &mut Value,
    payload: &str,
) -> Result<(), ConfigError> {
    let resolved = resolve(schema.grammar(), path)?;
    let new = parse_value(resolved.grammar, payload)?;
    let steps = resolved.steps;
    if steps.is_empty() {
        *config = new;
        return Ok(());
    }
    let (parent, last) = steps.split_at(steps.len() - 1);
    match &last[0] {
        Step::Child(name) => {
            let name = name.clone();
            with_node(schema.grammar(), config, parent, move |_, node| match node {
                Value::Struct(fields) => {
                    fields.insert(name, new);
                    Ok(())
                }
                _ => Err(storage_mismatch()),
            })
        }
        Step::Index(i) => {
            let i = *i;
            with_node(schema.grammar(), config, parent, move |grammar, node| {
                match (grammar, node) {
                    (Grammar::Array { elem, .. }, Value::Array(ArrayValue::Packed(arr))) => {
                        let shape = packed_layout_of(elem).ok_or_else(storage_mismatch)?;
                        arr.write_elem(i, &pack_value(&shape, &new)?)
                    }
                    (_, Value::Array(ArrayValue::Generic(elems))) => {
                        let slot = elems.get_mut(i).ok_or_else(|| {
                            ConfigError::not_found(format!("array index {}", i + 1))
                        })?;
                        *slot = new;
                        Ok(())
                    }
                    _ => Err(storage_mismatch()),
                }
            })
        }
        Step::Key(key) => {
            let key = key.clone();
            with_node(schema.grammar(), config, parent, move |_, node| {
                let storage = match node {
                    Value::Table(storage) => storage,
                    _ => return Err(storage_mismatch()),
                };
                match (storage, key) {
                    (TableValue::Compact(t), TableKey::Record(rec)) => {
                        let value_layout = t.value_layout().clone();
                        t.update(&rec, pack_record(&value_layout, &new)?)
                    }
                    (TableValue::StringKeyed(m), TableKey::Str(s)) => {
                        let slot = m
                            .get_mut(&s)
                            .ok_or_else(|| ConfigError::not_found(s.clone()))?;
                        *slot = new;
                        Ok(())
                    }
                    (TableValue::KeyedPacked(m), TableKey::Record(rec)) => {
                        let slot = m
                            .get_mut(&rec)
                            .ok_or_else(|| ConfigError::not_found(format!("{rec:?}")))?;
                        *slot = new;
                        Ok(())
                    }
                    (TableValue::Generic(pairs), TableKey::Structural(k)) => {
                        let slot = pairs
                            .iter_mut()
                            .find(|(pk, _)| *pk == k)
                            .map(|(_, v)| v)
                            .ok_or_else(|| ConfigError::not_found(format!("{k:?}")))?;
                        *slot = new;
                        Ok(())
                    }
                    _ => Err(storage_mismatch()),
                }
            })
        }
    }
}

/// `add`: parses the payload as a collection under the grammar at `path`
/// and merges it in, all-or-nothing.
pub fn add_config(
    schema: &Schema,
    path: &Path,
    config: &mut Value,
    payload: &str,
) -> Result<(), ConfigError> {
    let resolved = resolve(schema.grammar(), path)?;
    match resolved.grammar {
        Grammar::Array { .. } | Grammar::Table(_) => {}
        _ => {
            return Err(ConfigError::bad_path(format!(
                "add needs a collection at {path}"
            )))
        }
    }
    let new = parse_value(resolved.grammar, payload)?;
    with_node(schema.grammar(), config, &resolved.steps, move |grammar, node| {
        match (grammar, node, new) {
            (_, Value::Array(ArrayValue::Packed(arr)), Value::Array(ArrayValue::Packed(more))) => {
                // Packed buffers are not resizable in place: build the
                // grown copy, then reinstall it over the old one.
                let elems: Vec<Box<[u8]>> = arr
                    .iter()
                    .chain(more.iter())
                    .map(|bytes| bytes.to_vec().into_boxed_slice())
                    .collect();
                *arr = PackedArray::from_elems(arr.elem_size(), elems)?;
                Ok(())
            }
            (_, Value::Array(ArrayValue::Generic(elems)), Value::Array(ArrayValue::Generic(more))) => {
                elems.extend(more);
                Ok(())
            }
            (Grammar::Table(_), Value::Table(storage), Value::Table(incoming)) => {
                table_add(storage, incoming)
            }
            _ => Err(storage_mismatch()),
        }
    })
}

/// Two-pass merge: verify no incoming key exists, then insert them all.
fn table_add(storage: &mut TableValue, incoming: TableValue) -> Result<(), ConfigError> {
    match (storage, incoming) {
        (TableValue::Compact(t), TableValue::Compact(more)) => {
            for (key, _) in more.iterate() {
                if t.lookup_ptr(key).is_some() {
                    return Err(ConfigError::DuplicateEntry(format!("{key:?}")));
                }
            }
            for (key, value) in more.iterate() {
                t.add(key.clone(), value.clone())?;
            }
            Ok(())
        }
        (TableValue::StringKeyed(m), TableValue::StringKeyed(more)) => {
            for key in more.keys() {
                if m.contains_key(key) {
                    return Err(ConfigError::DuplicateEntry(key.clone()));
                }
            }
            m.extend(more);
            Ok(())
        }
        (TableValue::KeyedPacked(m), TableValue::KeyedPacked(more)) => {
            for key in more.keys() {
                if m.contains_key(key) {
                    return Err(ConfigError::DuplicateEntry(format!("{key:?}")));
                }
            }
            m.extend(more);
            Ok(())
        }
        (TableValue::Generic(pairs), TableValue::Generic(more)) => {
            for (key, _) in &more {
                if generic_find(pairs, key).is_some() {
                    return Err(ConfigError::DuplicateEntry(format!("{key:?}")));
                }
            }
            pairs.extend(more);
            Ok(())
        }
        _ => Err(storage_mismatch()),
    }
}

/// `remove`: deletes the entry or element the path's final query selects.
pub fn remove_config(
    schema: &Schema,
    path: &Path,
    config: &mut Value,
) -> Result<(), ConfigError> {
    let resolved = resolve(schema.grammar(), path)?;
    let steps = resolved.steps;
    let (parent, last) = match steps.split_last() {
        Some((last @ (Step::Index(_) | Step::Key(_)), parent)) => (parent, last.clone()),
        _ => {
            return Err(ConfigError::bad_path(format!(
                "remove needs a query at the end of {path}"
            )))
        }
    };
    with_node(schema.grammar(), config, parent, move |_, node| {
        match (node, last) {
            (Value::Array(ArrayValue::Packed(arr)), Step::Index(idx)) => {
                if idx >= arr.len() {
                    return Err(ConfigError::not_found(format!("array index {}", idx + 1)));
                }
                let elems: Vec<Box<[u8]>> = arr
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != idx)
                    .map(|(_, bytes)| bytes.to_vec().into_boxed_slice())
                    .collect();
                *arr = PackedArray::from_elems(arr.elem_size(), elems)?;
                Ok(())
            }
            (Value::Array(ArrayValue::Generic(elems)), Step::Index(idx)) => {
                if idx >= elems.len() {
                    return Err(ConfigError::not_found(format!("array index {}", idx + 1)));
                }
                elems.remove(idx);
                Ok(())
            }
            (Value::Table(TableValue::Compact(t)), Step::Key(TableKey::Record(rec))) => {
                t.remove(&rec).map(|_| ())
            }
            (Value::Table(TableValue::StringKeyed(m)), Step::Key(TableKey::Str(s))) => m
                .remove(&s)
                .map(|_| ())
                .ok_or_else(|| ConfigError::not_found(s.clone())),
            (Value::Table(TableValue::KeyedPacked(m)), Step::Key(TableKey::Record(rec))) => m
                .remove(&rec)
                .map(|_| ())
                .ok_or_else(|| ConfigError::not_found(format!("{rec:?}"))),
            (Value::Table(TableValue::Generic(pairs)), Step::Key(TableKey::Structural(k))) => {
                let at = pairs
                    .iter()
                    .position(|(pk, _)| *pk == k)
                    .ok_or_else(|| ConfigError::not_found(format!("{k:?}")))?;
                pairs.remove(at);
                Ok(())
            }
            _ => Err(storage_mismatch()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ScalarKind, Schema};
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Schema::new(
            "test-dataplane",
            Grammar::strukt(vec![
                ("mtu", Grammar::Scalar(ScalarKind::U32)),
                (
                    "route",
                    Grammar::table(
                        vec![("dst", ScalarKind::U32), ("len", ScalarKind::U8)],
                        Grammar::strukt(vec![("next_hop", Grammar::Scalar(ScalarKind::U32))]),
                    ),
                ),
                (
                    "interface",
                    Grammar::table(
                        vec![("name", ScalarKind::Str)],
                        Grammar::strukt(vec![
                            ("mtu", Grammar::Scalar(ScalarKind::U32)),
                            ("description", Grammar::Scalar(ScalarKind::Str)),
                        ]),
                    ),
                ),
                ("weights", Grammar::array(Grammar::Scalar(ScalarKind::U32))),
                ("names", Grammar::array(Grammar::Scalar(ScalarKind::Str))),
            ]),
        )
    }

    fn initial() -> Value {
        parse_value(
            schema().grammar(),
            r#"{
                "mtu": 1500,
                "route": [{"dst": 1, "len": 8, "next_hop": 7}],
                "interface": [{"name": "eth0", "mtu": 1500, "description": "uplink"}],
                "weights": [10, 20, 30, 40],
                "names": ["a", "b"]
            }"#,
        )
        .unwrap()
    }

    fn get(config: &Value, path: &str) -> Result<String, ConfigError> {
        get_config(&schema(), &Path::parse(path).unwrap(), config)
    }

    fn set(config: &mut Value, path: &str, payload: &str) -> Result<(), ConfigError> {
        set_config(&schema(), &Path::parse(path).unwrap(), config, payload)
    }

    fn add(config: &mut Value, path: &str, payload: &str) -> Result<(), ConfigError> {
        add_config(&schema(), &Path::parse(path).unwrap(), config, payload)
    }

    fn remove(config: &mut Value, path: &str) -> Result<(), ConfigError> {
        remove_config(&schema(), &Path::parse(path).unwrap(), config)
    }

    #[test]
    fn get_struct_child() {
        assert_eq!(get(&initial(), "/mtu").unwrap(), "1500");
    }

    #[test]
    fn get_set_roundtrip_on_compact_entry() {
        let mut config = initial();
        set(&mut config, "/route[dst=1][len=8]", r#"{"next_hop": 9}"#).unwrap();
        assert_eq!(
            get(&config, "/route[dst=1][len=8]").unwrap(),
            r#"{"next_hop":9}"#
        );
        set(&mut config, "/route[dst=1][len=8]/next_hop", "11").unwrap();
        assert_eq!(get(&config, "/route[dst=1][len=8]/next_hop").unwrap(), "11");
    }

    #[test]
    fn set_missing_table_key_fails() {
        let mut config = initial();
        let err = set(&mut config, "/route[dst=2][len=8]", r#"{"next_hop": 9}"#).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert_eq!(config, initial());
    }

    #[test]
    fn set_array_slot() {
        let mut config = initial();
        set(&mut config, "/weights[position()=2]", "99").unwrap();
        assert_eq!(get(&config, "/weights").unwrap(), "[10,99,30,40]");
        assert!(matches!(
            set(&mut config, "/weights[position()=5]", "1"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn set_root_replaces_everything() {
        let mut config = initial();
        set(
            &mut config,
            "/",
            r#"{"mtu": 9000, "route": [], "interface": [], "weights": [], "names": []}"#,
        )
        .unwrap();
        assert_eq!(get(&config, "/mtu").unwrap(), "9000");
        assert_eq!(get(&config, "/route").unwrap(), "[]");
    }

    #[test]
    fn add_to_compact_table_is_all_or_nothing() {
        let mut config = initial();
        let before = config.clone();
        // second incoming entry collides with the existing {1, 8}
        let err = add(
            &mut config,
            "/route",
            r#"[{"dst": 2, "len": 8, "next_hop": 1}, {"dst": 1, "len": 8, "next_hop": 1}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateEntry(_)));
        assert_eq!(config, before);

        add(
            &mut config,
            "/route",
            r#"[{"dst": 2, "len": 8, "next_hop": 1}, {"dst": 3, "len": 24, "next_hop": 1}]"#,
        )
        .unwrap();
        assert_eq!(
            get(&config, "/route[dst=3][len=24]/next_hop").unwrap(),
            "1"
        );
    }

    #[test]
    fn add_to_packed_array_reallocates() {
        let mut config = initial();
        add(&mut config, "/weights", "[50, 60]").unwrap();
        assert_eq!(get(&config, "/weights").unwrap(), "[10,20,30,40,50,60]");
    }

    #[test]
    fn add_to_scalar_is_bad_path() {
        let mut config = initial();
        assert!(matches!(
            add(&mut config, "/mtu", "[1]"),
            Err(ConfigError::BadPath(_))
        ));
    }

    #[test]
    fn remove_from_packed_array_copies_around_index() {
        let mut config = initial();
        remove(&mut config, "/weights[position()=2]").unwrap();
        assert_eq!(get(&config, "/weights").unwrap(), "[10,30,40]");
    }

    #[test]
    fn remove_needs_a_query() {
        let mut config = initial();
        assert!(matches!(
            remove(&mut config, "/weights"),
            Err(ConfigError::BadPath(_))
        ));
    }

    #[test]
    fn remove_string_keyed_entry() {
        let mut config = initial();
        remove(&mut config, "/interface[name=eth0]").unwrap();
        assert_eq!(get(&config, "/interface").unwrap(), "[]");
        assert!(matches!(
            remove(&mut config, "/interface[name=eth0]"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn query_on_scalar_rejected() {
        let config = initial();
        assert!(matches!(
            get(&config, "/mtu[position()=1]"),
            Err(ConfigError::QueryOnScalar(_))
        ));
    }

    #[test]
    fn partial_table_key_rejected() {
        let config = initial();
        assert!(matches!(
            get(&config, "/route[dst=1]"),
            Err(ConfigError::MissingKeyField(_))
        ));
        assert!(matches!(
            get(&config, "/route[dst=1][len=8][bogus=1]"),
            Err(ConfigError::MissingKeyField(_))
        ));
    }

    #[test]
    fn generic_array_in_place_ops() {
        let mut config = initial();
        add(&mut config, "/names", r#"["c"]"#).unwrap();
        assert_eq!(get(&config, "/names").unwrap(), r#"["a","b","c"]"#);
        remove(&mut config, "/names[position()=1]").unwrap();
        assert_eq!(get(&config, "/names").unwrap(), r#"["b","c"]"#);
        set(&mut config, "/names[position()=1]", r#""z""#).unwrap();
        assert_eq!(get(&config, "/names").unwrap(), r#"["z","c"]"#);
    }

    use crate::props::*;
    use proptest::prelude::*;

    fn empty_config() -> Value {
        parse_value(
            schema().grammar(),
            r#"{"mtu":1500,"route":[],"interface":[],"weights":[],"names":[]}"#,
        )
        .unwrap()
    }

    proptest! {
        #[test]
        fn set_get_roundtrip(routes in arb_routes(), next_hop in any::<u32>()) {
            prop_assume!(!routes.is_empty());
            let mut config = empty_config();
            add(&mut config, "/route", &routes_payload(&routes)).unwrap();
            let (dst, len) = *routes.keys().next().unwrap();
            let path = format!("/route[dst={dst}][len={len}]/next_hop");
            set(&mut config, &path, &next_hop.to_string()).unwrap();
            prop_assert_eq!(get(&config, &path).unwrap(), next_hop.to_string());
        }

        #[test]
        fn disjoint_adds_commute(a in arb_routes(), b in arb_routes()) {
            let b: std::collections::BTreeMap<_, _> =
                b.into_iter().filter(|(k, _)| !a.contains_key(k)).collect();
            let mut ab = empty_config();
            add(&mut ab, "/route", &routes_payload(&a)).unwrap();
            add(&mut ab, "/route", &routes_payload(&b)).unwrap();
            let mut ba = empty_config();
            add(&mut ba, "/route", &routes_payload(&b)).unwrap();
            add(&mut ba, "/route", &routes_payload(&a)).unwrap();
            prop_assert_eq!(&ab, &ba);
            prop_assert_eq!(
                get(&ab, "/route").unwrap(),
                get(&ba, "/route").unwrap()
            );
        }

        #[test]
        fn add_then_remove_restores(initial in arb_routes(), added in arb_routes()) {
            let added: std::collections::BTreeMap<_, _> = added
                .into_iter()
                .filter(|(k, _)| !initial.contains_key(k))
                .collect();
            let mut config = empty_config();
            add(&mut config, "/route", &routes_payload(&initial)).unwrap();
            let before = config.clone();
            add(&mut config, "/route", &routes_payload(&added)).unwrap();
            for (dst, len) in added.keys() {
                remove(&mut config, &format!("/route[dst={dst}][len={len}]")).unwrap();
            }
            prop_assert_eq!(&config, &before);
        }

        #[test]
        fn packed_array_set_preserves_length(weights in arb_weights(), v in any::<u32>()) {
            prop_assume!(!weights.is_empty());
            let mut config = empty_config();
            let payload = format!(
                "[{}]",
                weights.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
            );
            add(&mut config, "/weights", &payload).unwrap();
            let slot = weights.len();
            set(&mut config, &format!("/weights[position()={slot}]"), &v.to_string()).unwrap();
            let printed = get(&config, "/weights").unwrap();
            let round: Vec<u32> = serde_json::from_str(&printed).unwrap();
            prop_assert_eq!(round.len(), weights.len());
            prop_assert_eq!(round[slot - 1], v);
        }
    }
}
