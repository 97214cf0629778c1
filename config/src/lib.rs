//! # Schema-directed configuration for weir
//!
//! ## Grammar
//! A configuration is a tree-structured [`Value`] conforming to a
//! [`Grammar`]. Grammar nodes are scalars, structs, arrays and tables.
//! Tables carry a key tuple plus storage hints, which select one of four
//! first-class storage variants:
//!
//! - **compact**: packed key records mapping to packed value records in a
//!   hash table
//! - **string-keyed**: a single string key field projected to the map key
//! - **keyed-packed**: packed key records mapping to arbitrary values
//! - **generic**: structural keys in an association list
//!
//! Arrays split the same way into packed buffers of fixed-size elements
//! (grown by reallocation) and ordinary ordered sequences (grown in
//! place). The split is not cosmetic: the dataplane side relies on the
//! packed representations staying packed across every mutation, so the
//! parser picks the variant from the grammar and the mutators preserve it.
//!
//! ## Paths
//! A [`Path`] addresses a node: segments name struct children, and query
//! segments (`[key=literal]`, `[position()=N]`) select into tables and
//! arrays. [`resolve`] validates a path against a grammar and compiles it
//! into traversal steps.
//!
//! ## Mutators
//! [`get_config`], [`set_config`], [`add_config`] and [`remove_config`]
//! implement the path-directed operations. `add` is all-or-nothing: keys
//! are validated against the table in a first pass and inserted in a
//! second, so a duplicate anywhere leaves the table untouched. Mutations
//! that land inside packed storage unpack the record, edit the scratch
//! value and repack, keeping the stored layout canonical.
//!
//! ## Text form
//! The printed representation is JSON, produced and consumed strictly
//! under the grammar. Printing is canonical (sorted object keys, table
//! entries ordered by key) so that printed configurations compare
//! byte-for-byte.
#![warn(missing_docs)]

mod error;
mod mutator;
mod path;
#[cfg(test)]
mod props;
mod registry;
mod schema;
mod table;
mod text;
mod value;

pub use crate::error::ConfigError;
pub use crate::mutator::{
    add_config, get_at, get_config, remove_config, resolve, set_config, Resolved, Step, TableKey,
};
pub use crate::path::{normalize_path, Path, PathSegment, POSITION};
pub use crate::registry::Registry;
pub use crate::schema::{
    normalize_id, packed_layout_of, FieldLayout, Grammar, PackedShape, RecordLayout, ScalarKind,
    Schema, TableGrammar, TableVariant,
};
pub use crate::table::{
    pack_record, pack_value, unpack_record, unpack_value, CompactTable, PackedArray, PackedRecord,
};
pub use crate::text::{from_json, parse_value, print_value, to_json};
pub use crate::value::{ArrayValue, Scalar, TableValue, Value};
