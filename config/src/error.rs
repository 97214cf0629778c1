use thiserror::Error;

/// Errors produced while parsing paths, resolving them against a schema, or
/// applying a mutation to a configuration.
///
/// Handlers match on these variants to decide what to report back to a
/// client; everything here is recoverable and leaves the configuration that
/// produced it untouched.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// The path names a node or entry the configuration does not contain.
    #[error("not found: {0}")]
    NotFound(String),
    /// The path shape does not fit the schema (a query where none is
    /// allowed, or a missing query where one is required).
    #[error("bad path: {0}")]
    BadPath(String),
    /// A payload does not parse under the sub-grammar it is addressed to.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// An add would insert a key that is already present.
    #[error("already existing entry: {0}")]
    DuplicateEntry(String),
    /// A query segment was applied to a scalar or struct node.
    #[error("query on non-collection node: {0}")]
    QueryOnScalar(String),
    /// A query names a field that is not part of the key tuple, or omits
    /// one that is.
    #[error("missing key field: {0}")]
    MissingKeyField(String),
    /// The path text itself is malformed.
    #[error("invalid path syntax: {0}")]
    PathSyntax(String),
    /// The named schema is not registered.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),
}

impl ConfigError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub(crate) fn bad_path(what: impl Into<String>) -> Self {
        Self::BadPath(what.into())
    }

    pub(crate) fn type_mismatch(what: impl Into<String>) -> Self {
        Self::TypeMismatch(what.into())
    }
}
