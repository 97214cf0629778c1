use crate::schema::Schema;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;

/// Schema registry. The schema-loading frontend registers grammars by name;
/// leaders resolve their `schema_name` here.
#[derive(Default)]
pub struct Registry {
    schemas: RwLock<BTreeMap<String, Arc<Schema>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Registers a schema, replacing any previous registration of the same
    /// name.
    pub fn register(&self, schema: Arc<Schema>) {
        tracing::debug!("registering schema {}", schema.name());
        self.schemas
            .write()
            .insert(schema.name().to_string(), schema);
    }

    /// Returns the schema registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(name).cloned()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.read().contains_key(name)
    }
}
