//! # Schema Registry
//!
//! The caller-owned store of named schemas and their compiled validators.
//!
//! ## Registration
//!
//! [`Registry::register`] takes a batch: a mapping from schema name to
//! rule. The batch is canonicalized, optionally checked against the
//! schema-of-schemas, compiled into a staging area, and self-tested
//! against its own `examples`. Only then is it published: links are bound,
//! new names and cache entries become visible, and the raw rules are kept
//! for later inheritance and reference lookups.
//!
//! A failed batch publishes nothing. Schemas registered earlier keep
//! working exactly as before.
//!
//! ## Validation
//!
//! [`Registry::get`] hands out a [`Validator`], a cheap handle onto the
//! name's link. Handles are `Send + Sync` and follow later redefinitions
//! of the name.
//!
//! Registration takes `&mut self`; callers registering from several
//! threads serialize through their own lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use coercer_core::{Options, SchemaId};

use crate::coerce::{Coercion, CoercionTable};
use crate::error::{SchemaError, ValidationError};
use crate::guard::{Link, Scope};
use crate::meta;
use crate::resolve::{Compiler, Staged};
use crate::rule::canonicalize;
use crate::selftest;
use crate::Context;

/// Label used in errors about the batch as a whole.
const BATCH: &str = "<batch>";

#[derive(Debug, Clone)]
struct SchemaEntry {
    rule: Value,
    options: Options,
}

/// Named schemas, their links, and the identity cache of compiled rules.
#[derive(Debug)]
pub struct Registry {
    options: Options,
    coercions: CoercionTable,
    schemas: HashMap<String, SchemaEntry>,
    names: HashMap<String, Arc<Link>>,
    cache: HashMap<SchemaId, Arc<Link>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry with default options and only built-in coercions.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// An empty registry with the given default options.
    pub fn with_options(options: Options) -> Self {
        Self::builder().options(options).build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Default options applied by [`Registry::register`].
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register a batch of schemas under the registry's default options.
    pub fn register(&mut self, schemas: &Value) -> Result<(), SchemaError> {
        let options = self.options.clone();
        self.register_with(schemas, &options)
    }

    /// Register a batch of schemas under `options`.
    ///
    /// Every schema in the batch may reference any other schema in the
    /// batch or already in the registry, by name, in any order. A name
    /// that is referenced but never defined fails only when a value
    /// actually reaches it.
    pub fn register_with(&mut self, schemas: &Value, options: &Options) -> Result<(), SchemaError> {
        let Value::Object(submitted) = schemas else {
            return Err(SchemaError::malformed(
                BATCH,
                "schemas must be a mapping of names to rules",
            ));
        };
        let batch: Map<String, Value> = submitted
            .iter()
            .map(|(name, rule)| {
                let rule = if options.load_as_jsonschema {
                    json!({"type": "dict", "items": rule})
                } else {
                    rule.clone()
                };
                (name.clone(), canonicalize(&rule))
            })
            .collect();

        match self.stage(&batch, options) {
            Ok(staged) => {
                self.publish(batch, options, staged);
                Ok(())
            }
            Err(err) => {
                warn!(schemas = submitted.len(), error = %err, "discarded schema batch");
                Err(err)
            }
        }
    }

    /// Register a single schema under the registry's default options.
    pub fn insert(&mut self, name: &str, rule: Value) -> Result<(), SchemaError> {
        let mut batch = Map::new();
        batch.insert(name.to_string(), rule);
        self.register(&Value::Object(batch))
    }

    /// A validator for a registered schema.
    pub fn get(&self, name: &str) -> Option<Validator> {
        if !self.schemas.contains_key(name) {
            return None;
        }
        self.names.get(name).map(|link| Validator {
            name: name.to_string(),
            link: Arc::clone(link),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Registered schema names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The canonical rule a schema was registered with.
    pub fn rule(&self, name: &str) -> Option<&Value> {
        self.schema_rule(name)
    }

    /// The options a schema was registered under.
    pub fn schema_options(&self, name: &str) -> Option<&Options> {
        self.schemas.get(name).map(|entry| &entry.options)
    }

    /// Number of distinct compiled rules.
    pub fn artifact_count(&self) -> usize {
        self.cache.len()
    }

    // ─── Compiler Access ─────────────────────────────────────────────

    pub(crate) fn schema_rule(&self, name: &str) -> Option<&Value> {
        self.schemas.get(name).map(|entry| &entry.rule)
    }

    pub(crate) fn name_link(&self, name: &str) -> Option<Arc<Link>> {
        self.names.get(name).cloned()
    }

    pub(crate) fn cached(&self, id: &SchemaId) -> Option<Arc<Link>> {
        self.cache.get(id).cloned()
    }

    pub(crate) fn coercions(&self) -> &CoercionTable {
        &self.coercions
    }

    // ─── Staging ─────────────────────────────────────────────────────

    fn stage(&self, batch: &Map<String, Value>, options: &Options) -> Result<Staged, SchemaError> {
        if options.validate_schemas {
            meta::check(batch)?;
        }
        let mut compiler = Compiler::new(self, batch, options);
        for (name, rule) in batch {
            compiler.compile_named(name, rule)?;
        }
        let (staged, examples) = compiler.finish()?;
        if options.validate_schemas {
            selftest::run(&examples, &staged.bindings)?;
        }
        Ok(staged)
    }

    fn publish(&mut self, batch: Map<String, Value>, options: &Options, staged: Staged) {
        let Staged {
            name_links,
            cache,
            bindings,
            bound,
        } = staged;
        for link in &bound {
            if let Some(program) = bindings.get(&link.id()) {
                link.bind(Arc::clone(program));
            }
        }
        let compiled = cache.len();
        self.names.extend(name_links);
        self.cache.extend(cache);
        let count = batch.len();
        for (name, rule) in batch {
            self.schemas.insert(
                name,
                SchemaEntry {
                    rule,
                    options: options.clone(),
                },
            );
        }
        info!(
            schemas = count,
            compiled,
            artifacts = self.cache.len(),
            "published schema batch"
        );
    }
}

/// Builder for a [`Registry`] with custom options and coercions.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    options: Options,
    coercions: CoercionTable,
}

impl RegistryBuilder {
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Add a named coercion. A custom coercion named like a built-in one
    /// replaces it.
    pub fn coercion(mut self, name: impl Into<String>, coercion: impl Coercion + 'static) -> Self {
        self.coercions.insert(name, coercion);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            options: self.options,
            coercions: self.coercions,
            schemas: HashMap::new(),
            names: HashMap::new(),
            cache: HashMap::new(),
        }
    }
}

/// Handle to a named schema's compiled validator.
#[derive(Debug, Clone)]
pub struct Validator {
    name: String,
    link: Arc<Link>,
}

impl Validator {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate and normalize `value`.
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self.link.invoke(value, &Scope::new(None))
    }

    /// Validate with a context mapping available to coercions and
    /// `if_null` parameters.
    pub fn validate_with(&self, value: &Value, context: &Context) -> Result<Value, ValidationError> {
        self.link.invoke(value, &Scope::new(Some(context)))
    }

    /// Identity of the artifact the name currently resolves to.
    pub fn identity(&self) -> Option<SchemaId> {
        self.link.current().map(|program| program.id())
    }

    /// True when both handles currently run the same compiled artifact.
    pub fn same_artifact(&self, other: &Validator) -> bool {
        match (self.link.current(), other.link.current()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }
}
