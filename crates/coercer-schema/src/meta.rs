//! # Schema-of-Schemas
//!
//! When `validate_schemas` is on, each submitted batch is first validated
//! by a rule set written in the engine's own vocabulary. It runs after
//! canonicalization, so it only needs to know canonical feature keys and
//! type tags.
//!
//! The rule set compiles once per process into a private registry with
//! `validate_schemas` off.

use std::sync::OnceLock;

use serde_json::{json, Map, Value};

use coercer_core::Options;

use crate::error::SchemaError;
use crate::registry::{Registry, Validator};
use crate::rule::Kind;

/// Root schema of the rule set: a mapping of names to rules.
const ROOT: &str = "schemas";

static META: OnceLock<Result<Validator, String>> = OnceLock::new();

/// The rule set describing valid schemas.
pub fn schema_of_schemas() -> Value {
    json!({
        "schemas": {"type": "dict", "values": "rule_ref"},
        "rule_ref": {"any_of": [{"type": "null"}, "str", "rule"]},
        "rule_map": {"type": "dict", "values": "rule_ref"},
        "rule_list": {"type": "list", "values": "rule_ref"},
        "str": {"type": "str"},
        "bool": {"type": "bool"},
        "count": {"type": "int", "min": 0},
        "names": {"type": "list", "values": "str"},
        "rule": {
            "type": "dict",
            "allow_unknown": false,
            "items": {
                "title": {},
                "description": {},
                "type": {"type": "str", "enum": Kind::ALL},
                "coerce": "str",
                "post_coerce": "str",
                "nullable": "bool",
                "if_null": {},
                "default": {},
                "required": "bool",
                "require_all": "bool",
                "allow_unknown": "bool",
                "purge_unknown": "bool",
                "rename": "str",
                "synonyms": "names",
                "regex": "str",
                "enum": {"type": "list"},
                "map": {"any_of": [
                    {"type": "dict"},
                    {"type": "list", "values": {"type": "list", "min_len": 2, "max_len": 2}},
                ]},
                "min": {},
                "max": {},
                "min_len": "count",
                "max_len": "count",
                "items": "rule_map",
                "pattern_items": "rule_map",
                "keys": "rule_ref",
                "values": "rule_ref",
                "any_of": "rule_list",
                "one_of": "rule_list",
                "rules": "str",
                "examples": {"type": "list"},
                "negative_examples": {"type": "list"},
            },
        },
    })
}

fn build() -> Result<Validator, String> {
    let mut registry = Registry::with_options(Options {
        validate_schemas: false,
        ..Options::default()
    });
    registry
        .register(&schema_of_schemas())
        .map_err(|e| e.to_string())?;
    registry
        .get(ROOT)
        .ok_or_else(|| format!("rule set has no '{ROOT}' schema"))
}

/// Validate a canonical batch against the schema-of-schemas.
pub(crate) fn check(batch: &Map<String, Value>) -> Result<(), SchemaError> {
    let validator = META
        .get_or_init(build)
        .as_ref()
        .map_err(|reason| SchemaError::InvalidSchema {
            message: format!("schema-of-schemas unavailable: {reason}"),
        })?;
    validator
        .validate(&Value::Object(batch.clone()))
        .map(drop)
        .map_err(|err| SchemaError::InvalidSchema {
            message: err.render(ROOT),
        })
}
