//! # Rule Vocabulary
//!
//! A rule is a JSON value in one of three shapes:
//!
//! - a mapping from feature name to feature argument,
//! - a string naming another schema,
//! - `null` or `{}`, which accepts anything unchanged.
//!
//! Before a rule is hashed or compiled it is canonicalized: feature aliases
//! collapse onto one spelling and type-tag synonyms collapse onto one tag.
//! Canonicalization descends into every position that holds a sub-rule,
//! so two rules that differ only in spelling share an identity.
//!
//! [`RuleSpec::parse`] then reads a canonical mapping into a typed view
//! for the per-feature compilers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use coercer_core::OptionsOverride;

use crate::error::SchemaError;

/// Feature aliases and the canonical key each one collapses onto.
const FEATURE_ALIASES: &[(&str, &str)] = &[
    ("schema", "items"),
    ("properties", "items"),
    ("valuesrules", "values"),
    ("keysrules", "keys"),
    ("anyof", "any_of"),
    ("anyOf", "any_of"),
    ("oneof", "one_of"),
    ("oneOf", "one_of"),
    ("allowed", "enum"),
    ("pattern", "regex"),
    ("minlength", "min_len"),
    ("minLength", "min_len"),
    ("maxlength", "max_len"),
    ("maxLength", "max_len"),
    ("allow_unkown", "allow_unknown"),
    ("purge_unkown", "purge_unknown"),
];

// ─── Type Tags ───────────────────────────────────────────────────────

/// The value kinds a `type` feature can demand.
///
/// Serializes as its canonical tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// A mapping (JSON object).
    Dict,
    /// A sequence (JSON array).
    List,
    /// Text.
    Str,
    /// An integer.
    Int,
    /// A floating-point number.
    Float,
    /// Any number, integer or floating-point.
    Number,
    /// A boolean.
    Bool,
    /// Only `null`.
    Null,
}

impl Kind {
    /// All kinds, in tag order.
    pub const ALL: [Kind; 8] = [
        Kind::Dict,
        Kind::List,
        Kind::Str,
        Kind::Int,
        Kind::Float,
        Kind::Number,
        Kind::Bool,
        Kind::Null,
    ];

    /// The canonical tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Dict => "dict",
            Self::List => "list",
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Null => "null",
        }
    }

    /// Parse a canonical tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Whether `value` is of this kind. Booleans are never numbers.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Dict, Value::Object(_))
            | (Self::List, Value::Array(_))
            | (Self::Str, Value::String(_))
            | (Self::Number, Value::Number(_))
            | (Self::Bool, Value::Bool(_))
            | (Self::Null, Value::Null) => true,
            (Self::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(n)) => n.is_f64(),
            _ => false,
        }
    }
}

/// Map a type-tag synonym onto its canonical tag. Unknown tags are kept
/// as written so the schema-of-schemas can report them.
fn canonical_tag(tag: &Value) -> Value {
    let canonical = match tag {
        Value::Null => "null",
        Value::String(s) => match s.as_str() {
            "dict" | "object" | "mapping" => "dict",
            "list" | "array" | "sequence" => "list",
            "str" | "string" | "text" => "str",
            "int" | "integer" => "int",
            "float" | "floating-point" => "float",
            "number" | "numeric" => "number",
            "bool" | "boolean" => "bool",
            "null" | "None" => "null",
            _ => return tag.clone(),
        },
        _ => return tag.clone(),
    };
    Value::String(canonical.to_string())
}

// ─── Canonicalization ────────────────────────────────────────────────

/// Canonicalize a rule: collapse aliases, normalize type tags, and map a
/// `null` rule onto `{}`. Names and malformed shapes pass through.
pub fn canonicalize(rule: &Value) -> Value {
    match rule {
        Value::Null => Value::Object(Map::new()),
        Value::Object(features) => Value::Object(canonicalize_features(features)),
        other => other.clone(),
    }
}

fn canonicalize_features(features: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in features {
        let canonical = FEATURE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key.as_str())
            .map_or(key.as_str(), |(_, canonical)| *canonical);
        // The canonical spelling wins over any alias of it.
        if canonical != key.as_str() && features.contains_key(canonical) {
            continue;
        }
        out.insert(canonical.to_string(), canonicalize_argument(canonical, value));
    }
    out
}

fn canonicalize_argument(feature: &str, value: &Value) -> Value {
    match (feature, value) {
        ("type", tag) => canonical_tag(tag),
        ("items" | "pattern_items", Value::Object(entries)) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect(),
        ),
        ("keys" | "values", rule) => canonicalize(rule),
        ("any_of" | "one_of", Value::Array(rules)) => {
            Value::Array(rules.iter().map(canonicalize).collect())
        }
        _ => value.clone(),
    }
}

// ─── Fallback Values ─────────────────────────────────────────────────

/// A substitute value for `if_null` and `default`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fallback {
    /// Use the value as written.
    Literal(Value),
    /// Read the named parameter from the invocation context. Written as
    /// `"{NAME}"`.
    Context(String),
}

impl Fallback {
    pub(crate) fn parse(value: &Value) -> Self {
        if let Value::String(s) = value {
            if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if !name.is_empty() {
                    return Self::Context(name.to_string());
                }
            }
        }
        Self::Literal(value.clone())
    }
}

// ─── Parsed Rule ─────────────────────────────────────────────────────

/// Typed view of a canonical rule mapping.
///
/// Sub-rules (`items`, `values`, `any_of`, ...) stay as raw values; the
/// resolver decides whether each one is a name, inline, or empty.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleSpec {
    pub kind: Option<Kind>,
    pub coerce: Option<String>,
    pub post_coerce: Option<String>,
    pub nullable: bool,
    pub if_null: Option<Fallback>,
    pub default: Option<Fallback>,
    pub required: Option<bool>,
    pub rename: Option<String>,
    pub synonyms: Vec<String>,
    pub regex: Option<String>,
    pub enumeration: Option<Vec<Value>>,
    pub remap: Option<Value>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub items: Option<Map<String, Value>>,
    pub pattern_items: Option<Map<String, Value>>,
    pub keys: Option<Value>,
    pub values: Option<Value>,
    pub any_of: Option<Vec<Value>>,
    pub one_of: Option<Vec<Value>>,
    pub overrides: OptionsOverride,
    pub examples: Vec<Value>,
    pub negative_examples: Vec<Value>,
}

impl RuleSpec {
    /// Read a canonical, already-flattened rule mapping.
    ///
    /// `label` names the rule in error messages. Unknown feature keys are
    /// ignored here; the schema-of-schemas rejects them when enabled.
    pub(crate) fn parse(features: &Map<String, Value>, label: &str) -> Result<Self, SchemaError> {
        let reader = Reader { features, label };
        Ok(Self {
            kind: reader.kind()?,
            coerce: reader.string("coerce")?,
            post_coerce: reader.string("post_coerce")?,
            nullable: reader.boolean("nullable")?.unwrap_or(false),
            if_null: features.get("if_null").map(Fallback::parse),
            default: features.get("default").map(Fallback::parse),
            required: reader.boolean("required")?,
            rename: reader.string("rename")?,
            synonyms: reader.strings("synonyms")?,
            regex: reader.string("regex")?,
            enumeration: reader.list("enum")?,
            remap: features.get("map").filter(|v| !v.is_null()).cloned(),
            min: features.get("min").filter(|v| !v.is_null()).cloned(),
            max: features.get("max").filter(|v| !v.is_null()).cloned(),
            min_len: reader.count("min_len")?,
            max_len: reader.count("max_len")?,
            items: reader.mapping("items")?,
            pattern_items: reader.mapping("pattern_items")?,
            keys: features.get("keys").cloned(),
            values: features.get("values").cloned(),
            any_of: reader.list("any_of")?,
            one_of: reader.list("one_of")?,
            overrides: OptionsOverride {
                allow_unknown: reader.boolean("allow_unknown")?,
                purge_unknown: reader.boolean("purge_unknown")?,
                require_all: reader.boolean("require_all")?,
            },
            examples: reader.list("examples")?.unwrap_or_default(),
            negative_examples: reader.list("negative_examples")?.unwrap_or_default(),
        })
    }

    /// Whether the rule declares structure for container contents.
    pub(crate) fn has_structure(&self) -> bool {
        self.items.is_some()
            || self.pattern_items.is_some()
            || self.keys.is_some()
            || self.values.is_some()
    }
}

/// Typed accessors over a feature mapping. `null` arguments read as absent.
struct Reader<'a> {
    features: &'a Map<String, Value>,
    label: &'a str,
}

impl Reader<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.features.get(key).filter(|v| !v.is_null())
    }

    fn wrong(&self, key: &str, expected: &str) -> SchemaError {
        SchemaError::malformed(self.label, format!("'{key}' must be {expected}"))
    }

    fn kind(&self) -> Result<Option<Kind>, SchemaError> {
        match self.features.get("type") {
            None => Ok(None),
            Some(Value::String(tag)) => Kind::from_tag(tag)
                .map(Some)
                .ok_or_else(|| self.wrong("type", "a known type tag")),
            Some(_) => Err(self.wrong("type", "a type tag")),
        }
    }

    fn string(&self, key: &str) -> Result<Option<String>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.wrong(key, "a string")),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.wrong(key, "a boolean")),
        }
    }

    fn count(&self, key: &str) -> Result<Option<usize>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.wrong(key, "a non-negative integer")),
        }
    }

    fn list(&self, key: &str) -> Result<Option<Vec<Value>>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items.clone())),
            Some(_) => Err(self.wrong(key, "a list")),
        }
    }

    fn strings(&self, key: &str) -> Result<Vec<String>, SchemaError> {
        self.list(key)?
            .unwrap_or_default()
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(self.wrong(key, "a list of strings")),
            })
            .collect()
    }

    fn mapping(&self, key: &str) -> Result<Option<Map<String, Value>>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(entries)) => Ok(Some(entries.clone())),
            Some(_) => Err(self.wrong(key, "a mapping")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_serializes_as_tag() {
        for kind in Kind::ALL {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.tag()));
            assert_eq!(serde_json::from_value::<Kind>(json!(kind.tag())).unwrap(), kind);
            assert_eq!(Kind::from_tag(kind.tag()), Some(kind));
        }
        assert!(serde_json::from_value::<Kind>(json!("object")).is_err());
    }

    #[test]
    fn test_aliases_collapse_recursively() {
        let rule = json!({
            "type": "object",
            "schema": {
                "tags": {"type": "array", "valuesrules": {"type": "string"}},
                "size": {"minLength": 1, "anyOf": [{"type": "integer"}, "size_name"]},
            },
            "allow_unkown": false,
        });
        assert_eq!(
            canonicalize(&rule),
            json!({
                "type": "dict",
                "items": {
                    "tags": {"type": "list", "values": {"type": "str"}},
                    "size": {"min_len": 1, "any_of": [{"type": "int"}, "size_name"]},
                },
                "allow_unknown": false,
            })
        );
    }

    #[test]
    fn test_canonical_key_wins_over_alias() {
        let rule = json!({"regex": "a+", "pattern": "b+"});
        assert_eq!(canonicalize(&rule), json!({"regex": "a+"}));
    }

    #[test]
    fn test_null_type_and_null_rule() {
        assert_eq!(canonicalize(&json!({"type": null})), json!({"type": "null"}));
        assert_eq!(canonicalize(&json!({"type": "None"})), json!({"type": "null"}));
        assert_eq!(canonicalize(&Value::Null), json!({}));
        assert_eq!(canonicalize(&json!("user")), json!("user"));
    }

    #[test]
    fn test_unknown_tag_survives_canonicalization() {
        assert_eq!(canonicalize(&json!({"type": "intt"})), json!({"type": "intt"}));
        let err = RuleSpec::parse(json!({"type": "intt"}).as_object().unwrap(), "t").unwrap_err();
        assert!(matches!(err, SchemaError::Malformed { .. }));
    }

    #[test]
    fn test_kind_matching_keeps_bool_out_of_numbers() {
        assert!(Kind::Int.matches(&json!(1)));
        assert!(!Kind::Int.matches(&json!(1.2)));
        assert!(!Kind::Int.matches(&json!(true)));
        assert!(Kind::Float.matches(&json!(1.0)));
        assert!(!Kind::Float.matches(&json!(1)));
        assert!(Kind::Number.matches(&json!(1)) && Kind::Number.matches(&json!(1.5)));
        assert!(!Kind::Number.matches(&json!(false)));
        assert!(Kind::Null.matches(&Value::Null));
    }

    #[test]
    fn test_fallback_context_form() {
        assert_eq!(Fallback::parse(&json!("{MY_PARAM}")), Fallback::Context("MY_PARAM".into()));
        assert_eq!(Fallback::parse(&json!("{}")), Fallback::Literal(json!("{}")));
        assert_eq!(Fallback::parse(&json!(-1)), Fallback::Literal(json!(-1)));
    }

    #[test]
    fn test_parse_reads_features_and_overrides() {
        let rule = json!({
            "type": "dict",
            "items": {"x": {}},
            "require_all": true,
            "synonyms": ["a", "b"],
            "min_len": 2,
            "examples": [{"x": 1}],
        });
        let spec = RuleSpec::parse(rule.as_object().unwrap(), "r").unwrap();
        assert_eq!(spec.kind, Some(Kind::Dict));
        assert_eq!(spec.overrides.require_all, Some(true));
        assert_eq!(spec.synonyms, vec!["a", "b"]);
        assert_eq!(spec.min_len, Some(2));
        assert_eq!(spec.examples.len(), 1);
        assert!(spec.has_structure());
    }

    #[test]
    fn test_parse_rejects_mistyped_arguments() {
        for rule in [
            json!({"min_len": -1}),
            json!({"coerce": 3}),
            json!({"items": [1]}),
            json!({"synonyms": [1]}),
            json!({"nullable": "yes"}),
        ] {
            let err = RuleSpec::parse(rule.as_object().unwrap(), "bad").unwrap_err();
            assert!(matches!(err, SchemaError::Malformed { ref rule, .. } if rule == "bad"));
        }
    }
}
