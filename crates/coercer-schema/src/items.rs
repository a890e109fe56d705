//! # Structural Validators
//!
//! The `Structure` step recurses into containers.
//!
//! ## Mappings
//!
//! Declared entries are visited in key order, not in the order the rule
//! was written, so the failure reported for a mapping with several bad
//! entries is the one whose key sorts first. For each entry the input is
//! searched for its synonyms (in declared order) and then its own key; the
//! first hit is validated by the entry's sub-rule and written to the
//! output under the entry's output key, which differs from the input key
//! when the entry is renamed or found through a synonym. An absent entry
//! takes its default, fails if required, or is simply omitted.
//!
//! Remaining keys go, in order, to:
//!
//! 1. the pattern-keyed entries, longest pattern first (ties broken
//!    lexicographically), where the first full match wins;
//! 2. the open `keys`/`values` rule, if the key passes the key rule;
//! 3. the unknown-key policy: forbid, purge, or allow.
//!
//! Under purge the output starts empty and only claimed keys are written;
//! otherwise it starts as a copy of the input.
//!
//! ## Sequences
//!
//! Every index is visited in order. The key rule, if any, is applied to the
//! index; an element whose index fails it passes through unchanged. The
//! value rule validates the element and failures are reported at `[i]`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use coercer_core::UnknownKeys;

use crate::compile::{resolve_fallback, Callee, FullMatch};
use crate::error::{PathSegment, ValidationError};
use crate::guard::Scope;
use crate::rule::Fallback;

/// A declared mapping entry.
#[derive(Debug)]
pub(crate) struct Entry {
    pub key: String,
    pub output: String,
    pub synonyms: Vec<String>,
    pub callee: Callee,
    pub default: Option<Fallback>,
    pub required: bool,
}

/// A `pattern_items` entry.
#[derive(Debug)]
pub(crate) struct PatternEntry {
    pub pattern: FullMatch,
    pub rename: Option<String>,
    pub callee: Callee,
}

/// The open `keys` / `values` rule.
#[derive(Debug, Clone, Default)]
pub(crate) struct OpenRule {
    pub keys: Option<Callee>,
    pub values: Option<Callee>,
}

impl OpenRule {
    /// Validate a key, turning a non-text result into its JSON text.
    fn key(&self, key: Value, scope: &Scope<'_>) -> Option<Value> {
        match &self.keys {
            None => Some(key),
            Some(callee) => callee.call(&key, scope).ok(),
        }
    }

    fn value(&self, value: &Value, scope: &Scope<'_>) -> Result<Value, ValidationError> {
        match &self.values {
            None => Ok(value.clone()),
            Some(callee) => callee.call(value, scope),
        }
    }
}

#[derive(Debug)]
pub(crate) struct MappingItems {
    entries: Vec<Entry>,
    known: HashSet<String>,
    patterns: Vec<PatternEntry>,
    open: Option<OpenRule>,
    policy: UnknownKeys,
}

impl MappingItems {
    pub(crate) fn new(
        mut entries: Vec<Entry>,
        mut patterns: Vec<PatternEntry>,
        open: Option<OpenRule>,
        policy: UnknownKeys,
    ) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        patterns.sort_by(|a, b| {
            let (a, b) = (a.pattern.source(), b.pattern.source());
            b.len().cmp(&a.len()).then_with(|| a.cmp(b))
        });
        let known = entries
            .iter()
            .flat_map(|entry| std::iter::once(&entry.key).chain(&entry.synonyms))
            .cloned()
            .collect();
        Self {
            entries,
            known,
            patterns,
            open,
            policy,
        }
    }

    fn apply(&self, input: &Map<String, Value>, scope: &Scope<'_>) -> Result<Value, ValidationError> {
        let mut out = match self.policy {
            UnknownKeys::Purge => Map::new(),
            UnknownKeys::Forbid | UnknownKeys::Allow => input.clone(),
        };

        for entry in &self.entries {
            let found = entry
                .synonyms
                .iter()
                .chain(std::iter::once(&entry.key))
                .find(|key| input.contains_key(key.as_str()));
            match found {
                Some(key) => {
                    let validated = entry
                        .callee
                        .call(&input[key.as_str()], scope)
                        .map_err(|e| e.at(PathSegment::Key(key.clone())))?;
                    if *key != entry.output {
                        out.remove(key.as_str());
                    }
                    out.insert(entry.output.clone(), validated);
                }
                None => {
                    if let Some(default) = &entry.default {
                        out.insert(entry.output.clone(), resolve_fallback(default, scope)?);
                    } else if entry.required {
                        return Err(ValidationError::new("is required")
                            .at(PathSegment::Key(entry.key.clone())));
                    }
                }
            }
        }

        let mut forbidden = Vec::new();
        for (key, value) in input {
            if self.known.contains(key) {
                continue;
            }
            if self.apply_pattern(key, value, &mut out, scope)?
                || self.apply_open(key, value, &mut out, scope)?
            {
                continue;
            }
            if self.policy == UnknownKeys::Forbid {
                forbidden.push(key.as_str());
            }
        }
        if !forbidden.is_empty() {
            return Err(ValidationError::new(format!(
                "must not contain keys: {}",
                forbidden.join(", ")
            )));
        }
        Ok(Value::Object(out))
    }

    fn apply_pattern(
        &self,
        key: &str,
        value: &Value,
        out: &mut Map<String, Value>,
        scope: &Scope<'_>,
    ) -> Result<bool, ValidationError> {
        let Some(entry) = self.patterns.iter().find(|p| p.pattern.is_match(key)) else {
            return Ok(false);
        };
        let validated = entry
            .callee
            .call(value, scope)
            .map_err(|e| e.at(PathSegment::Key(key.to_string())))?;
        let output = entry.rename.as_deref().unwrap_or(key);
        if output != key {
            out.remove(key);
        }
        out.insert(output.to_string(), validated);
        Ok(true)
    }

    fn apply_open(
        &self,
        key: &str,
        value: &Value,
        out: &mut Map<String, Value>,
        scope: &Scope<'_>,
    ) -> Result<bool, ValidationError> {
        let Some(open) = &self.open else {
            return Ok(false);
        };
        let Some(output) = open.key(Value::String(key.to_string()), scope) else {
            return Ok(false);
        };
        let output = match output {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let validated = open
            .value(value, scope)
            .map_err(|e| e.at(PathSegment::Key(key.to_string())))?;
        if output != key {
            out.remove(key);
        }
        out.insert(output, validated);
        Ok(true)
    }
}

#[derive(Debug)]
pub(crate) struct SequenceItems {
    open: OpenRule,
}

impl SequenceItems {
    pub(crate) fn new(open: OpenRule) -> Self {
        Self { open }
    }

    fn apply(&self, input: &[Value], scope: &Scope<'_>) -> Result<Value, ValidationError> {
        let mut out = Vec::with_capacity(input.len());
        for (index, element) in input.iter().enumerate() {
            if self.open.key(Value::from(index), scope).is_none() {
                out.push(element.clone());
                continue;
            }
            let validated = self
                .open
                .value(element, scope)
                .map_err(|e| e.at(PathSegment::Index(index)))?;
            out.push(validated);
        }
        Ok(Value::Array(out))
    }
}

/// Container recursion for one rule.
///
/// A declared `type` fixes which side applies. Without one, the value's
/// own kind decides at run time.
#[derive(Debug)]
pub(crate) struct Structure {
    pub mapping: Option<MappingItems>,
    pub sequence: Option<SequenceItems>,
}

impl Structure {
    pub(crate) fn apply(&self, value: &Value, scope: &Scope<'_>) -> Result<Value, ValidationError> {
        match (value, &self.mapping, &self.sequence) {
            (Value::Object(map), Some(mapping), _) => mapping.apply(map, scope),
            (Value::Array(list), _, Some(sequence)) => sequence.apply(list, scope),
            (_, Some(_), Some(_)) => Err(ValidationError::new("type must be dict or list")),
            (_, Some(_), None) => Err(ValidationError::new("type must be dict")),
            (_, None, _) => Err(ValidationError::new("type must be list")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::compile::{Program, Step};
    use crate::guard::Link;
    use crate::rule::Kind;

    fn typed(kind: Kind) -> Callee {
        let link = Link::new(kind.tag());
        let id = Program::empty(kind.tag()).id();
        link.bind(Arc::new(Program::new(id, kind.tag().into(), true, vec![Step::Type(kind)])));
        Callee::Link(link)
    }

    fn entry(key: &str, callee: Callee) -> Entry {
        Entry {
            key: key.into(),
            output: key.into(),
            synonyms: Vec::new(),
            callee,
            default: None,
            required: false,
        }
    }

    fn mapping(entries: Vec<Entry>, policy: UnknownKeys) -> Structure {
        Structure {
            mapping: Some(MappingItems::new(entries, Vec::new(), None, policy)),
            sequence: None,
        }
    }

    fn run(s: &Structure, value: Value) -> Result<Value, String> {
        s.apply(&value, &Scope::new(None)).map_err(|e| e.to_string())
    }

    #[test]
    fn test_unknown_key_policies() {
        let input = json!({"x": 1, "u": 2});
        let forbid = mapping(vec![entry("x", Callee::Pass)], UnknownKeys::Forbid);
        let purge = mapping(vec![entry("x", Callee::Pass)], UnknownKeys::Purge);
        let allow = mapping(vec![entry("x", Callee::Pass)], UnknownKeys::Allow);
        assert_eq!(run(&forbid, input.clone()), Err("Input must not contain keys: u".into()));
        assert_eq!(run(&purge, input.clone()), Ok(json!({"x": 1})));
        assert_eq!(run(&allow, input.clone()), Ok(input));
    }

    #[test]
    fn test_synonyms_tried_before_key_and_renamed() {
        let mut e = entry("a", typed(Kind::Int));
        e.synonyms = vec!["b".into(), "c".into()];
        let s = mapping(vec![e], UnknownKeys::Allow);
        assert_eq!(run(&s, json!({"c": 1})), Ok(json!({"a": 1})));
        assert_eq!(run(&s, json!({"a": 1})), Ok(json!({"a": 1})));
        assert_eq!(run(&s, json!({"b": "1"})), Err("Input.b type must be int".into()));
        assert_eq!(run(&s, json!({"a": 2, "b": 1})), Ok(json!({"a": 1})));
    }

    #[test]
    fn test_first_failure_in_key_order() {
        let s = mapping(
            vec![entry("z", typed(Kind::Int)), entry("a", typed(Kind::Int))],
            UnknownKeys::Allow,
        );
        assert_eq!(
            run(&s, json!({"z": "x", "a": "y"})),
            Err("Input.a type must be int".into())
        );
    }

    #[test]
    fn test_default_required_and_omitted() {
        let mut d = entry("d", Callee::Pass);
        d.default = Some(Fallback::Literal(json!(5)));
        let mut r = entry("r", Callee::Pass);
        r.required = true;
        let o = entry("o", Callee::Pass);

        let s = mapping(vec![d, o], UnknownKeys::Allow);
        assert_eq!(run(&s, json!({})), Ok(json!({"d": 5})));
        assert_eq!(run(&s, json!({"d": 3})), Ok(json!({"d": 3})));

        let s = mapping(vec![r], UnknownKeys::Allow);
        assert_eq!(run(&s, json!({})), Err("Input.r is required".into()));
    }

    #[test]
    fn test_patterns_longest_first() {
        let patterns = vec![
            PatternEntry {
                pattern: FullMatch::new("x.*", "t").unwrap(),
                rename: None,
                callee: typed(Kind::Str),
            },
            PatternEntry {
                pattern: FullMatch::new("x_[0-9]+", "t").unwrap(),
                rename: None,
                callee: typed(Kind::Int),
            },
        ];
        let s = Structure {
            mapping: Some(MappingItems::new(Vec::new(), patterns, None, UnknownKeys::Forbid)),
            sequence: None,
        };
        assert_eq!(
            run(&s, json!({"x_1": 1, "xyz": "a"})),
            Ok(json!({"x_1": 1, "xyz": "a"}))
        );
        assert_eq!(run(&s, json!({"x_1": "a"})), Err("Input.x_1 type must be int".into()));
        assert_eq!(run(&s, json!({"y": 1})), Err("Input must not contain keys: y".into()));
    }

    #[test]
    fn test_open_key_rule_failure_falls_to_policy() {
        let open = OpenRule {
            keys: Some(typed(Kind::Int)),
            values: None,
        };
        let s = Structure {
            mapping: Some(MappingItems::new(Vec::new(), Vec::new(), Some(open), UnknownKeys::Forbid)),
            sequence: None,
        };
        assert_eq!(run(&s, json!({"a": 1})), Err("Input must not contain keys: a".into()));
    }

    #[test]
    fn test_sequence_values_reported_by_index() {
        let s = Structure {
            mapping: None,
            sequence: Some(SequenceItems::new(OpenRule {
                keys: None,
                values: Some(typed(Kind::Int)),
            })),
        };
        assert_eq!(run(&s, json!([1, 2])), Ok(json!([1, 2])));
        assert_eq!(run(&s, json!([1, "s"])), Err("Input[1] type must be int".into()));
        assert_eq!(run(&s, json!({})), Err("Input type must be list".into()));
    }

    #[test]
    fn test_runtime_dispatch_without_declared_type() {
        let s = Structure {
            mapping: Some(MappingItems::new(Vec::new(), Vec::new(), None, UnknownKeys::Allow)),
            sequence: Some(SequenceItems::new(OpenRule::default())),
        };
        assert_eq!(run(&s, json!(3)), Err("Input type must be dict or list".into()));
        assert_eq!(run(&s, json!([3])), Ok(json!([3])));
    }
}
