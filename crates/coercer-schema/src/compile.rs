//! # Compiled Programs
//!
//! A compiled validator is a [`Program`]: a flat list of [`Step`]s in the
//! fixed feature order below, interpreted by a single dispatch loop.
//!
//! | # | Step          | Feature(s)                      |
//! |---|---------------|---------------------------------|
//! | 1 | `Nullable`    | `nullable`, `if_null`           |
//! | 2 | `Type`        | `type`                          |
//! | 3 | `Coerce`      | `coerce`                        |
//! | 4 | `Regex`       | `regex`                         |
//! | 5 | `Structure`   | `items`, `pattern_items`, `keys`, `values` |
//! | 6 | `Remap`       | `map`                           |
//! | 7 | `Enum`        | `enum`                          |
//! | 8 | bounds        | `min`, `max`, `min_len`, `max_len` |
//! | 9 | combinators   | `any_of`, `one_of`              |
//! |10 | `PostCoerce`  | `post_coerce`                   |
//!
//! Each step either passes a (possibly transformed) value to the next one,
//! returns early with a final value, or fails. The first failure ends the
//! run. Values are carried as `Cow` so steps that only check never copy.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use coercer_core::SchemaId;

use crate::coerce::Coercer;
use crate::combinator::{AnyOf, OneOf};
use crate::error::{SchemaError, ValidationError};
use crate::guard::{Frame, Link, Scope};
use crate::items::Structure;
use crate::rule::{Fallback, Kind};
use crate::value::{compare, length, Enumeration, Remap};

/// A compiled validator.
#[derive(Debug)]
pub(crate) struct Program {
    id: SchemaId,
    label: String,
    break_loops: bool,
    steps: Vec<Step>,
}

impl Program {
    pub(crate) fn new(id: SchemaId, label: String, break_loops: bool, steps: Vec<Step>) -> Self {
        Self {
            id,
            label,
            break_loops,
            steps,
        }
    }

    #[cfg(test)]
    pub(crate) fn empty(label: &str) -> Self {
        let id = SchemaId::of(&serde_json::json!({}), &coercer_core::Options::default())
            .expect("empty rule canonicalizes");
        Self::new(id, label.to_string(), true, Vec::new())
    }

    pub(crate) fn id(&self) -> SchemaId {
        self.id
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Validate `value`, returning the transformed result. `name` is the
    /// label of the link the program was reached through.
    pub(crate) fn run(
        &self,
        value: &Value,
        scope: &Scope<'_>,
        name: &str,
    ) -> Result<Value, ValidationError> {
        if scope.is_in_flight(self, value) {
            if self.break_loops {
                return Ok(value.clone());
            }
            return Err(ValidationError::new(format!(
                "re-entered schema {name} on the same value"
            )));
        }

        let frame = Frame::new(self, value, scope);
        let scope = scope.within(&frame);
        let mut current = Cow::Borrowed(value);
        for step in &self.steps {
            match step.apply(current, &scope)? {
                Flow::Continue(next) => current = next,
                Flow::Return(done) => return Ok(done),
            }
        }
        Ok(current.into_owned())
    }
}

/// Outcome of a successful step.
pub(crate) enum Flow<'v> {
    /// Hand the value to the next step.
    Continue(Cow<'v, Value>),
    /// Skip the remaining steps.
    Return(Value),
}

/// A reference to a sub-validator.
#[derive(Debug, Clone)]
pub(crate) enum Callee {
    /// An empty rule: the value passes through unchanged.
    Pass,
    /// A compiled rule, reached through its link.
    Link(Arc<Link>),
}

impl Callee {
    pub(crate) fn call(&self, value: &Value, scope: &Scope<'_>) -> Result<Value, ValidationError> {
        match self {
            Self::Pass => Ok(value.clone()),
            Self::Link(link) => link.invoke(value, scope),
        }
    }
}

/// A pattern that must match the whole text.
#[derive(Debug)]
pub(crate) struct FullMatch {
    source: String,
    regex: Regex,
}

impl FullMatch {
    pub(crate) fn new(source: &str, rule: &str) -> Result<Self, SchemaError> {
        let regex =
            Regex::new(&format!("^(?:{source})$")).map_err(|e| SchemaError::InvalidRegex {
                rule: rule.to_string(),
                pattern: source.to_string(),
                source: e,
            })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

// ─── Steps ───────────────────────────────────────────────────────────

/// One stage of a compiled pipeline.
#[derive(Debug)]
pub(crate) enum Step {
    Nullable {
        fallback: Option<Fallback>,
        post: Option<Coercer>,
    },
    Type(Kind),
    Coerce(Coercer),
    Regex(FullMatch),
    Structure(Box<Structure>),
    Remap(Remap),
    Enum(Enumeration),
    Min(Value),
    Max(Value),
    MinLen(usize),
    MaxLen(usize),
    AnyOf(AnyOf),
    OneOf(OneOf),
    PostCoerce(Coercer),
    /// The whole rule is another schema's name.
    Refer(Arc<Link>),
}

impl Step {
    fn apply<'v>(&self, value: Cow<'v, Value>, scope: &Scope<'_>) -> Result<Flow<'v>, ValidationError> {
        let next = match self {
            Self::Nullable { fallback, post } => {
                if !value.is_null() {
                    return Ok(Flow::Continue(value));
                }
                let substitute = match fallback {
                    Some(fallback) => resolve_fallback(fallback, scope)?,
                    None => Value::Null,
                };
                let done = match post {
                    Some(coercer) => coercer.apply(&substitute, scope.context())?,
                    None => substitute,
                };
                return Ok(Flow::Return(done));
            }
            Self::Type(kind) => {
                if !kind.matches(&value) {
                    return Err(ValidationError::new(format!("type must be {}", kind.tag())));
                }
                value
            }
            Self::Coerce(coercer) | Self::PostCoerce(coercer) => {
                Cow::Owned(coercer.apply(&value, scope.context())?)
            }
            Self::Regex(pattern) => {
                if !value.as_str().is_some_and(|text| pattern.is_match(text)) {
                    return Err(ValidationError::new(format!(
                        "must match regex: {}",
                        pattern.source()
                    )));
                }
                value
            }
            Self::Structure(structure) => Cow::Owned(structure.apply(&value, scope)?),
            Self::Remap(remap) => match remap.lookup(&value) {
                Some(substitute) => Cow::Owned(substitute),
                None => value,
            },
            Self::Enum(allowed) => {
                if !allowed.contains(&value) {
                    return Err(ValidationError::new(format!(
                        "must be one of {}",
                        allowed.display()
                    )));
                }
                value
            }
            Self::Min(bound) => {
                if !matches!(compare(&value, bound), Some(Ordering::Greater | Ordering::Equal)) {
                    return Err(ValidationError::new(format!("must be at least {bound}")));
                }
                value
            }
            Self::Max(bound) => {
                if !matches!(compare(&value, bound), Some(Ordering::Less | Ordering::Equal)) {
                    return Err(ValidationError::new(format!("must be at most {bound}")));
                }
                value
            }
            Self::MinLen(bound) => {
                if !length(&value).is_some_and(|len| len >= *bound) {
                    return Err(ValidationError::new(format!(
                        "length must be at least {bound}"
                    )));
                }
                value
            }
            Self::MaxLen(bound) => {
                if !length(&value).is_some_and(|len| len <= *bound) {
                    return Err(ValidationError::new(format!(
                        "length must be at most {bound}"
                    )));
                }
                value
            }
            Self::AnyOf(any_of) => Cow::Owned(any_of.apply(&value, scope)?),
            Self::OneOf(one_of) => Cow::Owned(one_of.apply(&value, scope)?),
            Self::Refer(link) => Cow::Owned(link.invoke(&value, scope)?),
        };
        Ok(Flow::Continue(next))
    }
}

/// Produce the value a [`Fallback`] stands for in this call.
pub(crate) fn resolve_fallback(
    fallback: &Fallback,
    scope: &Scope<'_>,
) -> Result<Value, ValidationError> {
    match fallback {
        Fallback::Literal(value) => Ok(value.clone()),
        Fallback::Context(name) => scope
            .context()
            .and_then(|context| context.get(name))
            .cloned()
            .ok_or_else(|| ValidationError::new(format!("requires context parameter {name}"))),
    }
}
