//! # Error Types
//!
//! Two disjoint classes of failure leave this crate:
//!
//! - [`ValidationError`] is an ordinary per-call outcome. It is returned by
//!   [`Validator::validate`](crate::Validator::validate) as the `Err` side of
//!   a `Result`, carries the path of the failing value inside the input, and
//!   renders as `Input<path> <message>`.
//! - [`SchemaError`] is a fatal authoring failure raised at registration
//!   time. It aborts the whole batch; nothing from the batch is published.
//!
//! Custom coercions report failure through [`CoercionError`]; the engine
//! turns it into a validation failure naming the coercion and its reason.

use std::collections::VecDeque;
use std::fmt;

use coercer_core::CanonicalizationError;
use thiserror::Error;

/// Root marker prefixed to every rendered validation error.
pub const INPUT_ROOT: &str = "Input";

// ─── Validation Failures ─────────────────────────────────────────────

/// One step of the path from the validated root to a failing value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A mapping key, rendered as `.key`.
    Key(String),
    /// A sequence index, rendered as `[i]`.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, ".{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A single violated constraint, located inside the validated value.
///
/// Structural stages prepend their segment as the failure propagates
/// outward, so the path reads root-first once the call returns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    path: VecDeque<PathSegment>,
    message: String,
}

impl ValidationError {
    /// A failure at the current value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: VecDeque::new(),
            message: message.into(),
        }
    }

    /// Relocate this failure one level down, under `segment`.
    pub(crate) fn at(mut self, segment: PathSegment) -> Self {
        self.path.push_front(segment);
        self
    }

    /// Path segments from the root to the failing value.
    pub fn path(&self) -> impl Iterator<Item = &PathSegment> {
        self.path.iter()
    }

    /// The violated constraint, without location.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The path alone, e.g. `.user.children[1].id`. Empty at the root.
    pub fn path_string(&self) -> String {
        self.path.iter().map(ToString::to_string).collect()
    }

    /// Render with an arbitrary root marker.
    ///
    /// Combinators render their branches with `^` so nested failures read
    /// relative to the value the combinator was applied to.
    pub fn render(&self, root: &str) -> String {
        format!("{root}{} {}", self.path_string(), self.message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(INPUT_ROOT))
    }
}

/// Failure reported by a coercion function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct CoercionError {
    reason: String,
}

impl CoercionError {
    /// Build a coercion failure with a free-form reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason given by the coercion.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

// ─── Registration Failures ───────────────────────────────────────────

/// Fatal error raised while registering a batch of schemas.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The batch does not conform to the schema-of-schemas.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Rendered validation failure, rooted at `schemas`.
        message: String,
    },

    /// A rule is structurally unusable (wrong argument shape).
    #[error("malformed rule '{rule}': {reason}")]
    Malformed {
        /// Label of the offending rule.
        rule: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A `regex` or `pattern_items` pattern failed to compile.
    #[error("invalid regex in rule '{rule}': {pattern}")]
    InvalidRegex {
        /// Label of the offending rule.
        rule: String,
        /// The pattern as written.
        pattern: String,
        /// Compiler diagnostic.
        #[source]
        source: regex::Error,
    },

    /// A rule names a coercion that is neither built in nor registered.
    #[error("rule '{rule}' uses unknown coercion '{name}'")]
    UnknownCoercion {
        /// Label of the offending rule.
        rule: String,
        /// The coercion name.
        name: String,
    },

    /// A rule inherits (`rules: <name>`) from a schema that does not exist.
    #[error("rule '{rule}' inherits from undefined schema '{name}'")]
    UnknownBase {
        /// Label of the offending rule.
        rule: String,
        /// The missing base schema.
        name: String,
    },

    /// Inheritance through `rules` loops back on itself.
    #[error("inheritance cycle: {}", .chain.join(" -> "))]
    InheritanceCycle {
        /// Schema names in the order they were followed.
        chain: Vec<String>,
    },

    /// A positive example failed validation.
    #[error("example {example} rejected by rule '{rule}': {error}")]
    ExampleRejected {
        /// Label of the rule that carried the example.
        rule: String,
        /// The example, as JSON text.
        example: String,
        /// The rendered validation failure.
        error: String,
    },

    /// A negative example passed validation.
    #[error("negative example {example} accepted by rule '{rule}'")]
    NegativeExampleAccepted {
        /// Label of the rule that carried the example.
        rule: String,
        /// The example, as JSON text.
        example: String,
    },

    /// A rule could not be canonicalized for identity hashing.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

impl SchemaError {
    pub(crate) fn malformed(rule: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_renders_keys_and_indices() {
        let err = ValidationError::new("type must be int")
            .at(PathSegment::Key("id".into()))
            .at(PathSegment::Index(1))
            .at(PathSegment::Key("children".into()));
        assert_eq!(err.path_string(), ".children[1].id");
        assert_eq!(err.to_string(), "Input.children[1].id type must be int");
        assert_eq!(err.render("^"), "^.children[1].id type must be int");
        assert_eq!(err.path().count(), 3);
    }

    #[test]
    fn test_root_error_has_no_path() {
        let err = ValidationError::new("is not coercible to int");
        assert_eq!(err.to_string(), "Input is not coercible to int");
        assert_eq!(err.message(), "is not coercible to int");
    }

    #[test]
    fn test_inheritance_cycle_display() {
        let err = SchemaError::InheritanceCycle {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "inheritance cycle: a -> b -> a");
    }

    #[test]
    fn test_coercion_error_reason() {
        let err = CoercionError::new("no such gender");
        assert_eq!(err.reason(), "no such gender");
        assert_eq!(err.to_string(), "no such gender");
    }
}
