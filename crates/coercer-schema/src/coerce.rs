//! # Coercions
//!
//! A coercion is a fallible transform `(value, context) -> value`. The
//! built-ins cover `int`, `float`, `number`, `str` and `bool`; any other
//! name must be supplied by the caller when the registry is built.
//!
//! Names are resolved once, at compile time. A rule naming a coercion that
//! is neither built in nor registered fails registration with
//! [`SchemaError::UnknownCoercion`]. A caller-supplied coercion with a
//! built-in name replaces the built-in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::error::{CoercionError, SchemaError, ValidationError};
use crate::Context;

/// A caller-supplied coercion.
///
/// Implemented for every `Fn(&Value, Option<&Context>) -> Result<Value,
/// CoercionError>` closure that is `Send + Sync`.
pub trait Coercion: Send + Sync {
    /// Transform `value`, optionally reading invocation parameters.
    fn coerce(&self, value: &Value, context: Option<&Context>) -> Result<Value, CoercionError>;
}

impl<F> Coercion for F
where
    F: Fn(&Value, Option<&Context>) -> Result<Value, CoercionError> + Send + Sync,
{
    fn coerce(&self, value: &Value, context: Option<&Context>) -> Result<Value, CoercionError> {
        self(value, context)
    }
}

/// Name-to-coercion table fixed at registry construction.
#[derive(Clone, Default)]
pub struct CoercionTable {
    custom: HashMap<String, Arc<dyn Coercion>>,
}

impl fmt::Debug for CoercionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("CoercionTable").field("custom", &names).finish()
    }
}

impl CoercionTable {
    /// Register `coercion` under `name`, replacing any earlier entry.
    pub fn insert(&mut self, name: impl Into<String>, coercion: impl Coercion + 'static) {
        self.custom.insert(name.into(), Arc::new(coercion));
    }

    /// Whether `name` resolves to a custom or built-in coercion.
    pub fn contains(&self, name: &str) -> bool {
        self.custom.contains_key(name) || Builtin::from_name(name).is_some()
    }

    /// Resolve `name` for a rule labelled `rule`.
    pub(crate) fn resolve(&self, name: &str, rule: &str) -> Result<Coercer, SchemaError> {
        if let Some(custom) = self.custom.get(name) {
            return Ok(Coercer::Custom {
                name: name.to_string(),
                coercion: Arc::clone(custom),
            });
        }
        Builtin::from_name(name)
            .map(Coercer::Builtin)
            .ok_or_else(|| SchemaError::UnknownCoercion {
                rule: rule.to_string(),
                name: name.to_string(),
            })
    }
}

/// A resolved coercion, ready to run.
#[derive(Clone)]
pub(crate) enum Coercer {
    Builtin(Builtin),
    Custom {
        name: String,
        coercion: Arc<dyn Coercion>,
    },
}

impl fmt::Debug for Coercer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coercer({})", self.name())
    }
}

impl Coercer {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Builtin(builtin) => builtin.name(),
            Self::Custom { name, .. } => name,
        }
    }

    /// Run the coercion. Every failure reads `is not coercible to <name>`;
    /// a custom coercion's reason follows after a colon.
    pub(crate) fn apply(
        &self,
        value: &Value,
        context: Option<&Context>,
    ) -> Result<Value, ValidationError> {
        match self {
            Self::Builtin(builtin) => builtin.apply(value).ok_or_else(|| {
                ValidationError::new(format!("is not coercible to {}", builtin.name()))
            }),
            Self::Custom { name, coercion } => coercion.coerce(value, context).map_err(|e| {
                ValidationError::new(format!("is not coercible to {name}: {}", e.reason()))
            }),
        }
    }
}

// ─── Built-ins ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Int,
    Float,
    Number,
    Str,
    Bool,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "number" => Some(Self::Number),
            "str" => Some(Self::Str),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Number => "number",
            Self::Str => "str",
            Self::Bool => "bool",
        }
    }

    fn apply(&self, value: &Value) -> Option<Value> {
        match self {
            Self::Int => to_int(value),
            Self::Float => to_float(value),
            Self::Number => to_number(value),
            Self::Str => Some(to_str(value)),
            Self::Bool => to_bool(value),
        }
    }
}

/// Truncate a float toward zero, if it fits an `i64`.
fn truncate(f: f64) -> Option<Value> {
    let t = f.trunc();
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(Value::from(t as i64))
    } else {
        None
    }
}

fn to_int(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => truncate(n.as_f64()?),
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Some(Value::from(i)),
                Err(_) => truncate(s.parse::<f64>().ok()?),
            }
        }
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Number::from_f64(f).map(Value::Number)
}

fn to_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Some(Value::from(i)),
                Err(_) => Number::from_f64(s.parse::<f64>().ok()?).map(Value::Number),
            }
        }
        _ => None,
    }
}

/// Text stays as is; everything else becomes its JSON text.
fn to_str(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

fn to_bool(value: &Value) -> Option<Value> {
    let b = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_f64()? {
            f if f == 1.0 => true,
            f if f == 0.0 => false,
            _ => return None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" | "1.0" => true,
            "false" | "f" | "no" | "n" | "off" | "0" | "0.0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(Value::Bool(b))
}
