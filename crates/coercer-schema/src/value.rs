//! Value helpers shared by the per-feature compilers: scalar lookup keys,
//! structural equality across integer and float representations, ordering
//! for bounds, and container length.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde_json::{Number, Value};

/// Hashable projection of a scalar JSON value.
///
/// Integral floats collapse onto the integer key so `1` and `1.0` look up
/// the same table entry. Containers have no key and fall back to a linear
/// scan with [`values_equal`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ScalarKey {
    Null,
    Bool(bool),
    Int(i128),
    Float(u64),
    Str(String),
}

impl ScalarKey {
    pub(crate) fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) => Some(number_key(n)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

fn number_key(n: &Number) -> ScalarKey {
    if let Some(i) = n.as_i64() {
        return ScalarKey::Int(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return ScalarKey::Int(i128::from(u));
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f.fract() == 0.0 && f.abs() < 1e38 {
        ScalarKey::Int(f as i128)
    } else {
        ScalarKey::Float(f.to_bits())
    }
}

/// Structural equality where numbers compare by value, not representation.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_key(x) == number_key(y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Order two values for `min`/`max` checks.
///
/// Numbers compare with numbers and text with text; anything else is
/// incomparable.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Size of a text (in characters), sequence, or mapping.
pub(crate) fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

/// Fixed allowed set for the `enum` feature.
#[derive(Debug)]
pub(crate) struct Enumeration {
    hashed: HashSet<ScalarKey>,
    unhashed: Vec<Value>,
    display: String,
}

impl Enumeration {
    pub(crate) fn new(allowed: &[Value]) -> Self {
        let mut hashed = HashSet::new();
        let mut unhashed = Vec::new();
        for value in allowed {
            match ScalarKey::of(value) {
                Some(key) => {
                    hashed.insert(key);
                }
                None => unhashed.push(value.clone()),
            }
        }
        Self {
            hashed,
            unhashed,
            display: Value::Array(allowed.to_vec()).to_string(),
        }
    }

    pub(crate) fn contains(&self, value: &Value) -> bool {
        match ScalarKey::of(value) {
            Some(key) => self.hashed.contains(&key),
            None => self.unhashed.iter().any(|allowed| values_equal(allowed, value)),
        }
    }

    /// The allowed set as written, for error messages.
    pub(crate) fn display(&self) -> &str {
        &self.display
    }
}

/// Static lookup table for the `map` feature.
#[derive(Debug)]
pub(crate) struct Remap {
    table: HashMap<ScalarKey, Value>,
    fallback: Option<Value>,
}

impl Remap {
    pub(crate) fn new(entries: Vec<(ScalarKey, Value)>, fallback: Option<Value>) -> Self {
        Self {
            table: entries.into_iter().collect(),
            fallback,
        }
    }

    /// Substitute `value` if the table has an entry for it.
    ///
    /// Returns `None` when the value passes through unchanged. Containers
    /// are never remapped.
    pub(crate) fn lookup(&self, value: &Value) -> Option<Value> {
        let key = ScalarKey::of(value)?;
        self.table.get(&key).or(self.fallback.as_ref()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integral_float_matches_integer_key() {
        assert_eq!(ScalarKey::of(&json!(1.0)), ScalarKey::of(&json!(1)));
        assert_ne!(ScalarKey::of(&json!(1.5)), ScalarKey::of(&json!(1)));
        assert_eq!(ScalarKey::of(&json!([1])), None);
    }

    #[test]
    fn test_values_equal_nested() {
        assert!(values_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_compare_mixed_numbers_and_text() {
        assert_eq!(compare(&json!(1), &json!(1.5)), Some(Ordering::Less));
        assert_eq!(compare(&json!("chicken"), &json!("flight")), Some(Ordering::Less));
        assert_eq!(compare(&json!("1"), &json!(1)), None);
    }

    #[test]
    fn test_length() {
        assert_eq!(length(&json!("héllo")), Some(5));
        assert_eq!(length(&json!([1, 2])), Some(2));
        assert_eq!(length(&json!({"a": 1})), Some(1));
        assert_eq!(length(&json!(3)), None);
    }

    #[test]
    fn test_enumeration_hashed_and_linear() {
        let e = Enumeration::new(&[json!(1.0), json!("2"), json!({}), Value::Null]);
        assert!(e.contains(&json!(1)));
        assert!(e.contains(&json!({})));
        assert!(e.contains(&Value::Null));
        assert!(!e.contains(&json!("1")));
        assert!(!e.contains(&json!([])));
        assert_eq!(e.display(), r#"[1.0,"2",{},null]"#);
    }

    #[test]
    fn test_remap_fallback() {
        let r = Remap::new(
            vec![(ScalarKey::Str("a".into()), json!(1))],
            Some(json!("other")),
        );
        assert_eq!(r.lookup(&json!("a")), Some(json!(1)));
        assert_eq!(r.lookup(&json!("zzz")), Some(json!("other")));
        assert_eq!(r.lookup(&json!({})), None);
    }
}
