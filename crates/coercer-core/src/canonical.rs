//! # Canonical Rule Bytes
//!
//! `CanonicalBytes` is the only input [`sha256_digest`](crate::sha256_digest)
//! accepts. Its inner buffer is private and `CanonicalBytes::new()` is the
//! only constructor, so every identity in the engine is computed over the
//! same byte layout:
//!
//! 1. the value is converted to a JSON tree;
//! 2. every non-integer number becomes `{"$f64": "<repr>"}`;
//! 3. the tree is written as RFC 8785 JSON (`serde_jcs`): sorted keys,
//!    compact separators.
//!
//! Step 2 exists because JCS prints `1.0` as `1`. Rules with `enum: [1.0]`
//! and `enum: [1]` render different error text and must not share an
//! artifact. Step 3 makes the submitted key order irrelevant.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CanonicalizationError;

/// Marker key used to tag floating-point numbers in canonical form.
pub const FLOAT_TAG: &str = "$f64";

/// JCS bytes of a float-tagged JSON tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// # Errors
    ///
    /// Returns `CanonicalizationError::SerializationFailed` if `obj` has no
    /// JSON representation (for example a map with non-string keys).
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let tree = tag_floats(serde_json::to_value(obj)?);
        Ok(Self(serde_jcs::to_string(&tree)?.into_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn tag_floats(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) => {
                let mut tagged = Map::new();
                tagged.insert(FLOAT_TAG.to_string(), Value::String(format!("{f:?}")));
                Value::Object(tagged)
            }
            None => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(tag_floats).collect()),
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key, tag_floats(value)))
                .collect(),
        ),
        scalar => scalar,
    }
}
