//! # Structural Schema Identity
//!
//! `SchemaId` is the cache key of the compilation engine: a digest over a
//! rule's canonical form and the compile-relevant part of the effective
//! [`Options`]. Two structurally identical `(rule, options)` pairs always
//! produce the same identity, regardless of the name they were registered
//! under or the key order they were written in.
//!
//! Batch-level switches (`validate_schemas`, `load_as_jsonschema`) act before
//! a rule is compiled and do not participate in the identity.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalBytes;
use crate::digest::{sha256_digest, ContentDigest};
use crate::error::CanonicalizationError;
use crate::options::Options;

/// Content-derived identity of a compiled validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId(pub ContentDigest);

/// The hashed view of a `(rule, options)` pair.
#[derive(Serialize)]
struct IdentityInput<'a, T: ?Sized> {
    rule: &'a T,
    options: PolicyView,
}

#[derive(Serialize)]
struct PolicyView {
    allow_unknown: bool,
    purge_unknown: bool,
    require_all: bool,
    break_loops: bool,
}

impl SchemaId {
    /// Compute the identity of `rule` compiled under `options`.
    ///
    /// `rule` is normally a `serde_json::Value` or a rule mapping.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError` if the rule cannot be serialized.
    pub fn of<T>(rule: &T, options: &Options) -> Result<Self, CanonicalizationError>
    where
        T: Serialize + ?Sized,
    {
        let input = IdentityInput {
            rule,
            options: PolicyView {
                allow_unknown: options.allow_unknown,
                purge_unknown: options.purge_unknown,
                require_all: options.require_all,
                break_loops: options.break_loops,
            },
        };
        let bytes = CanonicalBytes::new(&input)?;
        Ok(Self(sha256_digest(&bytes)))
    }

    /// Access the underlying digest.
    pub fn digest(&self) -> &ContentDigest {
        &self.0
    }

    /// Short hex prefix used in log fields and artifact labels.
    pub fn short(&self) -> String {
        self.0.hex_prefix(12)
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "schema:{:x}", self.0)
    }
}
