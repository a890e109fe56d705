//! # Options: Immutable Configuration Snapshot
//!
//! Cross-cutting policy for rule compilation. A registry carries default
//! options, a registration batch may replace them, and an individual rule
//! may override the structural switches for itself and everything nested
//! under it. Each override produces a new `Options` value; a shared
//! snapshot is never mutated.
//!
//! Options can be loaded from JSON or YAML configuration text. The legacy
//! spellings `allow_unkown` and `purge_unkown` are accepted as aliases.

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Policy applied to mapping keys that no structural rule claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeys {
    /// Reject the input, listing the offending keys.
    Forbid,
    /// Drop unknown keys from the output.
    Purge,
    /// Pass unknown keys through unchanged.
    Allow,
}

/// Configuration snapshot controlling compilation policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Whether mapping keys not claimed by any structural rule are permitted.
    #[serde(alias = "allow_unkown")]
    pub allow_unknown: bool,
    /// Whether permitted unknown keys are dropped from the output.
    #[serde(alias = "purge_unkown")]
    pub purge_unknown: bool,
    /// Whether declared mapping entries are required unless stated otherwise.
    pub require_all: bool,
    /// Whether a validator re-entered on the same in-flight value is treated
    /// as satisfied. When off, the re-entry is reported as a failure.
    pub break_loops: bool,
    /// Whether submitted schemas are checked against the schema-of-schemas
    /// and their examples replayed at registration time.
    pub validate_schemas: bool,
    /// Whether each submitted schema is a bare mapping of entry rules,
    /// wrapped as `{type: dict, items: <schema>}` before compilation.
    pub load_as_jsonschema: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allow_unknown: true,
            purge_unknown: false,
            require_all: false,
            break_loops: true,
            validate_schemas: true,
            load_as_jsonschema: false,
        }
    }
}

/// Per-rule overrides of the structural switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsOverride {
    /// Local `allow_unknown`.
    pub allow_unknown: Option<bool>,
    /// Local `purge_unknown`.
    pub purge_unknown: Option<bool>,
    /// Local `require_all`.
    pub require_all: Option<bool>,
}

impl Options {
    /// Parse options from a JSON document. Missing fields take defaults.
    pub fn from_json_str(text: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse options from a YAML document. Missing fields take defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, OptionsError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Derive a new snapshot with the given per-rule overrides applied.
    pub fn overridden_by(&self, overrides: &OptionsOverride) -> Self {
        Self {
            allow_unknown: overrides.allow_unknown.unwrap_or(self.allow_unknown),
            purge_unknown: overrides.purge_unknown.unwrap_or(self.purge_unknown),
            require_all: overrides.require_all.unwrap_or(self.require_all),
            ..self.clone()
        }
    }

    /// The effective policy for unclaimed mapping keys.
    ///
    /// Forbidding takes precedence over purging.
    pub fn unknown_keys(&self) -> UnknownKeys {
        if !self.allow_unknown {
            UnknownKeys::Forbid
        } else if self.purge_unknown {
            UnknownKeys::Purge
        } else {
            UnknownKeys::Allow
        }
    }
}
