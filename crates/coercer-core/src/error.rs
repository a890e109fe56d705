//! # Error Types
//!
//! Errors raised by the foundational layer. All errors use `thiserror` for
//! derive-based `Display` and `Error` implementations.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON conversion or JCS serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error while loading an [`Options`](crate::Options) snapshot from text.
#[derive(Error, Debug)]
pub enum OptionsError {
    /// The JSON document could not be parsed into options.
    #[error("invalid JSON options: {0}")]
    Json(#[from] serde_json::Error),

    /// The YAML document could not be parsed into options.
    #[error("invalid YAML options: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
