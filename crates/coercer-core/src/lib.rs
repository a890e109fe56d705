//! # coercer-core: Foundational Types for the Rule Engine
//!
//! This crate is the leaf of the coercer workspace. It defines the
//! primitives the compilation engine builds on and depends on nothing
//! internal.
//!
//! ## Key Design Principles
//!
//! 1. **`CanonicalBytes` newtype.** ALL identity hashing flows through
//!    `CanonicalBytes::new()`. Two rules that differ only in key order
//!    produce the same bytes; an integer and a float never do.
//!
//! 2. **`SchemaId` is content-derived.** A compiled artifact is keyed by
//!    the digest of `(canonical rule, effective options)`, never by the
//!    name a schema was registered under.
//!
//! 3. **`Options` is an immutable snapshot.** Per-rule overrides derive a
//!    new snapshot; a shared one is never mutated.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `coercer-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod options;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{CanonicalizationError, OptionsError};
pub use identity::SchemaId;
pub use options::{Options, OptionsOverride, UnknownKeys};
