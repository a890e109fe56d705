#![recursion_limit = "256"]
//! # coercer-schema: Rule Compilation Engine
//!
//! Compiles declarative validation and normalization rules into executable
//! validators. A rule is a mapping of features (`type`, `coerce`, `items`,
//! `any_of`, ...), the name of another rule, or empty. Validators check a
//! JSON value and return its normalized form, or a [`ValidationError`]
//! naming the offending path.
//!
//! ```text
//! registry.register(batch)
//!   ├── canonicalize      feature and type-tag aliases collapsed
//!   ├── meta::check       schema-of-schemas (validate_schemas)
//!   ├── Compiler          worklist over distinct rule identities
//!   ├── selftest::run     examples against staged programs
//!   └── publish           bind links, extend names and cache
//! ```
//!
//! ## Key Design Principles
//!
//! 1. **Identity is content-derived.** Structurally identical rules under
//!    identical options compile once and share one program, whatever
//!    names they were registered under.
//!
//! 2. **References are late-bound.** A name compiles to its link, so
//!    schemas may reference each other in any order, recursively, and
//!    across batches.
//!
//! 3. **Batches are atomic.** Nothing from a batch becomes visible until
//!    every schema in it compiled and passed its own examples.
//!
//! 4. **Validators are shareable.** Published programs are immutable and
//!    `Send + Sync`; all per-call state lives in the caller's stack frame.
//!
//! ## Crate Policy
//!
//! - Depends only on `coercer-core` internally.
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod coerce;
mod combinator;
mod compile;
pub mod error;
mod guard;
mod items;
pub mod meta;
pub mod registry;
mod resolve;
pub mod rule;
mod selftest;
mod value;

/// Invocation parameters available to coercions and `if_null` fallbacks.
pub type Context = serde_json::Map<String, serde_json::Value>;

pub use coerce::{Coercion, CoercionTable};
pub use error::{CoercionError, PathSegment, SchemaError, ValidationError, INPUT_ROOT};
pub use registry::{Registry, RegistryBuilder, Validator};
pub use rule::{canonicalize, Kind};

pub use coercer_core::{Options, OptionsOverride, SchemaId, UnknownKeys};
