//! # Registration Self-Test
//!
//! Rules may carry `examples` (values that must validate) and
//! `negative_examples` (values that must not). The compiler collects them
//! per compiled artifact; once the whole batch is compiled they are
//! replayed against the staged programs. The first mismatch fails the
//! batch.

use std::sync::Arc;

use serde_json::Value;

use crate::error::SchemaError;
use crate::guard::{Bindings, Link, Scope};

/// Examples attached to one compiled rule.
#[derive(Debug)]
pub(crate) struct ExampleCase {
    pub label: String,
    pub link: Arc<Link>,
    pub positive: Vec<Value>,
    pub negative: Vec<Value>,
}

/// Replay every case against the staged bindings.
pub(crate) fn run(cases: &[ExampleCase], staged: &Bindings) -> Result<(), SchemaError> {
    let scope = Scope::staged(staged);
    for case in cases {
        for example in &case.positive {
            if let Err(err) = case.link.invoke(example, &scope) {
                return Err(SchemaError::ExampleRejected {
                    rule: case.label.clone(),
                    example: example.to_string(),
                    error: err.to_string(),
                });
            }
        }
        for example in &case.negative {
            if case.link.invoke(example, &scope).is_ok() {
                return Err(SchemaError::NegativeExampleAccepted {
                    rule: case.label.clone(),
                    example: example.to_string(),
                });
            }
        }
    }
    Ok(())
}
