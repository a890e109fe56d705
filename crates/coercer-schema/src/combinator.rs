//! # Combinators
//!
//! `any_of` tries its branches in order and keeps the first success.
//! `one_of` runs every branch and succeeds only when exactly one passes;
//! two passing branches are ambiguous even if they agree on the result.
//!
//! Failures list every branch, numbered from 1. A branch's own failure is
//! rendered relative to the combinator's value (root `^`) and indented so
//! nested combinator reports stay readable.

use serde_json::Value;

use crate::compile::Callee;
use crate::error::ValidationError;
use crate::guard::Scope;

fn branch_report(err: &ValidationError) -> String {
    err.render("^").replace('\n', "\n  ")
}

#[derive(Debug)]
pub(crate) struct AnyOf {
    branches: Vec<Callee>,
}

impl AnyOf {
    pub(crate) fn new(branches: Vec<Callee>) -> Self {
        Self { branches }
    }

    pub(crate) fn apply(&self, value: &Value, scope: &Scope<'_>) -> Result<Value, ValidationError> {
        let mut message = format!("must satisfy any of {} rules:", self.branches.len());
        for (i, branch) in self.branches.iter().enumerate() {
            match branch.call(value, scope) {
                Ok(result) => return Ok(result),
                Err(err) => message.push_str(&format!("\n{}: {}", i + 1, branch_report(&err))),
            }
        }
        Err(ValidationError::new(message))
    }
}

#[derive(Debug)]
pub(crate) struct OneOf {
    branches: Vec<Callee>,
}

impl OneOf {
    pub(crate) fn new(branches: Vec<Callee>) -> Self {
        Self { branches }
    }

    pub(crate) fn apply(&self, value: &Value, scope: &Scope<'_>) -> Result<Value, ValidationError> {
        let outcomes: Vec<_> = self
            .branches
            .iter()
            .map(|branch| branch.call(value, scope))
            .collect();

        let mut passed = outcomes.iter().filter_map(|outcome| outcome.as_ref().ok());
        if let (Some(result), None) = (passed.next(), passed.next()) {
            return Ok(result.clone());
        }

        let mut message = format!("must satisfy exactly one of {} rules:", self.branches.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            let report = match outcome {
                Ok(_) => "ok".to_string(),
                Err(err) => branch_report(err),
            };
            message.push_str(&format!("\n{}: {}", i + 1, report));
        }
        Err(ValidationError::new(message))
    }
}
