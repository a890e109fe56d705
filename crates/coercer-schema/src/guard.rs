//! # Links and the Run-Time Guard
//!
//! ## Links
//!
//! Every reference from one compiled program to another goes through a
//! [`Link`]: a slot that is bound to a program once that program exists.
//! Two kinds of link are created:
//!
//! - **Name links**, one per schema name. A reference by name always
//!   compiles to the name's link, so re-registering the name (or defining
//!   it after it was first referenced) is observed by every validator that
//!   already holds the link.
//! - **Identity links**, one per [`SchemaId`](coercer_core::SchemaId) in the
//!   compiled-validator cache. Inline sub-rules resolve to these.
//!
//! A link that is invoked while still unbound fails with
//! `schema <name> was not defined`.
//!
//! ## Staging Overlay
//!
//! While a batch is being registered its programs are not yet published.
//! The self-test runs through a [`Scope`] carrying the batch's staged
//! bindings as an overlay, which links consult before their own slot.
//!
//! ## Re-entry Guard
//!
//! Each program run pushes a [`Frame`] onto a chain held by the `Scope` it
//! hands to its steps. Invoking a program that is already on the chain
//! with a value equal to the one it was entered with (a schema that
//! reaches itself without descending into the input) is detected here and
//! resolved by the program's loop policy.
//!
//! Values are compared structurally, not by address, so a loop still
//! trips the guard when a coercion, structure or remap step rebuilt the
//! value on the way round. A proper descendant of a finite value never
//! equals it, so recursion that descends into the input is never cut
//! short.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::compile::Program;
use crate::error::ValidationError;
use crate::Context;

/// Process-unique link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LinkId(u64);

impl LinkId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Staged link bindings of a batch that has not been published.
pub(crate) type Bindings = HashMap<LinkId, Arc<Program>>;

/// A late-bound reference to a compiled program.
pub(crate) struct Link {
    id: LinkId,
    label: String,
    target: RwLock<Option<Arc<Program>>>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("bound", &self.target.read().is_some())
            .finish()
    }
}

impl Link {
    pub(crate) fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: LinkId::next(),
            label: label.into(),
            target: RwLock::new(None),
        })
    }

    pub(crate) fn id(&self) -> LinkId {
        self.id
    }

    /// Point this link at `program`. Existing holders observe the change.
    pub(crate) fn bind(&self, program: Arc<Program>) {
        *self.target.write() = Some(program);
    }

    /// The published program, ignoring any staging overlay.
    pub(crate) fn current(&self) -> Option<Arc<Program>> {
        self.target.read().clone()
    }

    /// The program this link resolves to within `scope`.
    pub(crate) fn resolve(&self, scope: &Scope<'_>) -> Option<Arc<Program>> {
        scope
            .overlay
            .and_then(|overlay| overlay.get(&self.id).cloned())
            .or_else(|| self.current())
    }

    pub(crate) fn invoke(&self, value: &Value, scope: &Scope<'_>) -> Result<Value, ValidationError> {
        match self.resolve(scope) {
            Some(program) => program.run(value, scope, &self.label),
            None => Err(ValidationError::new(format!(
                "schema {} was not defined",
                self.label
            ))),
        }
    }
}

// ─── Scope ───────────────────────────────────────────────────────────

/// Per-call state threaded through every program invocation.
pub(crate) struct Scope<'a> {
    context: Option<&'a Context>,
    overlay: Option<&'a Bindings>,
    frame: Option<&'a Frame<'a>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(context: Option<&'a Context>) -> Self {
        Self {
            context,
            overlay: None,
            frame: None,
        }
    }

    /// A scope that sees `overlay` before published bindings.
    pub(crate) fn staged(overlay: &'a Bindings) -> Self {
        Self {
            context: None,
            overlay: Some(overlay),
            frame: None,
        }
    }

    pub(crate) fn context(&self) -> Option<&'a Context> {
        self.context
    }

    /// Whether `program` is already running on a value equal to `value`
    /// further up this call.
    pub(crate) fn is_in_flight(&self, program: &Program, value: &Value) -> bool {
        let mut frame = self.frame;
        while let Some(current) = frame {
            if std::ptr::eq(current.program, program)
                && (std::ptr::eq(current.value, value) || current.value == value)
            {
                return true;
            }
            frame = current.parent;
        }
        false
    }

    /// The scope seen by the steps of the program running in `frame`.
    pub(crate) fn within<'f>(&self, frame: &'f Frame<'f>) -> Scope<'f>
    where
        'a: 'f,
    {
        Scope {
            context: self.context,
            overlay: self.overlay,
            frame: Some(frame),
        }
    }
}

/// One running program and the value it was entered with.
pub(crate) struct Frame<'f> {
    program: &'f Program,
    value: &'f Value,
    parent: Option<&'f Frame<'f>>,
}

impl<'f> Frame<'f> {
    /// Push `program` on top of the chain carried by `scope`.
    pub(crate) fn new(program: &'f Program, value: &'f Value, scope: &Scope<'f>) -> Self {
        Self {
            program,
            value,
            parent: scope.frame,
        }
    }
}
