//! # Rule Resolution and Batch Compilation
//!
//! A [`Compiler`] turns one registration batch into staged programs without
//! touching the registry it reads from.
//!
//! ## Resolution
//!
//! Every sub-rule position is resolved to one of:
//!
//! - **Named**: a string. Always compiles to the name's link, whether or
//!   not the name is defined yet. If a rule is known for the name, its
//!   entry metadata (default, rename, synonyms, required) is returned too.
//! - **Inline**: a non-empty mapping. Its identity is looked up in the
//!   published cache, then the batch's staged cache; on a miss it is
//!   scheduled on the worklist under a fresh identity link.
//! - **Empty**: `null` or `{}`; the value passes through.
//!
//! Inheritance (`rules: <base>`) is flattened before hashing, so a rule's
//! identity covers everything it inherited. The chain is followed
//! transitively; a loop is a registration error.
//!
//! A mapping entry that names another schema copies that schema's entry
//! metadata into the program when it compiles. The identity therefore
//! covers the copied metadata too: a rule referring to `b` after `b` was
//! redefined with a different rename or default does not share the
//! program compiled under the old definition.
//!
//! ## Termination
//!
//! Named references are never inlined and the worklist is deduplicated by
//! identity, so self- and mutually-referencing schemas compile in one pass
//! over their distinct rules.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use coercer_core::{Options, SchemaId};

use crate::combinator::{AnyOf, OneOf};
use crate::compile::{Callee, FullMatch, Program, Step};
use crate::error::SchemaError;
use crate::guard::{Bindings, Link};
use crate::items::{Entry, MappingItems, OpenRule, PatternEntry, SequenceItems, Structure};
use crate::registry::Registry;
use crate::rule::{Kind, RuleSpec};
use crate::selftest::ExampleCase;
use crate::value::{Enumeration, Remap, ScalarKey};

/// Features of a named schema that a mapping entry referring to it copies.
const ENTRY_METADATA: [&str; 4] = ["default", "required", "rename", "synonyms"];

/// Keys of a named entry reference in the identity form of a rule.
const ENTRY_NAME: &str = "$entry";
const ENTRY_CAPTURED: &str = "$captured";

/// Everything a batch adds to the registry, held back until it is
/// published.
#[derive(Debug, Default)]
pub(crate) struct Staged {
    /// Links for names the registry has never seen.
    pub name_links: HashMap<String, Arc<Link>>,
    /// Identity links for rules first compiled in this batch.
    pub cache: HashMap<SchemaId, Arc<Link>>,
    /// Program each touched link will point at.
    pub bindings: Bindings,
    /// Links to bind on publish, in compilation order.
    pub bound: Vec<Arc<Link>>,
}

/// Outcome of resolving one sub-rule.
pub(crate) enum Resolved {
    Empty,
    Named {
        link: Arc<Link>,
        spec: Option<RuleSpec>,
    },
    Inline {
        link: Arc<Link>,
        spec: RuleSpec,
    },
}

impl Resolved {
    pub(crate) fn callee(&self) -> Callee {
        match self {
            Self::Empty => Callee::Pass,
            Self::Named { link, .. } | Self::Inline { link, .. } => Callee::Link(Arc::clone(link)),
        }
    }

    /// The referenced rule, when known, for entry metadata.
    pub(crate) fn spec(&self) -> Option<&RuleSpec> {
        match self {
            Self::Empty => None,
            Self::Named { spec, .. } => spec.as_ref(),
            Self::Inline { spec, .. } => Some(spec),
        }
    }
}

struct Task {
    id: SchemaId,
    link: Arc<Link>,
    rule: Map<String, Value>,
    options: Options,
    label: String,
}

pub(crate) struct Compiler<'r> {
    registry: &'r Registry,
    batch: &'r Map<String, Value>,
    options: &'r Options,
    staged: Staged,
    todo: VecDeque<Task>,
    named: Vec<(Arc<Link>, Arc<Link>)>,
    examples: Vec<ExampleCase>,
}

impl<'r> Compiler<'r> {
    /// `batch` holds canonical rules; they shadow the registry's rules of
    /// the same name.
    pub(crate) fn new(
        registry: &'r Registry,
        batch: &'r Map<String, Value>,
        options: &'r Options,
    ) -> Self {
        Self {
            registry,
            batch,
            options,
            staged: Staged::default(),
            todo: VecDeque::new(),
            named: Vec::new(),
            examples: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'r Value> {
        self.batch
            .get(name)
            .or_else(|| self.registry.schema_rule(name))
    }

    fn name_link(&mut self, name: &str) -> Arc<Link> {
        if let Some(link) = self.registry.name_link(name) {
            return link;
        }
        Arc::clone(
            self.staged
                .name_links
                .entry(name.to_string())
                .or_insert_with(|| Link::new(name)),
        )
    }

    /// Merge inherited rules under `rule`; the rule's own features win.
    fn flatten(
        &self,
        rule: &Map<String, Value>,
        label: &str,
    ) -> Result<Map<String, Value>, SchemaError> {
        let mut flat = rule.clone();
        let mut chain = vec![label.to_string()];
        while let Some(base) = flat.remove("rules") {
            let name = match base {
                Value::Null => continue,
                Value::String(name) => name,
                _ => return Err(SchemaError::malformed(label, "'rules' must be a schema name")),
            };
            if chain.contains(&name) {
                chain.push(name);
                return Err(SchemaError::InheritanceCycle { chain });
            }
            let base_rule = match self.lookup(&name) {
                Some(Value::Object(base_rule)) => base_rule,
                Some(_) => {
                    return Err(SchemaError::malformed(
                        label,
                        format!("base schema '{name}' is not a rule mapping"),
                    ))
                }
                None => {
                    return Err(SchemaError::UnknownBase {
                        rule: label.to_string(),
                        name,
                    })
                }
            };
            chain.push(name);
            let mut merged = base_rule.clone();
            merged.extend(flat);
            flat = merged;
        }
        Ok(flat)
    }

    /// The form of `rule` its identity is computed over: inline sub-rules
    /// flattened, named mapping entries paired with the metadata they copy.
    fn identity_form(
        &self,
        rule: &Map<String, Value>,
        label: &str,
    ) -> Result<Value, SchemaError> {
        let mut form = rule.clone();
        for feature in ["items", "pattern_items"] {
            if let Some(Value::Object(entries)) = rule.get(feature) {
                let mut expanded = Map::new();
                for (key, sub) in entries {
                    let sub = match sub {
                        Value::String(name) => self.named_entry(name)?,
                        other => self.sub_form(other, label)?,
                    };
                    expanded.insert(key.clone(), sub);
                }
                form.insert(feature.to_string(), Value::Object(expanded));
            }
        }
        for feature in ["keys", "values"] {
            if let Some(sub) = rule.get(feature) {
                form.insert(feature.to_string(), self.sub_form(sub, label)?);
            }
        }
        for feature in ["any_of", "one_of"] {
            if let Some(Value::Array(subs)) = rule.get(feature) {
                let subs = subs
                    .iter()
                    .map(|sub| self.sub_form(sub, label))
                    .collect::<Result<Vec<_>, _>>()?;
                form.insert(feature.to_string(), Value::Array(subs));
            }
        }
        Ok(Value::Object(form))
    }

    fn sub_form(&self, rule: &Value, label: &str) -> Result<Value, SchemaError> {
        match rule {
            Value::Object(features) => self.identity_form(&self.flatten(features, label)?, label),
            other => Ok(other.clone()),
        }
    }

    fn named_entry(&self, name: &str) -> Result<Value, SchemaError> {
        let mut captured = Map::new();
        if let Some(Value::Object(features)) = self.lookup(name) {
            let flat = self.flatten(features, name)?;
            for key in ENTRY_METADATA {
                if let Some(value) = flat.get(key) {
                    captured.insert(key.to_string(), value.clone());
                }
            }
        }
        let mut entry = Map::new();
        entry.insert(ENTRY_NAME.to_string(), Value::String(name.to_string()));
        entry.insert(ENTRY_CAPTURED.to_string(), Value::Object(captured));
        Ok(Value::Object(entry))
    }

    pub(crate) fn resolve(
        &mut self,
        rule: &Value,
        options: &Options,
        label: &str,
    ) -> Result<Resolved, SchemaError> {
        match rule {
            Value::Null => Ok(Resolved::Empty),
            Value::String(name) => {
                let link = self.name_link(name);
                let spec = match self.lookup(name) {
                    Some(Value::Object(features)) => {
                        let flat = self.flatten(features, name)?;
                        Some(RuleSpec::parse(&flat, name)?)
                    }
                    _ => None,
                };
                Ok(Resolved::Named { link, spec })
            }
            Value::Object(features) => {
                let flat = self.flatten(features, label)?;
                if flat.is_empty() {
                    return Ok(Resolved::Empty);
                }
                let spec = RuleSpec::parse(&flat, label)?;
                let link = self.schedule(flat, options, label)?;
                Ok(Resolved::Inline { link, spec })
            }
            _ => Err(SchemaError::malformed(
                label,
                "a rule must be a mapping, a schema name, or null",
            )),
        }
    }

    /// Find or schedule the compiled artifact for `rule` under `options`.
    fn schedule(
        &mut self,
        rule: Map<String, Value>,
        options: &Options,
        label: &str,
    ) -> Result<Arc<Link>, SchemaError> {
        let id = SchemaId::of(&self.identity_form(&rule, label)?, options)?;
        if let Some(link) = self
            .registry
            .cached(&id)
            .or_else(|| self.staged.cache.get(&id).cloned())
        {
            debug!(schema = label, identity = %id.short(), "reusing compiled rule");
            return Ok(link);
        }
        let link = Link::new(label);
        self.staged.cache.insert(id, Arc::clone(&link));
        self.todo.push_back(Task {
            id,
            link: Arc::clone(&link),
            rule,
            options: options.clone(),
            label: label.to_string(),
        });
        Ok(link)
    }

    /// Compile a top-level schema of the batch.
    pub(crate) fn compile_named(&mut self, name: &str, rule: &Value) -> Result<(), SchemaError> {
        let name_link = self.name_link(name);
        let options = self.options.clone();
        let target = match rule {
            Value::String(alias) => {
                let target = self.name_link(alias);
                let id = SchemaId::of(rule, &options)?;
                let program = Program::new(
                    id,
                    name.to_string(),
                    options.break_loops,
                    vec![Step::Refer(target)],
                );
                self.staged.bindings.insert(name_link.id(), Arc::new(program));
                self.staged.bound.push(name_link);
                return Ok(());
            }
            Value::Null => self.schedule(Map::new(), &options, name)?,
            Value::Object(features) => {
                let flat = self.flatten(features, name)?;
                self.schedule(flat, &options, name)?
            }
            _ => {
                return Err(SchemaError::malformed(
                    name,
                    "a schema must be a mapping, a schema name, or null",
                ))
            }
        };
        self.named.push((name_link, target));
        self.drain()
    }

    fn drain(&mut self) -> Result<(), SchemaError> {
        while let Some(task) = self.todo.pop_front() {
            let program = self.compile(&task)?;
            debug!(
                schema = program.label(),
                identity = %task.id.short(),
                steps = program.step_count(),
                "compiled rule"
            );
            self.staged.bindings.insert(task.link.id(), Arc::new(program));
            self.staged.bound.push(task.link);
        }
        Ok(())
    }

    /// Point every compiled name at its program and hand back the staging
    /// area and the collected examples.
    pub(crate) fn finish(mut self) -> Result<(Staged, Vec<ExampleCase>), SchemaError> {
        self.drain()?;
        for (name_link, target) in std::mem::take(&mut self.named) {
            let program = self
                .staged
                .bindings
                .get(&target.id())
                .cloned()
                .or_else(|| target.current());
            if let Some(program) = program {
                self.staged.bindings.insert(name_link.id(), program);
                self.staged.bound.push(name_link);
            }
        }
        Ok((self.staged, self.examples))
    }

    // ─── Per-Feature Compilation ─────────────────────────────────────

    fn compile(&mut self, task: &Task) -> Result<Program, SchemaError> {
        let label = task.label.as_str();
        let spec = RuleSpec::parse(&task.rule, label)?;
        let inner = task.options.overridden_by(&spec.overrides);
        let registry = self.registry;
        let coercions = registry.coercions();
        let mut steps = Vec::new();

        if spec.nullable || spec.if_null.is_some() {
            let post = match &spec.post_coerce {
                Some(name) => Some(coercions.resolve(name, label)?),
                None => None,
            };
            steps.push(Step::Nullable {
                fallback: spec.if_null.clone(),
                post,
            });
        }
        if let Some(kind) = spec.kind {
            steps.push(Step::Type(kind));
        }
        if let Some(name) = &spec.coerce {
            steps.push(Step::Coerce(coercions.resolve(name, label)?));
        }
        if let Some(source) = &spec.regex {
            steps.push(Step::Regex(FullMatch::new(source, label)?));
        }
        if spec.has_structure() {
            let structure = self.structure(&spec, &inner, label)?;
            steps.push(Step::Structure(Box::new(structure)));
        }
        if let Some(table) = &spec.remap {
            steps.push(Step::Remap(parse_remap(table, label)?));
        }
        if let Some(allowed) = &spec.enumeration {
            steps.push(Step::Enum(Enumeration::new(allowed)));
        }
        if let Some(bound) = &spec.min {
            steps.push(Step::Min(bound.clone()));
        }
        if let Some(bound) = &spec.max {
            steps.push(Step::Max(bound.clone()));
        }
        if let Some(bound) = spec.min_len {
            steps.push(Step::MinLen(bound));
        }
        if let Some(bound) = spec.max_len {
            steps.push(Step::MaxLen(bound));
        }
        if let Some(rules) = &spec.any_of {
            let branches = self.branches(rules, &inner, label, "any_of")?;
            steps.push(Step::AnyOf(AnyOf::new(branches)));
        }
        if let Some(rules) = &spec.one_of {
            let branches = self.branches(rules, &inner, label, "one_of")?;
            steps.push(Step::OneOf(OneOf::new(branches)));
        }
        if let Some(name) = &spec.post_coerce {
            steps.push(Step::PostCoerce(coercions.resolve(name, label)?));
        }

        if !spec.examples.is_empty() || !spec.negative_examples.is_empty() {
            self.examples.push(ExampleCase {
                label: task.label.clone(),
                link: Arc::clone(&task.link),
                positive: spec.examples,
                negative: spec.negative_examples,
            });
        }
        Ok(Program::new(
            task.id,
            task.label.clone(),
            task.options.break_loops,
            steps,
        ))
    }

    fn branches(
        &mut self,
        rules: &[Value],
        options: &Options,
        label: &str,
        feature: &str,
    ) -> Result<Vec<Callee>, SchemaError> {
        rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let resolved = self.resolve(rule, options, &format!("{label}.{feature}[{i}]"))?;
                Ok(resolved.callee())
            })
            .collect()
    }

    fn open_callee(
        &mut self,
        rule: Option<&Value>,
        options: &Options,
        label: String,
    ) -> Result<Option<Callee>, SchemaError> {
        match rule {
            None => Ok(None),
            Some(rule) => Ok(Some(self.resolve(rule, options, &label)?.callee())),
        }
    }

    fn structure(
        &mut self,
        spec: &RuleSpec,
        inner: &Options,
        label: &str,
    ) -> Result<Structure, SchemaError> {
        let keys = self
            .open_callee(spec.keys.as_ref(), inner, format!("{label}.keys"))?
            .filter(|callee| !matches!(callee, Callee::Pass));
        let values = self.open_callee(spec.values.as_ref(), inner, format!("{label}.values"))?;
        let open = (spec.keys.is_some() || spec.values.is_some()).then_some(OpenRule { keys, values });

        let sequence = match spec.kind {
            Some(Kind::List) => true,
            Some(Kind::Dict) => false,
            _ => open.is_some(),
        }
        .then(|| SequenceItems::new(open.clone().unwrap_or_default()));

        if spec.kind == Some(Kind::List) {
            return Ok(Structure {
                mapping: None,
                sequence,
            });
        }

        let mut entries = Vec::new();
        for (key, rule) in spec.items.iter().flatten() {
            let resolved = self.resolve(rule, inner, &format!("{label}.{key}"))?;
            let meta = resolved.spec();
            entries.push(Entry {
                key: key.clone(),
                output: meta
                    .and_then(|m| m.rename.clone())
                    .unwrap_or_else(|| key.clone()),
                synonyms: meta.map(|m| m.synonyms.clone()).unwrap_or_default(),
                default: meta.and_then(|m| m.default.clone()),
                required: meta
                    .and_then(|m| m.required)
                    .unwrap_or(inner.require_all),
                callee: resolved.callee(),
            });
        }

        let mut patterns = Vec::new();
        for (source, rule) in spec.pattern_items.iter().flatten() {
            let resolved = self.resolve(rule, inner, &format!("{label}.{source}"))?;
            patterns.push(PatternEntry {
                pattern: FullMatch::new(source, label)?,
                rename: resolved.spec().and_then(|m| m.rename.clone()),
                callee: resolved.callee(),
            });
        }

        Ok(Structure {
            mapping: Some(MappingItems::new(
                entries,
                patterns,
                open,
                inner.unknown_keys(),
            )),
            sequence,
        })
    }
}

/// Build the `map` lookup table from an object or a list of
/// `[from, to]` pairs. A `null` source in pair form is the fallback.
fn parse_remap(table: &Value, label: &str) -> Result<Remap, SchemaError> {
    match table {
        Value::Object(entries) => Ok(Remap::new(
            entries
                .iter()
                .map(|(from, to)| (ScalarKey::Str(from.clone()), to.clone()))
                .collect(),
            None,
        )),
        Value::Array(pairs) => {
            let mut entries = Vec::new();
            let mut fallback = None;
            for pair in pairs {
                let Some([from, to]) = pair.as_array().map(Vec::as_slice) else {
                    return Err(SchemaError::malformed(label, "'map' pairs must be [from, to]"));
                };
                if from.is_null() {
                    fallback = Some(to.clone());
                    continue;
                }
                let key = ScalarKey::of(from)
                    .ok_or_else(|| SchemaError::malformed(label, "'map' sources must be scalars"))?;
                entries.push((key, to.clone()));
            }
            Ok(Remap::new(entries, fallback))
        }
        _ => Err(SchemaError::malformed(
            label,
            "'map' must be a mapping or a list of pairs",
        )),
    }
}
