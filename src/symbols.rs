//! Operations, operation classes and the symbol table that names them.
//!
//! A symbol is a stable string (`math.add`, `RaggedTensor`) that resolves
//! to a live target and back. Layer configs store symbols, never targets.

use crate::placeholder::PlaceholderKind;
use crate::value::{CallArgs, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        TargetId(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub type OpFn = Arc<dyn Fn(&CallArgs) -> anyhow::Result<Value> + Send + Sync>;

/// Kind of placeholder a recorded call produces, decided from its arguments.
pub type OutputRule = fn(&CallArgs) -> PlaceholderKind;

pub fn dense_output(_args: &CallArgs) -> PlaceholderKind {
    PlaceholderKind::Dense
}

pub fn sparse_output(_args: &CallArgs) -> PlaceholderKind {
    PlaceholderKind::Sparse
}

/// Same kind as the first placeholder argument, dense if there is none.
pub fn like_first_input(args: &CallArgs) -> PlaceholderKind {
    args.placeholders()
        .first()
        .map(|p| p.kind())
        .unwrap_or(PlaceholderKind::Dense)
}

struct OperationInner {
    id: TargetId,
    name: String,
    output: OutputRule,
    body: OpFn,
}

/// A free operation. Identity is by construction, not by name.
#[derive(Clone)]
pub struct Operation(Arc<OperationInner>);

impl Operation {
    pub fn new<F>(name: impl Into<String>, output: OutputRule, body: F) -> Self
    where
        F: Fn(&CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(OperationInner {
            id: TargetId::next(),
            name: name.into(),
            output,
            body: Arc::new(body),
        }))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn output_kind(&self, args: &CallArgs) -> PlaceholderKind {
        (self.0.output)(args)
    }

    pub fn call(&self, args: &CallArgs) -> anyhow::Result<Value> {
        (self.0.body)(args)
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<operation {}>", self.0.name)
    }
}

#[derive(Clone)]
pub struct MethodDef {
    name: String,
    output: OutputRule,
    body: OpFn,
}

impl MethodDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_kind(&self, args: &CallArgs) -> PlaceholderKind {
        (self.output)(args)
    }

    pub fn call(&self, args: &CallArgs) -> anyhow::Result<Value> {
        (self.body)(args)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<method {}>", self.name)
    }
}

struct OpClassInner {
    id: TargetId,
    name: String,
    methods: BTreeMap<String, MethodDef>,
}

/// A class exposing constructor-like class methods.
#[derive(Clone)]
pub struct OpClass(Arc<OpClassInner>);

impl OpClass {
    pub fn builder(name: impl Into<String>) -> OpClassBuilder {
        OpClassBuilder {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.0.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.0.methods.keys().map(|x| x.as_str())
    }
}

impl PartialEq for OpClass {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.0.name)
    }
}

pub struct OpClassBuilder {
    name: String,
    methods: BTreeMap<String, MethodDef>,
}

impl OpClassBuilder {
    pub fn method<F>(mut self, name: &str, output: OutputRule, body: F) -> Self
    where
        F: Fn(&CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.to_string(),
            MethodDef {
                name: name.to_string(),
                output,
                body: Arc::new(body),
            },
        );
        self
    }

    pub fn build(self) -> OpClass {
        OpClass(Arc::new(OpClassInner {
            id: TargetId::next(),
            name: self.name,
            methods: self.methods,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolTarget {
    Operation(Operation),
    Class(OpClass),
}

impl SymbolTarget {
    pub fn id(&self) -> TargetId {
        match self {
            SymbolTarget::Operation(x) => x.id(),
            SymbolTarget::Class(x) => x.id(),
        }
    }
}

impl From<Operation> for SymbolTarget {
    fn from(value: Operation) -> Self {
        SymbolTarget::Operation(value)
    }
}

impl From<OpClass> for SymbolTarget {
    fn from(value: OpClass) -> Self {
        SymbolTarget::Class(value)
    }
}

/// API namespaces, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ApiNamespace {
    Tf,
    Keras,
}

#[derive(Default)]
struct Namespace {
    by_name: HashMap<String, SymbolTarget>,
    canonical: HashMap<TargetId, String>,
}

/// Two-namespace symbol resolution service.
#[derive(Default)]
pub struct SymbolTable {
    tf: Namespace,
    keras: Namespace,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&self, api: ApiNamespace) -> &Namespace {
        match api {
            ApiNamespace::Tf => &self.tf,
            ApiNamespace::Keras => &self.keras,
        }
    }

    /// Export `target` as `name`. The first name a target is exported under
    /// in a namespace is its canonical name there; later ones are aliases.
    pub fn export(&mut self, api: ApiNamespace, name: &str, target: impl Into<SymbolTarget>) {
        let target = target.into();
        let namespace = match api {
            ApiNamespace::Tf => &mut self.tf,
            ApiNamespace::Keras => &mut self.keras,
        };
        namespace
            .canonical
            .entry(target.id())
            .or_insert_with(|| name.to_string());
        namespace.by_name.insert(name.to_string(), target);
    }

    pub fn name_in(&self, api: ApiNamespace, target: &SymbolTarget) -> Option<&str> {
        self.namespace(api)
            .canonical
            .get(&target.id())
            .map(|x| x.as_str())
    }

    /// Canonical framework name, falling back to the secondary namespace.
    pub fn canonical_name(&self, target: &SymbolTarget) -> Option<String> {
        [ApiNamespace::Tf, ApiNamespace::Keras]
            .into_iter()
            .find_map(|api| self.name_in(api, target))
            .map(|x| x.to_string())
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolTarget> {
        [ApiNamespace::Tf, ApiNamespace::Keras]
            .into_iter()
            .find_map(|api| self.namespace(api).by_name.get(name).cloned())
    }

    pub fn lookup_operation(&self, name: &str) -> Option<Operation> {
        match self.lookup(name)? {
            SymbolTarget::Operation(x) => Some(x),
            SymbolTarget::Class(_) => None,
        }
    }

    pub fn lookup_class(&self, name: &str) -> Option<OpClass> {
        match self.lookup(name)? {
            SymbolTarget::Class(x) => Some(x),
            SymbolTarget::Operation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Operation {
        Operation::new(name, dense_output, |_| Ok(Value::None))
    }

    #[test]
    fn test_first_export_is_canonical() {
        let op = noop("boolean_mask");
        let mut table = SymbolTable::new();
        table.export(ApiNamespace::Tf, "boolean_mask", op.clone());
        table.export(ApiNamespace::Tf, "compat.v1.boolean_mask", op.clone());
        let target = SymbolTarget::from(op.clone());
        assert_eq!(table.canonical_name(&target).as_deref(), Some("boolean_mask"));
        assert_eq!(table.lookup_operation("compat.v1.boolean_mask"), Some(op));
    }

    #[test]
    fn test_secondary_namespace_fallback() {
        let op = noop("layer_norm");
        let mut table = SymbolTable::new();
        table.export(ApiNamespace::Keras, "ops.layer_norm", op.clone());
        let target = SymbolTarget::from(op);
        assert_eq!(table.name_in(ApiNamespace::Tf, &target), None);
        assert_eq!(table.canonical_name(&target).as_deref(), Some("ops.layer_norm"));
        assert!(table.lookup("ops.layer_norm").is_some());
    }

    #[test]
    fn test_unexported_target_has_no_name() {
        let table = SymbolTable::new();
        let target = SymbolTarget::from(noop("private"));
        assert_eq!(table.canonical_name(&target), None);
        assert!(table.lookup("private").is_none());
    }
}
