//! Recording calls on placeholders into a replayable graph.

pub mod config;
pub mod observer;

use crate::delegation::MemberKind;
use crate::dispatch::{Dispatch, DispatchRegistry, DispatchTarget};
use crate::graph::config::{GraphConfig, LayerEntry, NodeEntry};
use crate::graph::observer::GraphObserver;
use crate::layers::{
    AnyLayer, InstanceMethod, InstanceProperty, Layer, LayerContext, LayerError, LayerOptions,
    pack_call,
};
use crate::naming::NameScope;
use crate::placeholder::{Placeholder, PlaceholderClass, PlaceholderId, PlaceholderKind, Producer};
use crate::symbols::{OpClass, Operation};
use crate::value::{CallArgs, Value, ValueError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("Graph expects {expected} inputs, got {found}")]
    MissingInput { expected: usize, found: usize },
    #[error("Placeholder {0:?} does not belong to this graph")]
    UnknownPlaceholder(PlaceholderId),
    #[error("{class} placeholders do not delegate \"{member}\"")]
    NotDelegated {
        class: PlaceholderClass,
        member: String,
    },
    #[error("No layer named {0}")]
    UnknownLayer(String),
    #[error("Operation {operation} failed")]
    OperationFailed {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

static NEXT_BUILDER_SCOPE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeId {
    inner: usize,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.inner
    }
}

/// One application of a layer.
#[derive(Debug, Clone)]
pub struct GraphNode {
    id: NodeId,
    layer: Arc<AnyLayer>,
    inputs: CallArgs,
    output: Placeholder,
}

impl GraphNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn layer(&self) -> &AnyLayer {
        &self.layer
    }

    pub fn inputs(&self) -> &CallArgs {
        &self.inputs
    }

    pub fn output(&self) -> &Placeholder {
        &self.output
    }
}

/// An active construction context.
///
/// Calls made through the builder go through the registry's dispatchers;
/// those that involve placeholders are recorded as nodes.
pub struct GraphBuilder {
    registry: Arc<DispatchRegistry>,
    names: NameScope,
    scope: u64,
    next_placeholder_id: usize,
    inputs: Vec<Placeholder>,
    nodes: Vec<GraphNode>,
}

impl GraphBuilder {
    pub fn new(registry: Arc<DispatchRegistry>) -> Self {
        Self {
            registry,
            names: NameScope::new(),
            scope: NEXT_BUILDER_SCOPE.fetch_add(1, Ordering::Relaxed),
            next_placeholder_id: 0,
            inputs: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn names(&self) -> &NameScope {
        &self.names
    }

    pub fn layer_context(&self) -> LayerContext<'_> {
        LayerContext {
            names: &self.names,
            symbols: self.registry.symbols(),
        }
    }

    fn next_placeholder(&mut self) -> PlaceholderId {
        let id = PlaceholderId::new(self.next_placeholder_id);
        self.next_placeholder_id += 1;
        id
    }

    // Placeholders issued by another builder may reuse our ids.
    fn find_foreign<'a>(
        &self,
        mut placeholders: impl Iterator<Item = &'a Placeholder>,
    ) -> Option<&'a Placeholder> {
        placeholders
            .find(|p| p.scope() != self.scope || p.id().index() >= self.next_placeholder_id)
    }

    pub fn input(&mut self, kind: PlaceholderKind) -> Placeholder {
        let id = self.next_placeholder();
        let placeholder = Placeholder::input(self.scope, id, kind);
        self.inputs.push(placeholder.clone());
        placeholder
    }

    pub fn apply_layer(&mut self, layer: AnyLayer, args: CallArgs) -> Result<Value, GraphError> {
        self.apply_shared(Arc::new(layer), args)
    }

    /// Apply `layer` to `args`. Without placeholders among the arguments
    /// the layer runs immediately; otherwise the call is recorded and its
    /// output placeholder returned. The same layer may be applied at any
    /// number of positions.
    pub fn apply_shared(
        &mut self,
        layer: Arc<AnyLayer>,
        args: CallArgs,
    ) -> Result<Value, GraphError> {
        if !args.contains_placeholder() {
            return Ok(layer.call(&args)?);
        }
        if let Some(foreign) = self.find_foreign(args.placeholders().into_iter()) {
            return Err(GraphError::UnknownPlaceholder(foreign.id()));
        }

        let node = NodeId {
            inner: self.nodes.len(),
        };
        let kind = layer.output_kind(&args);
        let id = self.next_placeholder();
        let output = Placeholder::produced(
            self.scope,
            id,
            kind,
            Producer {
                node,
                layer_name: layer.name().to_string(),
                class_name: layer.class_name(),
            },
        );
        log::debug!(
            "Recorded {} {} as node {} producing {:?}",
            layer.class_name(),
            layer.name(),
            node.inner,
            kind
        );
        self.nodes.push(GraphNode {
            id: node,
            layer,
            inputs: args,
            output: output.clone(),
        });
        Ok(Value::Placeholder(output))
    }

    /// Call a free operation.
    pub fn call(&mut self, op: &Operation, args: CallArgs) -> Result<Value, GraphError> {
        let registry = self.registry.clone();
        match registry.dispatch(self, DispatchTarget::Operation(op), &args)? {
            Dispatch::Handled(value) => Ok(value),
            Dispatch::NotSupported => {
                op.call(&args)
                    .map_err(|source| GraphError::OperationFailed {
                        operation: op.name().to_string(),
                        source,
                    })
            }
        }
    }

    /// Call the operation exported as `tf.<symbol>`.
    pub fn call_symbol(&mut self, symbol: &str, args: CallArgs) -> Result<Value, GraphError> {
        let op = self
            .registry
            .symbols()
            .lookup_operation(symbol)
            .ok_or_else(|| LayerError::UnresolvedSymbol(symbol.to_string()))?;
        self.call(&op, args)
    }

    pub fn call_class_method(
        &mut self,
        class: &OpClass,
        method: &str,
        args: CallArgs,
    ) -> Result<Value, GraphError> {
        let registry = self.registry.clone();
        let target = DispatchTarget::ClassMethod { class, method };
        match registry.dispatch(self, target, &args)? {
            Dispatch::Handled(value) => Ok(value),
            Dispatch::NotSupported => {
                let def = class
                    .method(method)
                    .ok_or_else(|| LayerError::MissingClassMethod {
                        class: class.name().to_string(),
                        method: method.to_string(),
                    })?;
                def.call(&args).map_err(|source| GraphError::OperationFailed {
                    operation: format!("{}.{}", class.name(), method),
                    source,
                })
            }
        }
    }

    fn check_delegated(
        &self,
        target: &Placeholder,
        member: &str,
        kind: MemberKind,
    ) -> Result<(), GraphError> {
        match self.registry.delegations().lookup(target.class(), member) {
            Some(found) if found == kind => Ok(()),
            _ => Err(GraphError::NotDelegated {
                class: target.class(),
                member: member.to_string(),
            }),
        }
    }

    /// `target.<name>`
    pub fn get_property(&mut self, target: &Placeholder, name: &str) -> Result<Value, GraphError> {
        self.check_delegated(target, name, MemberKind::Property)?;
        let layer = InstanceProperty::new(self.layer_context(), name, LayerOptions::default())?;
        self.apply_layer(layer.into(), CallArgs::positional(vec![Value::from(target)]))
    }

    /// `target.<name>(*args, **kwargs)`
    pub fn call_method(
        &mut self,
        target: &Placeholder,
        name: &str,
        args: CallArgs,
    ) -> Result<Value, GraphError> {
        self.check_delegated(target, name, MemberKind::Method)?;
        let layer = InstanceMethod::new(self.layer_context(), name, LayerOptions::default())?;
        let mut inputs = vec![Value::from(target)];
        inputs.extend(pack_call(&args));
        self.apply_layer(layer.into(), CallArgs::positional(inputs))
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn build(self, outputs: &[Value]) -> Result<FunctionalGraph, GraphError> {
        let outputs = outputs
            .iter()
            .map(|x| {
                x.as_placeholder()
                    .cloned()
                    .ok_or_else(|| ValueError::mismatch("placeholder", x))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(foreign) = self.find_foreign(outputs.iter()) {
            return Err(GraphError::UnknownPlaceholder(foreign.id()));
        }
        Ok(FunctionalGraph {
            inputs: self.inputs,
            outputs,
            nodes: self.nodes,
        })
    }
}

/// A recorded computation that can be replayed on concrete inputs and
/// saved as a [`GraphConfig`].
#[derive(Debug, Clone)]
pub struct FunctionalGraph {
    inputs: Vec<Placeholder>,
    outputs: Vec<Placeholder>,
    nodes: Vec<GraphNode>,
}

// A single-element list argument becomes the element itself.
fn unnest(args: &CallArgs) -> CallArgs {
    CallArgs {
        args: args
            .args
            .iter()
            .map(|x| match x {
                Value::List(items) if items.len() == 1 => items[0].clone(),
                other => other.clone(),
            })
            .collect(),
        kwargs: args.kwargs.clone(),
    }
}

impl FunctionalGraph {
    pub fn inputs(&self) -> &[Placeholder] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Placeholder] {
        &self.outputs
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn layer(&self, name: &str) -> Option<&AnyLayer> {
        self.nodes
            .iter()
            .map(|x| x.layer())
            .find(|x| x.name() == name)
    }

    pub fn execute(&self, feeds: Vec<Value>) -> Result<Vec<Value>, GraphError> {
        self.execute_with_observer(feeds, &mut ())
    }

    /// Replay every node in recording order. Each wrapped operation runs
    /// exactly once per node.
    pub fn execute_with_observer<T: GraphObserver>(
        &self,
        feeds: Vec<Value>,
        observer: &mut T,
    ) -> Result<Vec<Value>, GraphError> {
        if feeds.len() != self.inputs.len() {
            return Err(GraphError::MissingInput {
                expected: self.inputs.len(),
                found: feeds.len(),
            });
        }

        let mut values: HashMap<PlaceholderId, Value> = HashMap::new();
        for (input, value) in self.inputs.iter().zip(feeds) {
            observer.on_value_assigned(input.id(), &value);
            values.insert(input.id(), value);
        }

        for node in &self.nodes {
            let args = node.inputs.map_structure(&mut |x: &Value| match x {
                Value::Placeholder(p) => values
                    .get(&p.id())
                    .cloned()
                    .ok_or(GraphError::UnknownPlaceholder(p.id())),
                other => Ok(other.clone()),
            })?;
            let start = Instant::now();
            let value = node.layer.call(&args)?;
            let end = Instant::now();
            observer.on_node_executed(node.id, node.layer.name(), start, end);
            observer.on_value_assigned(node.output.id(), &value);
            values.insert(node.output.id(), value);
        }

        self.outputs
            .iter()
            .map(|p| {
                values
                    .get(&p.id())
                    .cloned()
                    .ok_or(GraphError::UnknownPlaceholder(p.id()))
            })
            .collect()
    }

    pub fn get_config(&self) -> Result<GraphConfig, GraphError> {
        let mut seen = HashSet::new();
        let mut layers = Vec::new();
        let mut nodes = Vec::new();
        for node in &self.nodes {
            let layer = node.layer();
            if seen.insert(layer.name().to_string()) {
                layers.push(LayerEntry {
                    class_name: layer.class_name().to_string(),
                    config: layer.get_config()?,
                });
            }
            let inputs = if layer.base().preserve_input_structure_in_config() {
                node.inputs.clone()
            } else {
                unnest(&node.inputs)
            };
            nodes.push(NodeEntry {
                layer: layer.name().to_string(),
                inputs,
                output: node.output.clone(),
            });
        }
        Ok(GraphConfig {
            layers,
            nodes,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        })
    }

    /// Rebuild every layer from its config, resolving symbols through
    /// `registry`.
    pub fn from_config(
        config: &GraphConfig,
        registry: &DispatchRegistry,
    ) -> Result<Self, GraphError> {
        let names = NameScope::new();
        let ctx = LayerContext {
            names: &names,
            symbols: registry.symbols(),
        };
        let mut layers: HashMap<String, Arc<AnyLayer>> = HashMap::new();
        for entry in &config.layers {
            let layer = AnyLayer::from_config(&entry.class_name, entry.config.clone(), ctx)?;
            layers.insert(layer.name().to_string(), Arc::new(layer));
        }

        let mut nodes = Vec::with_capacity(config.nodes.len());
        for (index, entry) in config.nodes.iter().enumerate() {
            let layer = layers
                .get(&entry.layer)
                .cloned()
                .ok_or_else(|| GraphError::UnknownLayer(entry.layer.clone()))?;
            let id = NodeId { inner: index };
            let output = entry.output.clone().with_producer(Producer {
                node: id,
                layer_name: layer.name().to_string(),
                class_name: layer.class_name(),
            });
            nodes.push(GraphNode {
                id,
                layer,
                inputs: entry.inputs.clone(),
                output,
            });
        }

        let outputs = config
            .outputs
            .iter()
            .map(|p| {
                nodes
                    .iter()
                    .find(|n| n.output.id() == p.id())
                    .map(|n| n.output.clone())
                    .unwrap_or_else(|| p.clone())
            })
            .collect();

        log::debug!(
            "Restored graph with {} layers and {} nodes",
            layers.len(),
            nodes.len()
        );
        Ok(Self {
            inputs: config.inputs.clone(),
            outputs,
            nodes,
        })
    }
}
