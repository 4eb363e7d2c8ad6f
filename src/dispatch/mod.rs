//! Interception of operation calls whose arguments hold placeholders.
//!
//! A [`DispatchRegistry`] is populated once, then shared read-only by every
//! [`GraphBuilder`] that records calls through it. For each call the
//! dispatchers registered for that exact target are asked first, then the
//! global ones, each in registration order. The first one that handles the
//! call wins. If none does, the operation runs directly.

mod dispatchers;

pub use dispatchers::*;

use crate::api::{self, RAGGED_CLASS_METHODS, SLICING_SYMBOLS};
use crate::delegation::{DelegationTable, install_delegations};
use crate::graph::{GraphBuilder, GraphError};
use crate::symbols::{OpClass, Operation, SymbolTable, TargetId};
use crate::value::{CallArgs, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    Operation(TargetId),
    ClassMethod(TargetId, String),
}

/// The call being dispatched.
#[derive(Debug, Clone, Copy)]
pub enum DispatchTarget<'a> {
    Operation(&'a Operation),
    ClassMethod { class: &'a OpClass, method: &'a str },
}

impl DispatchTarget<'_> {
    pub fn key(&self) -> DispatchKey {
        match self {
            DispatchTarget::Operation(op) => DispatchKey::Operation(op.id()),
            DispatchTarget::ClassMethod { class, method } => {
                DispatchKey::ClassMethod(class.id(), method.to_string())
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            DispatchTarget::Operation(op) => op.name().to_string(),
            DispatchTarget::ClassMethod { class, method } => format!("{}.{}", class.name(), method),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Handled(Value),
    NotSupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum DispatcherKind {
    OpLambda,
    SlicingOpLambda,
    ClassMethod,
    Custom(&'static str),
}

pub trait OpDispatcher: Send + Sync {
    /// Two dispatchers of the same kind on the same key are the same
    /// interceptor.
    fn kind(&self) -> DispatcherKind;

    fn handle(
        &self,
        builder: &mut GraphBuilder,
        target: DispatchTarget<'_>,
        args: &CallArgs,
    ) -> Result<Dispatch, GraphError>;
}

pub struct DispatchRegistry {
    symbols: Arc<SymbolTable>,
    global: Vec<Box<dyn OpDispatcher>>,
    targeted: HashMap<DispatchKey, Vec<Box<dyn OpDispatcher>>>,
    delegations: DelegationTable,
    initialized: bool,
}

impl DispatchRegistry {
    /// An empty registry resolving names through `symbols`.
    pub fn new(symbols: Arc<SymbolTable>) -> Self {
        Self {
            symbols,
            global: Vec::new(),
            targeted: HashMap::new(),
            delegations: DelegationTable::new(),
            initialized: false,
        }
    }

    /// Registry over the default operation set with every built-in
    /// dispatcher and delegation installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(Arc::new(api::default_symbols()));
        registry.initialize();
        registry
    }

    /// Install the built-in dispatchers and delegations. Calling this again
    /// has no effect.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        self.register_global(Box::new(OpLambdaDispatcher));

        for symbol in SLICING_SYMBOLS {
            match self.symbols.lookup_operation(symbol) {
                Some(op) => {
                    self.register(
                        DispatchTarget::Operation(&op).key(),
                        Box::new(SlicingOpDispatcher),
                    );
                }
                None => log::warn!("Slicing operation tf.{} is not exported, skipping", symbol),
            }
        }

        match self.symbols.lookup_class("RaggedTensor") {
            Some(class) => {
                for method in RAGGED_CLASS_METHODS {
                    let target = DispatchTarget::ClassMethod {
                        class: &class,
                        method,
                    };
                    self.register(target.key(), Box::new(ClassMethodDispatcher));
                }
            }
            None => log::warn!("tf.RaggedTensor is not exported, skipping its class methods"),
        }

        install_delegations(&mut self.delegations);
    }

    /// Returns false when an equivalent global dispatcher already exists.
    pub fn register_global(&mut self, dispatcher: Box<dyn OpDispatcher>) -> bool {
        if self.global.iter().any(|x| x.kind() == dispatcher.kind()) {
            log::debug!("Global {} dispatcher already registered", dispatcher.kind());
            return false;
        }
        self.global.push(dispatcher);
        true
    }

    /// Returns false when an equivalent dispatcher is already registered for
    /// `key`.
    pub fn register(&mut self, key: DispatchKey, dispatcher: Box<dyn OpDispatcher>) -> bool {
        let entries = self.targeted.entry(key).or_default();
        if entries.iter().any(|x| x.kind() == dispatcher.kind()) {
            return false;
        }
        entries.push(dispatcher);
        true
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn delegations(&self) -> &DelegationTable {
        &self.delegations
    }

    pub fn delegations_mut(&mut self) -> &mut DelegationTable {
        &mut self.delegations
    }

    /// Number of dispatchers consulted for `target`.
    pub fn interceptor_count(&self, target: DispatchTarget<'_>) -> usize {
        let targeted = self.targeted.get(&target.key()).map_or(0, |x| x.len());
        targeted + self.global.len()
    }

    pub fn dispatch(
        &self,
        builder: &mut GraphBuilder,
        target: DispatchTarget<'_>,
        args: &CallArgs,
    ) -> Result<Dispatch, GraphError> {
        let targeted = self.targeted.get(&target.key()).into_iter().flatten();
        for dispatcher in targeted.chain(self.global.iter()) {
            if let Dispatch::Handled(value) = dispatcher.handle(builder, target, args)? {
                log::debug!(
                    "{} dispatcher recorded a call to {}",
                    dispatcher.kind(),
                    target.describe()
                );
                return Ok(Dispatch::Handled(value));
            }
        }
        Ok(Dispatch::NotSupported)
    }
}

static DEFAULT_REGISTRY: OnceLock<Arc<DispatchRegistry>> = OnceLock::new();

/// Shared registry from [`DispatchRegistry::with_defaults`], built on first
/// use.
pub fn default_registry() -> Arc<DispatchRegistry> {
    DEFAULT_REGISTRY
        .get_or_init(|| Arc::new(DispatchRegistry::with_defaults()))
        .clone()
}
