//! Graph-node wrappers: one recorded, replayable call each.

mod class_method;
mod instance_method;
mod instance_property;
mod op_lambda;
mod slicing_op_lambda;

pub use class_method::*;
pub use instance_method::*;
pub use instance_property::*;
pub use op_lambda::*;
pub use slicing_op_lambda::*;

use crate::naming::NameScope;
use crate::placeholder::PlaceholderKind;
use crate::symbols::SymbolTable;
use crate::value::{CallArgs, Value, ValueError};
use crate::variable::Variable;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error(
        "Layer {layer} wraps {operation}, which is not exported under any symbol; only layers produced from exported symbols can be serialized"
    )]
    UnserializableOperation { layer: String, operation: String },
    #[error("Symbol `tf.{0}` could not be found")]
    UnresolvedSymbol(String),
    #[error(
        "The following variables were created within layer {layer} but are not tracked by it: {variables:?}. Variables cannot be reused safely across calls; define a dedicated layer that owns them instead"
    )]
    UntrackedVariableCreation {
        layer: String,
        variables: Vec<String>,
    },
    #[error("{class} values have no member \"{member}\"")]
    UnknownMember { class: String, member: String },
    #[error("Class {class} has no class method \"{method}\"")]
    MissingClassMethod { class: String, method: String },
    #[error("Invalid layer config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
    #[error("Layer {layer} expected {expected} inputs")]
    BadInputs { layer: String, expected: &'static str },
    #[error("Layer {layer} failed")]
    OperationFailed {
        layer: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Value(#[from] ValueError),
}

fn default_trainable() -> bool {
    true
}

/// Fields every layer config carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseLayerConfig {
    pub name: String,
    #[serde(default = "default_trainable")]
    pub trainable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
}

/// Caller-supplied construction options.
#[derive(Debug, Clone, Default)]
pub struct LayerOptions {
    pub name: Option<String>,
    pub trainable: Option<bool>,
    pub dtype: Option<String>,
}

impl LayerOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl From<BaseLayerConfig> for LayerOptions {
    fn from(config: BaseLayerConfig) -> Self {
        Self {
            name: Some(config.name),
            trainable: Some(config.trainable),
            dtype: config.dtype,
        }
    }
}

/// What a layer needs from the active construction context.
#[derive(Clone, Copy)]
pub struct LayerContext<'a> {
    pub names: &'a NameScope,
    pub symbols: &'a SymbolTable,
}

#[derive(Debug)]
pub struct LayerBase {
    name: String,
    trainable: bool,
    dtype: Option<String>,
    must_restore_from_config: bool,
    preserve_input_structure_in_config: bool,
    weights: Vec<Variable>,
}

impl LayerBase {
    /// A user-chosen name is kept as is; otherwise `default_name` is
    /// disambiguated against every name observed in `names`.
    pub fn new(names: &NameScope, default_name: &str, options: LayerOptions) -> Self {
        let name = match options.name {
            Some(name) => {
                names.observe(&name);
                name
            }
            None => names.unique_name(default_name),
        };
        Self {
            name,
            trainable: options.trainable.unwrap_or(true),
            dtype: options.dtype,
            must_restore_from_config: false,
            preserve_input_structure_in_config: false,
            weights: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trainable(&self) -> bool {
        self.trainable
    }

    pub fn dtype(&self) -> Option<&str> {
        self.dtype.as_deref()
    }

    pub fn must_restore_from_config(&self) -> bool {
        self.must_restore_from_config
    }

    pub fn set_must_restore_from_config(&mut self, value: bool) {
        self.must_restore_from_config = value;
    }

    pub fn preserve_input_structure_in_config(&self) -> bool {
        self.preserve_input_structure_in_config
    }

    pub fn set_preserve_input_structure_in_config(&mut self, value: bool) {
        self.preserve_input_structure_in_config = value;
    }

    pub fn weights(&self) -> &[Variable] {
        &self.weights
    }

    pub fn track_variable(&mut self, variable: Variable) {
        if !self.weights.contains(&variable) {
            self.weights.push(variable);
        }
    }

    pub fn config(&self) -> BaseLayerConfig {
        BaseLayerConfig {
            name: self.name.clone(),
            trainable: self.trainable,
            dtype: self.dtype.clone(),
        }
    }

    // Flags every op-wrapping layer sets.
    fn op_layer(mut self) -> Self {
        self.must_restore_from_config = true;
        self.preserve_input_structure_in_config = true;
        self
    }
}

pub trait Layer {
    fn base(&self) -> &LayerBase;

    fn base_mut(&mut self) -> &mut LayerBase;

    fn class_name(&self) -> &'static str;

    fn call(&self, inputs: &CallArgs) -> Result<Value, LayerError>;

    /// Kind of placeholder a recorded call with `inputs` yields.
    fn output_kind(&self, inputs: &CallArgs) -> PlaceholderKind;

    fn get_config(&self) -> Result<serde_json::Value, LayerError>;

    fn name(&self) -> &str {
        self.base().name()
    }
}

#[derive(Debug)]
pub enum AnyLayer {
    InstanceProperty(InstanceProperty),
    InstanceMethod(InstanceMethod),
    OpLambda(OpLambda),
    SlicingOpLambda(SlicingOpLambda),
    ClassMethod(ClassMethod),
}

impl AnyLayer {
    pub fn from_config(
        class_name: &str,
        config: serde_json::Value,
        ctx: LayerContext<'_>,
    ) -> Result<Self, LayerError> {
        Ok(match class_name {
            InstanceProperty::CLASS_NAME => {
                AnyLayer::InstanceProperty(InstanceProperty::from_config(config, ctx)?)
            }
            InstanceMethod::CLASS_NAME => {
                AnyLayer::InstanceMethod(InstanceMethod::from_config(config, ctx)?)
            }
            OpLambda::CLASS_NAME => AnyLayer::OpLambda(OpLambda::from_config(config, ctx)?),
            SlicingOpLambda::CLASS_NAME => {
                AnyLayer::SlicingOpLambda(SlicingOpLambda::from_config(config, ctx)?)
            }
            ClassMethod::CLASS_NAME => AnyLayer::ClassMethod(ClassMethod::from_config(config, ctx)?),
            other => {
                return Err(LayerError::InvalidConfig(serde::de::Error::custom(format!(
                    "unknown layer class {}",
                    other
                ))));
            }
        })
    }
}

impl Layer for AnyLayer {
    fn base(&self) -> &LayerBase {
        match self {
            AnyLayer::InstanceProperty(x) => x.base(),
            AnyLayer::InstanceMethod(x) => x.base(),
            AnyLayer::OpLambda(x) => x.base(),
            AnyLayer::SlicingOpLambda(x) => x.base(),
            AnyLayer::ClassMethod(x) => x.base(),
        }
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        match self {
            AnyLayer::InstanceProperty(x) => x.base_mut(),
            AnyLayer::InstanceMethod(x) => x.base_mut(),
            AnyLayer::OpLambda(x) => x.base_mut(),
            AnyLayer::SlicingOpLambda(x) => x.base_mut(),
            AnyLayer::ClassMethod(x) => x.base_mut(),
        }
    }

    fn class_name(&self) -> &'static str {
        match self {
            AnyLayer::InstanceProperty(x) => x.class_name(),
            AnyLayer::InstanceMethod(x) => x.class_name(),
            AnyLayer::OpLambda(x) => x.class_name(),
            AnyLayer::SlicingOpLambda(x) => x.class_name(),
            AnyLayer::ClassMethod(x) => x.class_name(),
        }
    }

    fn call(&self, inputs: &CallArgs) -> Result<Value, LayerError> {
        match self {
            AnyLayer::InstanceProperty(x) => x.call(inputs),
            AnyLayer::InstanceMethod(x) => x.call(inputs),
            AnyLayer::OpLambda(x) => x.call(inputs),
            AnyLayer::SlicingOpLambda(x) => x.call(inputs),
            AnyLayer::ClassMethod(x) => x.call(inputs),
        }
    }

    fn output_kind(&self, inputs: &CallArgs) -> PlaceholderKind {
        match self {
            AnyLayer::InstanceProperty(x) => x.output_kind(inputs),
            AnyLayer::InstanceMethod(x) => x.output_kind(inputs),
            AnyLayer::OpLambda(x) => x.output_kind(inputs),
            AnyLayer::SlicingOpLambda(x) => x.output_kind(inputs),
            AnyLayer::ClassMethod(x) => x.output_kind(inputs),
        }
    }

    fn get_config(&self) -> Result<serde_json::Value, LayerError> {
        match self {
            AnyLayer::InstanceProperty(x) => x.get_config(),
            AnyLayer::InstanceMethod(x) => x.get_config(),
            AnyLayer::OpLambda(x) => x.get_config(),
            AnyLayer::SlicingOpLambda(x) => x.get_config(),
            AnyLayer::ClassMethod(x) => x.get_config(),
        }
    }
}

impl From<InstanceProperty> for AnyLayer {
    fn from(value: InstanceProperty) -> Self {
        AnyLayer::InstanceProperty(value)
    }
}

impl From<InstanceMethod> for AnyLayer {
    fn from(value: InstanceMethod) -> Self {
        AnyLayer::InstanceMethod(value)
    }
}

impl From<OpLambda> for AnyLayer {
    fn from(value: OpLambda) -> Self {
        AnyLayer::OpLambda(value)
    }
}

impl From<SlicingOpLambda> for AnyLayer {
    fn from(value: SlicingOpLambda) -> Self {
        AnyLayer::SlicingOpLambda(value)
    }
}

impl From<ClassMethod> for AnyLayer {
    fn from(value: ClassMethod) -> Self {
        AnyLayer::ClassMethod(value)
    }
}

/// Rebuild call arguments recorded as `[.., List(args), Map(kwargs)]`.
fn unpack_call(
    layer: &str,
    args: Option<&Value>,
    kwargs: Option<&Value>,
) -> Result<CallArgs, LayerError> {
    let bad_inputs = || LayerError::BadInputs {
        layer: layer.to_string(),
        expected: "a positional list and a keyword map as",
    };
    let args = match args {
        Some(Value::List(items)) => items.clone(),
        None => Vec::new(),
        Some(_) => return Err(bad_inputs()),
    };
    let kwargs = match kwargs {
        Some(Value::Map(entries)) => entries.clone(),
        None => Default::default(),
        Some(_) => return Err(bad_inputs()),
    };
    Ok(CallArgs { args, kwargs })
}

/// Record `args` and `kwargs` the way `unpack_call` reads them back.
pub fn pack_call(args: &CallArgs) -> Vec<Value> {
    vec![
        Value::List(args.args.clone()),
        Value::Map(args.kwargs.clone()),
    ]
}
