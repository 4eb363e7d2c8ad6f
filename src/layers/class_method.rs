use super::op_lambda::invoke_tracked;
use super::{BaseLayerConfig, Layer, LayerBase, LayerContext, LayerError, LayerOptions, unpack_call};
use crate::placeholder::PlaceholderKind;
use crate::symbols::{MethodDef, OpClass, SymbolTarget};
use crate::value::{CallArgs, Value};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMethodConfig {
    pub symbol: String,
    pub method_name: String,
    #[serde(flatten)]
    pub base: BaseLayerConfig,
}

/// `Class.method(*args, **kwargs)` as a layer. Inputs are recorded as
/// `[args, kwargs]`.
#[derive(Debug)]
pub struct ClassMethod {
    base: LayerBase,
    class: OpClass,
    method: MethodDef,
    symbol: Option<String>,
    already_warned: AtomicBool,
}

impl ClassMethod {
    pub const CLASS_NAME: &'static str = "ClassMethod";

    pub fn new(
        ctx: LayerContext<'_>,
        class: OpClass,
        method_name: &str,
        options: LayerOptions,
    ) -> Result<Self, LayerError> {
        let method = class
            .method(method_name)
            .cloned()
            .ok_or_else(|| LayerError::MissingClassMethod {
                class: class.name().to_string(),
                method: method_name.to_string(),
            })?;
        let symbol = ctx.symbols.canonical_name(&SymbolTarget::from(class.clone()));
        let default_name = format!(
            "tf.{}.{}",
            symbol.as_deref().unwrap_or(class.name()),
            method_name
        );
        let base = LayerBase::new(ctx.names, &default_name, options).op_layer();
        log::debug!("Wrapping {:?}.{} as layer {}", class, method_name, base.name());
        Ok(Self {
            base,
            class,
            method,
            symbol,
            already_warned: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: serde_json::Value, ctx: LayerContext<'_>) -> Result<Self, LayerError> {
        let config: ClassMethodConfig = serde_json::from_value(config)?;
        let class = ctx
            .symbols
            .lookup_class(&config.symbol)
            .ok_or_else(|| LayerError::UnresolvedSymbol(config.symbol.clone()))?;
        Self::new(ctx, class, &config.method_name, config.base.into())
    }

    pub fn class(&self) -> &OpClass {
        &self.class
    }

    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }
}

impl Layer for ClassMethod {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn call(&self, inputs: &CallArgs) -> Result<Value, LayerError> {
        let args = unpack_call(self.base.name(), inputs.args.first(), inputs.args.get(1))?;
        invoke_tracked(&self.base, &self.already_warned, &args, |args| {
            self.method.call(args)
        })
    }

    fn output_kind(&self, inputs: &CallArgs) -> PlaceholderKind {
        let args = unpack_call(self.base.name(), inputs.args.first(), inputs.args.get(1))
            .unwrap_or_default();
        self.method.output_kind(&args)
    }

    fn get_config(&self) -> Result<serde_json::Value, LayerError> {
        let symbol = self
            .symbol
            .clone()
            .ok_or_else(|| LayerError::UnserializableOperation {
                layer: self.base.name().to_string(),
                operation: format!("{}.{}", self.class.name(), self.method.name()),
            })?;
        Ok(serde_json::to_value(ClassMethodConfig {
            symbol,
            method_name: self.method.name().to_string(),
            base: self.base.config(),
        })?)
    }
}
