use super::{BaseLayerConfig, Layer, LayerBase, LayerContext, LayerError, LayerOptions};
use crate::placeholder::PlaceholderKind;
use crate::safety::check_variables;
use crate::symbols::{Operation, SymbolTarget};
use crate::value::{CallArgs, Value};
use crate::variable::watch_variables;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpLambdaConfig {
    pub symbol: String,
    #[serde(flatten)]
    pub base: BaseLayerConfig,
}

/// A free operation called on placeholders, recorded as a layer.
///
/// The wrapped operation runs once per call. Variables it creates must
/// already be tracked by the layer; untracked reads are reported once.
#[derive(Debug)]
pub struct OpLambda {
    base: LayerBase,
    function: Operation,
    symbol: Option<String>,
    already_warned: AtomicBool,
}

impl OpLambda {
    pub const CLASS_NAME: &'static str = "TFOpLambda";

    pub fn new(ctx: LayerContext<'_>, function: Operation, options: LayerOptions) -> Self {
        let symbol = ctx
            .symbols
            .canonical_name(&SymbolTarget::from(function.clone()));
        let default_name = match &symbol {
            Some(symbol) => format!("tf.{}", symbol),
            None => function.name().to_string(),
        };
        let base = LayerBase::new(ctx.names, &default_name, options).op_layer();
        log::debug!("Wrapping {:?} as layer {}", function, base.name());
        Self {
            base,
            function,
            symbol,
            already_warned: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: serde_json::Value, ctx: LayerContext<'_>) -> Result<Self, LayerError> {
        let config: OpLambdaConfig = serde_json::from_value(config)?;
        let function = ctx
            .symbols
            .lookup_operation(&config.symbol)
            .ok_or_else(|| LayerError::UnresolvedSymbol(config.symbol.clone()))?;
        Ok(Self::new(ctx, function, config.base.into()))
    }

    pub fn function(&self) -> &Operation {
        &self.function
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn already_warned(&self) -> bool {
        self.already_warned.load(Ordering::Acquire)
    }
}

/// Run `body` on `inputs` minus any `name` keyword, then check the
/// variables it touched against the layer's weights.
pub(crate) fn invoke_tracked(
    base: &LayerBase,
    already_warned: &AtomicBool,
    inputs: &CallArgs,
    body: impl FnOnce(&CallArgs) -> anyhow::Result<Value>,
) -> Result<Value, LayerError> {
    let mut args = inputs.clone();
    args.kwargs.remove("name");
    let (result, watch) = watch_variables(|| body(&args));
    let value = result.map_err(|source| LayerError::OperationFailed {
        layer: base.name().to_string(),
        source,
    })?;
    check_variables(
        base.name(),
        watch.created(),
        watch.accessed(),
        base.weights(),
        already_warned,
    )?;
    Ok(value)
}

impl Layer for OpLambda {
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
        invoke_tracked(&self.base, &self.already_warned, inputs, |args| {
            self.function.call(args)
        })
    }

    fn output_kind(&self, inputs: &CallArgs) -> PlaceholderKind {
        self.function.output_kind(inputs)
    }

    fn get_config(&self) -> Result<serde_json::Value, LayerError> {
        let symbol = self
            .symbol
            .clone()
            .ok_or_else(|| LayerError::UnserializableOperation {
                layer: self.base.name().to_string(),
                operation: self.function.name().to_string(),
            })?;
        Ok(serde_json::to_value(OpLambdaConfig {
            symbol,
            base: self.base.config(),
        })?)
    }
}
