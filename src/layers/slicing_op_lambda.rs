use super::{Layer, LayerBase, LayerContext, LayerError, LayerOptions, OpLambda};
use crate::normalize::decode_call_args;
use crate::placeholder::PlaceholderKind;
use crate::symbols::Operation;
use crate::value::{CallArgs, Value};

/// An [`OpLambda`] for operations that take slices. Its
/// recorded arguments hold slices encoded as maps; they are decoded back
/// before the operation runs.
#[derive(Debug)]
pub struct SlicingOpLambda {
    inner: OpLambda,
}

impl SlicingOpLambda {
    pub const CLASS_NAME: &'static str = "SlicingOpLambda";

    pub fn new(ctx: LayerContext<'_>, function: Operation, options: LayerOptions) -> Self {
        Self {
            inner: OpLambda::new(ctx, function, options),
        }
    }

    pub fn from_config(config: serde_json::Value, ctx: LayerContext<'_>) -> Result<Self, LayerError> {
        Ok(Self {
            inner: OpLambda::from_config(config, ctx)?,
        })
    }

    pub fn op_lambda(&self) -> &OpLambda {
        &self.inner
    }
}

impl Layer for SlicingOpLambda {
    fn base(&self) -> &LayerBase {
        self.inner.base()
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        self.inner.base_mut()
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn call(&self, inputs: &CallArgs) -> Result<Value, LayerError> {
        self.inner.call(&decode_call_args(inputs))
    }

    fn output_kind(&self, inputs: &CallArgs) -> PlaceholderKind {
        self.inner.output_kind(inputs)
    }

    fn get_config(&self) -> Result<serde_json::Value, LayerError> {
        self.inner.get_config()
    }
}
