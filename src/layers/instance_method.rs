use super::{
    InstancePropertyConfig, Layer, LayerBase, LayerContext, LayerError, LayerOptions, unpack_call,
};
use crate::placeholder::PlaceholderKind;
use crate::tensor::members::{self, MemberTable, MethodFn};
use crate::value::{CallArgs, Value};

/// Same wire shape as a property layer.
pub type InstanceMethodConfig = InstancePropertyConfig;

/// `obj.<attribute_name>(*args, **kwargs)` as a layer. Inputs are recorded
/// as `[obj, args, kwargs]`.
#[derive(Debug)]
pub struct InstanceMethod {
    base: LayerBase,
    attribute_name: String,
    method: MemberTable<MethodFn>,
}

impl InstanceMethod {
    pub const CLASS_NAME: &'static str = "InstanceMethod";

    pub fn new(
        ctx: LayerContext<'_>,
        attribute_name: &str,
        options: LayerOptions,
    ) -> Result<Self, LayerError> {
        let method = members::method(attribute_name);
        if method.is_empty() {
            return Err(LayerError::UnknownMember {
                class: "tensor".to_string(),
                member: attribute_name.to_string(),
            });
        }
        let base = LayerBase::new(ctx.names, &format!("input.{}", attribute_name), options).op_layer();
        log::debug!("Created method layer {} for .{}()", base.name(), attribute_name);
        Ok(Self {
            base,
            attribute_name: attribute_name.to_string(),
            method,
        })
    }

    pub fn from_config(config: serde_json::Value, ctx: LayerContext<'_>) -> Result<Self, LayerError> {
        let config: InstanceMethodConfig = serde_json::from_value(config)?;
        Self::new(ctx, &config.attribute_name, config.base.into())
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }
}

impl Layer for InstanceMethod {
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
        let target = inputs.require(0, "obj")?.to_tensor()?;
        let args = unpack_call(self.base.name(), inputs.args.get(1), inputs.args.get(2))?;
        let class = target.kind().class();
        let method = self.method.get(class).ok_or_else(|| LayerError::UnknownMember {
            class: class.to_string(),
            member: self.attribute_name.clone(),
        })?;
        method(&target, &args).map_err(|source| LayerError::OperationFailed {
            layer: self.base.name().to_string(),
            source,
        })
    }

    fn output_kind(&self, inputs: &CallArgs) -> PlaceholderKind {
        let input = inputs
            .args
            .first()
            .and_then(|x| x.as_placeholder())
            .map(|p| p.kind())
            .unwrap_or(PlaceholderKind::Dense);
        let args = unpack_call(self.base.name(), inputs.args.get(1), inputs.args.get(2))
            .unwrap_or_default();
        members::method_kind(&self.attribute_name, input, &args)
    }

    fn get_config(&self) -> Result<serde_json::Value, LayerError> {
        Ok(serde_json::to_value(InstanceMethodConfig {
            attribute_name: self.attribute_name.clone(),
            base: self.base.config(),
        })?)
    }
}
