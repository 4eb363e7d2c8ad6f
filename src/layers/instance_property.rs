use super::{BaseLayerConfig, Layer, LayerBase, LayerContext, LayerError, LayerOptions};
use crate::placeholder::PlaceholderKind;
use crate::tensor::members::{self, MemberTable, PropertyFn};
use crate::value::{CallArgs, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancePropertyConfig {
    pub attribute_name: String,
    #[serde(flatten)]
    pub base: BaseLayerConfig,
}

/// `obj.<attribute_name>` as a layer.
#[derive(Debug)]
pub struct InstanceProperty {
    base: LayerBase,
    attribute_name: String,
    accessor: MemberTable<PropertyFn>,
}

impl InstanceProperty {
    pub const CLASS_NAME: &'static str = "InstanceProperty";

    pub fn new(
        ctx: LayerContext<'_>,
        attribute_name: &str,
        options: LayerOptions,
    ) -> Result<Self, LayerError> {
        let accessor = members::property(attribute_name);
        if accessor.is_empty() {
            return Err(LayerError::UnknownMember {
                class: "tensor".to_string(),
                member: attribute_name.to_string(),
            });
        }
        let base = LayerBase::new(ctx.names, &format!("input.{}", attribute_name), options).op_layer();
        log::debug!("Created property layer {} for .{}", base.name(), attribute_name);
        Ok(Self {
            base,
            attribute_name: attribute_name.to_string(),
            accessor,
        })
    }

    pub fn from_config(config: serde_json::Value, ctx: LayerContext<'_>) -> Result<Self, LayerError> {
        let config: InstancePropertyConfig = serde_json::from_value(config)?;
        Self::new(ctx, &config.attribute_name, config.base.into())
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }
}

impl Layer for InstanceProperty {
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
        let class = target.kind().class();
        let read = self
            .accessor
            .get(class)
            .ok_or_else(|| LayerError::UnknownMember {
                class: class.to_string(),
                member: self.attribute_name.clone(),
            })?;
        read(&target).map_err(|source| LayerError::OperationFailed {
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
        members::property_kind(&self.attribute_name, input)
    }

    fn get_config(&self) -> Result<serde_json::Value, LayerError> {
        Ok(serde_json::to_value(InstancePropertyConfig {
            attribute_name: self.attribute_name.clone(),
            base: self.base.config(),
        })?)
    }
}
