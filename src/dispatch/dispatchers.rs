use super::{Dispatch, DispatchTarget, DispatcherKind, OpDispatcher};
use crate::graph::{GraphBuilder, GraphError};
use crate::layers::{ClassMethod, LayerOptions, OpLambda, SlicingOpLambda, pack_call};
use crate::normalize::encode_call_args;
use crate::value::CallArgs;

/// Wraps any free operation called with a placeholder in an [`OpLambda`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpLambdaDispatcher;

impl OpDispatcher for OpLambdaDispatcher {
    fn kind(&self) -> DispatcherKind {
        DispatcherKind::OpLambda
    }

    fn handle(
        &self,
        builder: &mut GraphBuilder,
        target: DispatchTarget<'_>,
        args: &CallArgs,
    ) -> Result<Dispatch, GraphError> {
        let DispatchTarget::Operation(op) = target else {
            return Ok(Dispatch::NotSupported);
        };
        if !args.contains_placeholder() {
            return Ok(Dispatch::NotSupported);
        }
        let layer = OpLambda::new(builder.layer_context(), op.clone(), LayerOptions::default());
        let output = builder.apply_layer(layer.into(), args.clone())?;
        Ok(Dispatch::Handled(output))
    }
}

/// Wraps slicing, indexing and masking operations in a [`SlicingOpLambda`].
/// Slices are encoded first so placeholder bounds inside them are seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlicingOpDispatcher;

impl OpDispatcher for SlicingOpDispatcher {
    fn kind(&self) -> DispatcherKind {
        DispatcherKind::SlicingOpLambda
    }

    fn handle(
        &self,
        builder: &mut GraphBuilder,
        target: DispatchTarget<'_>,
        args: &CallArgs,
    ) -> Result<Dispatch, GraphError> {
        let DispatchTarget::Operation(op) = target else {
            return Ok(Dispatch::NotSupported);
        };
        let encoded = encode_call_args(args);
        if !encoded.contains_placeholder() {
            return Ok(Dispatch::NotSupported);
        }
        let layer = SlicingOpLambda::new(builder.layer_context(), op.clone(), LayerOptions::default());
        let output = builder.apply_layer(layer.into(), encoded)?;
        Ok(Dispatch::Handled(output))
    }
}

/// Wraps a class method called with a placeholder in a [`ClassMethod`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassMethodDispatcher;

impl OpDispatcher for ClassMethodDispatcher {
    fn kind(&self) -> DispatcherKind {
        DispatcherKind::ClassMethod
    }

    fn handle(
        &self,
        builder: &mut GraphBuilder,
        target: DispatchTarget<'_>,
        args: &CallArgs,
    ) -> Result<Dispatch, GraphError> {
        let DispatchTarget::ClassMethod { class, method } = target else {
            return Ok(Dispatch::NotSupported);
        };
        if !args.contains_placeholder() {
            return Ok(Dispatch::NotSupported);
        }
        let layer = ClassMethod::new(
            builder.layer_context(),
            class.clone(),
            method,
            LayerOptions::default(),
        )?;
        let inputs = CallArgs::positional(pack_call(args));
        let output = builder.apply_layer(layer.into(), inputs)?;
        Ok(Dispatch::Handled(output))
    }
}
