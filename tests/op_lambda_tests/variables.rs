use super::{assert_close, f64s, placeholder};
use op_lambda::api::{api, default_symbols};
use op_lambda::dispatch::DispatchRegistry;
use op_lambda::graph::{GraphBuilder, GraphError};
use op_lambda::layers::{AnyLayer, Layer, LayerError, LayerOptions, OpLambda};
use op_lambda::placeholder::PlaceholderKind;
use op_lambda::symbols::{ApiNamespace, Operation, like_first_input};
use op_lambda::value::{CallArgs, Value};
use op_lambda::variable::Variable;
use std::sync::Arc;

fn registry_with(name: &str, op: &Operation) -> Arc<DispatchRegistry> {
    let mut symbols = default_symbols();
    symbols.export(ApiNamespace::Tf, name, op.clone());
    let mut registry = DispatchRegistry::new(Arc::new(symbols));
    registry.initialize();
    Arc::new(registry)
}

fn op_lambda(layer: &AnyLayer) -> &OpLambda {
    match layer {
        AnyLayer::OpLambda(x) => x,
        other => panic!("expected an op layer, got {other:?}"),
    }
}

pub fn test_pure_operation_never_warns(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let out = builder.call(&api().add, CallArgs::new().arg(&x).arg(&x)).unwrap();
    let graph = builder.build(&[out]).unwrap();
    for _ in 0..2 {
        let outputs = graph.execute(vec![f64s(&[1.0, 2.0])]).unwrap();
        assert_close(&outputs[0], &[2.0, 4.0]);
    }
    assert!(!op_lambda(graph.nodes()[0].layer()).already_warned());
}

#[test]
fn test_untracked_creation_fails() {
    let op = Operation::new("make_state", like_first_input, |args: &CallArgs| {
        Variable::new("kernel", 0.0);
        Variable::new("bias", 0.0);
        Ok(args.require(0, "x")?.clone())
    });
    let registry = registry_with("stateful.make_state", &op);
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let out = builder.call(&op, CallArgs::new().arg(&x)).unwrap();
    let graph = builder.build(&[out]).unwrap();

    let err = graph.execute(vec![f64s(&[1.0])]).unwrap_err();
    match err {
        GraphError::Layer(LayerError::UntrackedVariableCreation { layer, variables }) => {
            assert_eq!(layer, "tf.stateful.make_state");
            assert_eq!(variables, vec!["kernel".to_string(), "bias".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_untracked_access_warns_once() {
    let counter = Variable::new("counter", 5.0);
    let read = counter.clone();
    let op = Operation::new("read_counter", like_first_input, move |args: &CallArgs| {
        let offset = read.read();
        api().add.call(&CallArgs::new().arg(args.require(0, "x")?.clone()).arg(offset))
    });
    let registry = registry_with("stateful.read_counter", &op);
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let out = builder.call(&op, CallArgs::new().arg(&x)).unwrap();
    let graph = builder.build(&[out]).unwrap();
    let layer = op_lambda(graph.nodes()[0].layer());
    assert!(!layer.already_warned());

    let outputs = graph.execute(vec![f64s(&[1.0])]).unwrap();
    assert_close(&outputs[0], &[6.0]);
    assert!(layer.already_warned());

    counter.assign(7.0);
    let outputs = graph.execute(vec![f64s(&[1.0])]).unwrap();
    assert_close(&outputs[0], &[8.0]);
    assert!(layer.already_warned());
}

#[test]
fn test_tracked_access_is_silent() {
    let weight = Variable::new("weight", 3.0);
    let read = weight.clone();
    let op = Operation::new("scale", like_first_input, move |args: &CallArgs| {
        let w = read.read();
        api().multiply.call(&CallArgs::new().arg(args.require(0, "x")?.clone()).arg(w))
    });
    let registry = registry_with("stateful.scale", &op);
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);

    let mut layer = OpLambda::new(builder.layer_context(), op.clone(), LayerOptions::default());
    layer.base_mut().track_variable(weight.clone());
    layer.base_mut().track_variable(weight);
    assert_eq!(layer.base().weights().len(), 1);

    let layer = Arc::new(AnyLayer::from(layer));
    let first = builder
        .apply_shared(layer.clone(), CallArgs::new().arg(&x))
        .unwrap();
    let second = builder
        .apply_shared(layer.clone(), CallArgs::new().arg(first))
        .unwrap();
    assert_eq!(builder.nodes().len(), 2);
    assert_eq!(
        placeholder(&second).producer().unwrap().layer_name,
        "tf.stateful.scale"
    );

    let graph = builder.build(&[second]).unwrap();
    let outputs = graph.execute(vec![f64s(&[2.0])]).unwrap();
    assert_close(&outputs[0], &[18.0]);
    assert!(!op_lambda(&layer).already_warned());
}

#[test]
fn test_failing_operation_names_the_layer() {
    let op = Operation::new("explode", like_first_input, |_: &CallArgs| {
        anyhow::bail!("boom")
    });
    let registry = registry_with("explode", &op);
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let out = builder.call(&op, CallArgs::new().arg(&x)).unwrap();
    let graph = builder.build(&[out]).unwrap();
    match graph.execute(vec![Value::Int(1)]).unwrap_err() {
        GraphError::Layer(LayerError::OperationFailed { layer, source }) => {
            assert_eq!(layer, "tf.explode");
            assert_eq!(source.to_string(), "boom");
        }
        other => panic!("unexpected error {other:?}"),
    }
}
