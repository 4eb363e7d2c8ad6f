use super::{assert_close, f64s, placeholder, registry_with_custom_op};
use op_lambda::api::{RAGGED_CLASS_METHODS, api, default_symbols};
use op_lambda::dispatch::{
    DispatchRegistry, DispatchTarget, OpLambdaDispatcher, SlicingOpDispatcher,
};
use op_lambda::graph::{GraphBuilder, GraphError};
use op_lambda::layers::{AnyLayer, Layer};
use op_lambda::placeholder::PlaceholderKind;
use op_lambda::tensor::DenseTensor;
use op_lambda::value::{CallArgs, SliceSpec, Value};
use std::collections::HashSet;
use std::sync::Arc;

pub fn test_concrete_call_runs_directly(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let out = builder
        .call(&api().add, CallArgs::new().arg(f64s(&[1.0, 2.0])).arg(1.0))
        .unwrap();
    assert_close(&out, &[2.0, 3.0]);
    assert!(builder.nodes().is_empty());
}

pub fn test_placeholder_call_is_recorded(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let out = placeholder(&builder.call(&api().add, CallArgs::new().arg(&x).arg(1.0)).unwrap());
    let producer = out.producer().unwrap();
    assert_eq!(producer.class_name, "TFOpLambda");
    assert_eq!(producer.layer_name, "tf.math.add");
    assert_eq!(builder.nodes().len(), 1);

    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph.execute(vec![f64s(&[1.0, 2.0, 3.0])]).unwrap();
    assert_close(&outputs[0], &[2.0, 3.0, 4.0]);
}

pub fn test_nested_placeholder_is_intercepted(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let values = Value::List(vec![f64s(&[1.0]), Value::from(&x)]);
    let out = placeholder(
        &builder
            .call(&api().concat, CallArgs::new().arg(values).kwarg("axis", 0i64))
            .unwrap(),
    );
    assert_eq!(out.producer().unwrap().layer_name, "tf.concat");

    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph.execute(vec![f64s(&[2.0, 3.0])]).unwrap();
    assert_close(&outputs[0], &[1.0, 2.0, 3.0]);
}

pub fn test_slice_bound_placeholder_is_intercepted(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let stop = builder.input(PlaceholderKind::Dense);
    let tensor = f64s(&[10.0, 11.0, 12.0, 13.0]);
    let key = Value::Slice(SliceSpec::range(1i64, &stop));
    let out = placeholder(
        &builder
            .call(&api().getitem, CallArgs::new().arg(tensor).arg(key))
            .unwrap(),
    );
    let producer = out.producer().unwrap();
    assert_eq!(producer.class_name, "SlicingOpLambda");
    assert_eq!(producer.layer_name, "tf.__operators__.getitem");

    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph.execute(vec![Value::Int(3)]).unwrap();
    assert_close(&outputs[0], &[11.0, 12.0]);
}

pub fn test_alias_resolves_to_canonical_name(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let mask = Value::from(DenseTensor::vector_bool(vec![true, false, true]));
    let out = placeholder(
        &builder
            .call_symbol("compat.v1.boolean_mask", CallArgs::new().arg(&x).arg(mask))
            .unwrap(),
    );
    let producer = out.producer().unwrap();
    assert_eq!(producer.class_name, "SlicingOpLambda");
    assert_eq!(producer.layer_name, "tf.boolean_mask");

    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph.execute(vec![f64s(&[1.0, 2.0, 3.0])]).unwrap();
    assert_close(&outputs[0], &[1.0, 3.0]);
}

pub fn test_colliding_names_are_distinct(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    builder.names().observe("tf.math.add_2");
    let x = builder.input(PlaceholderKind::Dense);
    let mut names = HashSet::new();
    for _ in 0..5 {
        let out = builder.call(&api().add, CallArgs::new().arg(&x).arg(1.0)).unwrap();
        names.insert(placeholder(&out).producer().unwrap().layer_name.clone());
    }
    assert_eq!(names.len(), 5);
    assert!(names.contains("tf.math.add"));
    assert!(!names.contains("tf.math.add_2"));
}

pub fn test_concrete_class_method_runs_directly(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let out = builder
        .call_class_method(
            &api().ragged_tensor,
            "from_row_lengths",
            CallArgs::new()
                .arg(f64s(&[1.0, 2.0, 3.0]))
                .arg(Value::List(vec![Value::Int(1), Value::Int(2)])),
        )
        .unwrap();
    assert!(!out.is_placeholder());
    assert!(builder.nodes().is_empty());
}

pub fn test_foreign_placeholder_is_rejected(registry: Arc<DispatchRegistry>) {
    let mut other = GraphBuilder::new(registry.clone());
    let foreign = other.input(PlaceholderKind::Dense);
    let foreign_rt = other.input(PlaceholderKind::ragged(1));

    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let rt = builder.input(PlaceholderKind::ragged(1));
    assert_eq!(x.id(), foreign.id());
    assert_eq!(rt.id(), foreign_rt.id());

    let err = builder
        .call(&api().add, CallArgs::new().arg(&x).arg(&foreign))
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownPlaceholder(id) if id == foreign.id()));
    assert!(builder.nodes().is_empty());

    let err = builder.get_property(&foreign_rt, "values").unwrap_err();
    assert!(matches!(err, GraphError::UnknownPlaceholder(id) if id == rt.id()));
    assert!(builder.nodes().is_empty());

    let own = builder.call(&api().add, CallArgs::new().arg(&x).arg(&x)).unwrap();
    let foreign_out = other
        .call(&api().add, CallArgs::new().arg(&foreign).arg(1.0))
        .unwrap();
    assert!(matches!(
        builder.build(&[own, foreign_out]),
        Err(GraphError::UnknownPlaceholder(_))
    ));
}

#[test]
fn test_registration_is_idempotent() {
    let mut registry = DispatchRegistry::new(Arc::new(default_symbols()));
    registry.initialize();
    registry.initialize();
    assert!(!registry.register_global(Box::new(OpLambdaDispatcher)));

    let getitem = DispatchTarget::Operation(&api().getitem);
    assert!(!registry.register(getitem.key(), Box::new(SlicingOpDispatcher)));
    assert_eq!(registry.interceptor_count(getitem), 2);
    assert_eq!(
        registry.interceptor_count(DispatchTarget::Operation(&api().add)),
        1
    );
    for method in RAGGED_CLASS_METHODS {
        let target = DispatchTarget::ClassMethod {
            class: &api().ragged_tensor,
            method,
        };
        assert_eq!(registry.interceptor_count(target), 2);
    }

    let mut builder = GraphBuilder::new(Arc::new(registry));
    let x = builder.input(PlaceholderKind::Dense);
    let out = builder
        .call(&api().getitem, CallArgs::new().arg(&x).arg(0i64))
        .unwrap();
    assert!(out.is_placeholder());
    assert_eq!(builder.nodes().len(), 1);
}

#[test]
fn test_uninitialized_registry_calls_through() {
    let registry = Arc::new(DispatchRegistry::new(Arc::new(default_symbols())));
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    assert!(builder.call(&api().add, CallArgs::new().arg(&x).arg(1.0)).is_err());
    assert!(builder.nodes().is_empty());
}

#[test]
fn test_name_keyword_is_stripped() {
    let (registry, op) = registry_with_custom_op();
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let out = builder
        .call(&op, CallArgs::new().arg(&x).kwarg("name", "renamed"))
        .unwrap();
    let out = placeholder(&out);
    assert_eq!(out.producer().unwrap().layer_name, "tf.foo.bar");

    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph.execute(vec![f64s(&[4.0])]).unwrap();
    assert_close(&outputs[0], &[4.0]);
    match graph.nodes()[0].layer() {
        AnyLayer::OpLambda(layer) => {
            assert_eq!(layer.symbol(), Some("foo.bar"));
            assert!(layer.base().must_restore_from_config());
            assert!(layer.base().preserve_input_structure_in_config());
        }
        other => panic!("unexpected layer {other:?}"),
    }
}
