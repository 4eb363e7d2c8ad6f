use super::{f64s, ragged_f64, registry_with_custom_op};
use op_lambda::api::api;
use op_lambda::dispatch::DispatchRegistry;
use op_lambda::graph::config::GraphConfig;
use op_lambda::graph::{FunctionalGraph, GraphBuilder};
use op_lambda::layers::{
    AnyLayer, ClassMethod, InstanceMethod, InstanceProperty, Layer, LayerContext, LayerError,
    LayerOptions, OpLambda,
};
use op_lambda::naming::NameScope;
use op_lambda::placeholder::PlaceholderKind;
use op_lambda::symbols::{Operation, dense_output};
use op_lambda::value::{CallArgs, SliceSpec, Value};
use serde_json::json;
use std::sync::Arc;

pub fn test_property_config_roundtrip(registry: Arc<DispatchRegistry>) {
    let names = NameScope::new();
    let ctx = LayerContext {
        names: &names,
        symbols: registry.symbols(),
    };
    let layer = InstanceProperty::new(ctx, "values", LayerOptions::default()).unwrap();
    let config = layer.get_config().unwrap();
    assert_eq!(
        config,
        json!({"attribute_name": "values", "name": "input.values", "trainable": true})
    );

    let restored_names = NameScope::new();
    let restored = AnyLayer::from_config(
        InstanceProperty::CLASS_NAME,
        config,
        LayerContext {
            names: &restored_names,
            symbols: registry.symbols(),
        },
    )
    .unwrap();
    let AnyLayer::InstanceProperty(restored) = restored else {
        panic!("expected a property layer");
    };
    assert_eq!(restored.attribute_name(), "values");
    assert_eq!(restored.name(), "input.values");
    assert!(restored_names.is_observed("input.values"));

    let input = CallArgs::new().arg(ragged_f64(&[1.0, 2.0, 3.0], &[0, 1, 3]));
    assert_eq!(layer.call(&input).unwrap(), restored.call(&input).unwrap());

    let method = InstanceMethod::new(ctx, "to_tensor", LayerOptions::default()).unwrap();
    assert_eq!(method.get_config().unwrap()["attribute_name"], "to_tensor");
}

pub fn test_class_method_config(registry: Arc<DispatchRegistry>) {
    let names = NameScope::new();
    let ctx = LayerContext {
        names: &names,
        symbols: registry.symbols(),
    };
    let layer = ClassMethod::new(
        ctx,
        api().ragged_tensor.clone(),
        "from_row_lengths",
        LayerOptions::default(),
    )
    .unwrap();
    let config = layer.get_config().unwrap();
    assert_eq!(
        config,
        json!({
            "symbol": "RaggedTensor",
            "method_name": "from_row_lengths",
            "name": "tf.RaggedTensor.from_row_lengths",
            "trainable": true
        })
    );

    let restored = ClassMethod::from_config(config, ctx).unwrap();
    assert_eq!(restored.class(), &api().ragged_tensor);
    assert_eq!(restored.method_name(), "from_row_lengths");

    let missing = ClassMethod::new(
        ctx,
        api().ragged_tensor.clone(),
        "from_nothing",
        LayerOptions::default(),
    );
    assert!(matches!(missing, Err(LayerError::MissingClassMethod { .. })));

    let unknown = AnyLayer::from_config("NoSuchLayer", json!({"name": "x"}), ctx);
    assert!(matches!(unknown, Err(LayerError::InvalidConfig(_))));
}

pub fn test_graph_config_roundtrip(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry.clone());
    let values = builder.input(PlaceholderKind::Dense);
    let count = builder.input(PlaceholderKind::Dense);
    let head = builder
        .call(
            &api().getitem,
            CallArgs::new()
                .arg(&values)
                .arg(Value::Slice(SliceSpec::range(0i64, &count))),
        )
        .unwrap();
    let rt = builder
        .call_class_method(
            &api().ragged_tensor,
            "from_row_lengths",
            CallArgs::new()
                .arg(head)
                .arg(Value::List(vec![Value::Int(1), Value::Int(2)])),
        )
        .unwrap();
    let flat = builder
        .get_property(rt.as_placeholder().unwrap(), "flat_values")
        .unwrap();
    let total = builder
        .call(&api().reduce_sum, CallArgs::new().arg(flat))
        .unwrap();
    let graph = builder.build(&[rt, total]).unwrap();

    let config = graph.get_config().unwrap();
    assert_eq!(
        config.layer("tf.__operators__.getitem").unwrap().class_name,
        "SlicingOpLambda"
    );
    assert!(matches!(
        &config.nodes[0].inputs.args[1],
        Value::Map(map) if map.len() == 3 && map.contains_key("stop")
    ));

    let text = config.to_json().unwrap();
    let parsed = GraphConfig::from_json(&text).unwrap();
    assert_eq!(parsed, config);
    let restored = FunctionalGraph::from_config(&parsed, &registry).unwrap();
    assert_eq!(restored.nodes().len(), graph.nodes().len());
    assert_eq!(
        restored.outputs()[1].producer().unwrap().layer_name,
        "tf.math.reduce_sum"
    );

    let feeds = vec![f64s(&[1.0, 2.0, 3.0, 4.0]), Value::Int(3)];
    let expected = graph.execute(feeds.clone()).unwrap();
    let actual = restored.execute(feeds).unwrap();
    assert_eq!(actual, expected);
    assert_eq!(actual[0], ragged_f64(&[1.0, 2.0, 3.0], &[0, 1, 3]));
}

pub fn test_input_structure_flag(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let x = builder.input(PlaceholderKind::Dense);
    let wrapped = || {
        CallArgs::new()
            .arg(Value::List(vec![Value::from(&x)]))
            .kwarg("axis", 0i64)
    };
    let preserved = builder.call(&api().concat, wrapped()).unwrap();

    let mut layer = OpLambda::new(
        builder.layer_context(),
        api().concat.clone(),
        LayerOptions::named("flat_concat"),
    );
    layer
        .base_mut()
        .set_preserve_input_structure_in_config(false);
    let unnested = builder.apply_layer(layer.into(), wrapped()).unwrap();

    let graph = builder.build(&[preserved, unnested]).unwrap();
    let config = graph.get_config().unwrap();
    assert_eq!(config.nodes[0].layer, "tf.concat");
    assert_eq!(
        config.nodes[0].inputs.args[0],
        Value::List(vec![Value::from(&x)])
    );
    assert_eq!(config.nodes[1].layer, "flat_concat");
    assert_eq!(config.nodes[1].inputs.args[0], Value::from(&x));
}

#[test]
fn test_operation_symbol_roundtrip() {
    let (registry, op) = registry_with_custom_op();
    let names = NameScope::new();
    let ctx = LayerContext {
        names: &names,
        symbols: registry.symbols(),
    };
    let layer = OpLambda::new(ctx, op.clone(), LayerOptions::default());
    let config = layer.get_config().unwrap();
    assert_eq!(config["symbol"], "foo.bar");
    assert_eq!(config["name"], "tf.foo.bar");

    let restored = OpLambda::from_config(json!({"symbol": "foo.bar", "name": "again"}), ctx).unwrap();
    assert_eq!(restored.function(), &op);
    assert_eq!(restored.name(), "again");
    let input = CallArgs::new().arg(3i64);
    assert_eq!(restored.call(&input).unwrap(), layer.call(&input).unwrap());
}

#[test]
fn test_unresolved_symbol_is_named() {
    let (registry, _) = registry_with_custom_op();
    let names = NameScope::new();
    let ctx = LayerContext {
        names: &names,
        symbols: registry.symbols(),
    };
    let err = OpLambda::from_config(json!({"symbol": "no.such.symbol", "name": "x"}), ctx)
        .unwrap_err();
    assert!(matches!(err, LayerError::UnresolvedSymbol(ref s) if s == "no.such.symbol"));
    assert!(err.to_string().contains("no.such.symbol"));

    let class_as_op = OpLambda::from_config(json!({"symbol": "RaggedTensor", "name": "y"}), ctx);
    assert!(matches!(class_as_op, Err(LayerError::UnresolvedSymbol(_))));
}

#[test]
fn test_unexported_operation_cannot_be_saved() {
    let (registry, _) = registry_with_custom_op();
    let names = NameScope::new();
    let ctx = LayerContext {
        names: &names,
        symbols: registry.symbols(),
    };
    let op = Operation::new("private_op", dense_output, |_: &CallArgs| Ok(Value::None));
    let layer = OpLambda::new(ctx, op, LayerOptions::default());
    assert_eq!(layer.name(), "private_op");
    assert_eq!(layer.symbol(), None);
    assert_eq!(layer.call(&CallArgs::new()).unwrap(), Value::None);
    match layer.get_config() {
        Err(LayerError::UnserializableOperation { layer, operation }) => {
            assert_eq!(layer, "private_op");
            assert_eq!(operation, "private_op");
        }
        other => panic!("unexpected result {other:?}"),
    }
}
