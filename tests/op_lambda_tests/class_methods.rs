use super::{f64s, placeholder};
use op_lambda::api::api;
use op_lambda::dispatch::DispatchRegistry;
use op_lambda::graph::GraphBuilder;
use op_lambda::placeholder::PlaceholderKind;
use op_lambda::tensor::DenseTensor;
use op_lambda::value::{CallArgs, Value};
use std::sync::Arc;

fn ints(data: &[i64]) -> Value {
    Value::List(data.iter().map(|x| Value::Int(*x)).collect())
}

/// Record `method` with its first argument replaced by a placeholder, then
/// check the replay against calling the method directly.
fn check_recorded(
    registry: Arc<DispatchRegistry>,
    method: &str,
    args: CallArgs,
    expected_kind: PlaceholderKind,
) {
    let class = &api().ragged_tensor;
    let mut builder = GraphBuilder::new(registry);
    let input = builder.input(PlaceholderKind::Dense);
    let mut recorded = args.clone();
    recorded.args[0] = Value::from(&input);

    let out = placeholder(&builder.call_class_method(class, method, recorded).unwrap());
    assert_eq!(out.kind(), expected_kind);
    let producer = out.producer().unwrap();
    assert_eq!(producer.class_name, "ClassMethod");
    assert_eq!(producer.layer_name, format!("tf.RaggedTensor.{}", method));

    let graph = builder.build(&[out.into()]).unwrap();
    let replayed = graph.execute(vec![args.args[0].clone()]).unwrap();
    let direct = class.method(method).unwrap().call(&args).unwrap();
    assert_eq!(replayed[0], direct);
}

fn five_values() -> Value {
    f64s(&[1.0, 2.0, 3.0, 4.0, 5.0])
}

pub fn test_from_row_splits(registry: Arc<DispatchRegistry>) {
    let args = CallArgs::new().arg(five_values()).arg(ints(&[0, 2, 2, 5]));
    check_recorded(registry, "from_row_splits", args, PlaceholderKind::ragged(1));
}

pub fn test_from_row_lengths(registry: Arc<DispatchRegistry>) {
    let args = CallArgs::new().arg(five_values()).arg(ints(&[2, 0, 3]));
    check_recorded(registry, "from_row_lengths", args, PlaceholderKind::ragged(1));
}

pub fn test_from_value_rowids(registry: Arc<DispatchRegistry>) {
    let args = CallArgs::new()
        .arg(five_values())
        .arg(ints(&[0, 0, 2, 2, 2]))
        .kwarg("nrows", 4i64);
    check_recorded(registry, "from_value_rowids", args, PlaceholderKind::ragged(1));
}

pub fn test_from_row_starts(registry: Arc<DispatchRegistry>) {
    let args = CallArgs::new().arg(five_values()).arg(ints(&[0, 2, 2]));
    check_recorded(registry, "from_row_starts", args, PlaceholderKind::ragged(1));
}

pub fn test_from_row_limits(registry: Arc<DispatchRegistry>) {
    let args = CallArgs::new().arg(five_values()).arg(ints(&[2, 2, 5]));
    check_recorded(registry, "from_row_limits", args, PlaceholderKind::ragged(1));
}

pub fn test_from_uniform_row_length(registry: Arc<DispatchRegistry>) {
    let args = CallArgs::new()
        .arg(f64s(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
        .arg(2i64);
    check_recorded(
        registry,
        "from_uniform_row_length",
        args,
        PlaceholderKind::ragged(1),
    );
}

pub fn test_from_nested_row_splits(registry: Arc<DispatchRegistry>) {
    let splits = Value::List(vec![ints(&[0, 1, 3]), ints(&[0, 2, 2, 5])]);
    let args = CallArgs::new().arg(five_values()).arg(splits);
    check_recorded(
        registry,
        "from_nested_row_splits",
        args,
        PlaceholderKind::ragged(2),
    );
}

pub fn test_from_tensor(registry: Arc<DispatchRegistry>) {
    let tensor =
        DenseTensor::from_vec_shape_f64(vec![1.0, 2.0, 0.0, 3.0, 0.0, 0.0], vec![2, 3]).unwrap();
    let args = CallArgs::new()
        .arg(tensor)
        .kwarg("lengths", ints(&[2, 1]));
    check_recorded(registry, "from_tensor", args, PlaceholderKind::ragged(1));
}
