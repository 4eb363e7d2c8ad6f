use op_lambda::dispatch::DispatchRegistry;
use op_lambda::placeholder::Placeholder;
use op_lambda::symbols::{ApiNamespace, Operation, like_first_input};
use op_lambda::tensor::{DenseTensor, RaggedTensor, Tensor};
use op_lambda::value::{CallArgs, Value};
use std::sync::Arc;

pub mod class_methods;
pub mod config;
pub mod delegation;
pub mod dispatch;
pub mod variables;

fn placeholder(value: &Value) -> Placeholder {
    value
        .as_placeholder()
        .cloned()
        .unwrap_or_else(|| panic!("expected a placeholder, got {value:?}"))
}

fn f64s(data: &[f64]) -> Value {
    DenseTensor::vector_f64(data.to_vec()).into()
}

fn ragged_f64(data: &[f64], splits: &[i64]) -> Value {
    let rt = RaggedTensor::from_row_splits(DenseTensor::vector_f64(data.to_vec()).into(), splits.to_vec())
        .unwrap();
    Tensor::Ragged(rt).into()
}

fn as_ragged(value: &Value) -> &RaggedTensor {
    match value {
        Value::Tensor(Tensor::Ragged(rt)) => rt,
        other => panic!("expected a ragged tensor, got {other:?}"),
    }
}

fn assert_close(value: &Value, expected: &[f64]) {
    let dense = value.to_dense().unwrap();
    let actual: Vec<f64> = dense.to_f64_array().iter().copied().collect();
    assert_eq!(actual.len(), expected.len(), "{actual:?} != {expected:?}");
    for (a, b) in actual.iter().zip(expected) {
        assert!((a - b).abs() < 1e-9, "{actual:?} != {expected:?}");
    }
}

/// Default operations plus `tf.foo.bar`, an identity on its first argument
/// that refuses a `name` keyword.
fn registry_with_custom_op() -> (Arc<DispatchRegistry>, Operation) {
    let op = Operation::new("bar", like_first_input, |args: &CallArgs| {
        if args.kwargs.contains_key("name") {
            anyhow::bail!("unexpected name keyword");
        }
        Ok(args.require(0, "x")?.clone())
    });
    let mut symbols = op_lambda::api::default_symbols();
    symbols.export(ApiNamespace::Tf, "foo.bar", op.clone());
    let mut registry = DispatchRegistry::new(Arc::new(symbols));
    registry.initialize();
    (Arc::new(registry), op)
}
