//! `RaggedTensor` constructor-like class methods.

use crate::placeholder::PlaceholderKind;
use crate::symbols::OpClass;
use crate::tensor::{RaggedTensor, Tensor};
use crate::value::{CallArgs, Value, ValueError};

fn kind_of(value: Option<&Value>) -> PlaceholderKind {
    match value {
        Some(Value::Placeholder(p)) => p.kind(),
        Some(Value::Tensor(t)) => t.kind(),
        _ => PlaceholderKind::Dense,
    }
}

/// One ragged dimension wrapped around the values argument.
fn wrap_values(args: &CallArgs) -> PlaceholderKind {
    kind_of(args.get(0, "values")).outer()
}

/// One ragged dimension per nested partition tensor.
fn wrap_flat_values(args: &CallArgs) -> PlaceholderKind {
    let base = kind_of(args.get(0, "flat_values"));
    let partitions = args.args.get(1).or_else(|| {
        ["nested_value_rowids", "nested_row_splits", "nested_row_lengths"]
            .iter()
            .find_map(|key| args.kwargs.get(*key))
    });
    let levels = match partitions {
        Some(Value::List(items)) => items.len().max(1),
        _ => 1,
    };
    PlaceholderKind::ragged(base.ragged_rank() + levels)
}

fn ragged_rank_one(_args: &CallArgs) -> PlaceholderKind {
    PlaceholderKind::ragged(1)
}

fn optional_i64(args: &CallArgs, index: usize, name: &str) -> Result<Option<i64>, ValueError> {
    args.optional(index, name).map(|x| x.to_i64()).transpose()
}

fn nested_vectors(value: &Value) -> Result<Vec<Vec<i64>>, ValueError> {
    match value {
        Value::List(items) => items.iter().map(|x| x.to_i64_vec()).collect(),
        other => Err(ValueError::mismatch("list of integer vectors", other)),
    }
}

fn ragged(result: RaggedTensor) -> anyhow::Result<Value> {
    Ok(Tensor::Ragged(result).into())
}

pub fn ragged_tensor_class() -> OpClass {
    OpClass::builder("RaggedTensor")
        .method("from_value_rowids", wrap_values, |args: &CallArgs| {
            let values = args.require(0, "values")?.to_tensor()?;
            let rowids = args.require(1, "value_rowids")?.to_i64_vec()?;
            let nrows = optional_i64(args, 2, "nrows")?;
            ragged(RaggedTensor::from_value_rowids(values, &rowids, nrows)?)
        })
        .method("from_row_splits", wrap_values, |args: &CallArgs| {
            let values = args.require(0, "values")?.to_tensor()?;
            let splits = args.require(1, "row_splits")?.to_i64_vec()?;
            ragged(RaggedTensor::from_row_splits(values, splits)?)
        })
        .method("from_row_lengths", wrap_values, |args: &CallArgs| {
            let values = args.require(0, "values")?.to_tensor()?;
            let lengths = args.require(1, "row_lengths")?.to_i64_vec()?;
            ragged(RaggedTensor::from_row_lengths(values, &lengths)?)
        })
        .method("from_row_starts", wrap_values, |args: &CallArgs| {
            let values = args.require(0, "values")?.to_tensor()?;
            let starts = args.require(1, "row_starts")?.to_i64_vec()?;
            ragged(RaggedTensor::from_row_starts(values, &starts)?)
        })
        .method("from_row_limits", wrap_values, |args: &CallArgs| {
            let values = args.require(0, "values")?.to_tensor()?;
            let limits = args.require(1, "row_limits")?.to_i64_vec()?;
            ragged(RaggedTensor::from_row_limits(values, &limits)?)
        })
        .method("from_uniform_row_length", wrap_values, |args: &CallArgs| {
            let values = args.require(0, "values")?.to_tensor()?;
            let length = args.require(1, "uniform_row_length")?.to_i64()?;
            let nrows = optional_i64(args, 2, "nrows")?;
            ragged(RaggedTensor::from_uniform_row_length(values, length, nrows)?)
        })
        .method("from_nested_value_rowids", wrap_flat_values, |args: &CallArgs| {
            let flat = args.require(0, "flat_values")?.to_tensor()?;
            let rowids = nested_vectors(args.require(1, "nested_value_rowids")?)?;
            let nrows = args
                .optional(2, "nested_nrows")
                .map(|x| x.to_i64_vec())
                .transpose()?;
            ragged(RaggedTensor::from_nested_value_rowids(
                flat,
                &rowids,
                nrows.as_deref(),
            )?)
        })
        .method("from_nested_row_splits", wrap_flat_values, |args: &CallArgs| {
            let flat = args.require(0, "flat_values")?.to_tensor()?;
            let splits = nested_vectors(args.require(1, "nested_row_splits")?)?;
            ragged(RaggedTensor::from_nested_row_splits(flat, &splits)?)
        })
        .method("from_nested_row_lengths", wrap_flat_values, |args: &CallArgs| {
            let flat = args.require(0, "flat_values")?.to_tensor()?;
            let lengths = nested_vectors(args.require(1, "nested_row_lengths")?)?;
            ragged(RaggedTensor::from_nested_row_lengths(flat, &lengths)?)
        })
        .method("from_tensor", ragged_rank_one, |args: &CallArgs| {
            let tensor = args.require(0, "tensor")?.to_dense()?;
            let lengths = args
                .optional(1, "lengths")
                .map(|x| x.to_i64_vec())
                .transpose()?;
            let padding = args
                .optional(2, "padding")
                .map(|x| x.to_dense())
                .transpose()?;
            ragged(RaggedTensor::from_tensor(
                &tensor,
                lengths.as_deref(),
                padding.as_ref(),
            )?)
        })
        .method("from_sparse", ragged_rank_one, |args: &CallArgs| {
            let input = args.require(0, "st_input")?.to_tensor()?;
            let Tensor::Sparse(sparse) = &input else {
                return Err(ValueError::TypeMismatch {
                    expected: "sparse tensor",
                    found: format!("{} tensor", input.kind().class()),
                }
                .into());
            };
            ragged(RaggedTensor::from_sparse(sparse)?)
        })
        .build()
}
