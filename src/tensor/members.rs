//! Properties and methods of runtime tensors, looked up by member name.
//!
//! Lookup happens once, when a member-access layer is built; the resolved
//! function handles are invoked directly on every replay.

use crate::placeholder::{PlaceholderClass, PlaceholderKind};
use crate::tensor::{DenseTensor, RaggedTensor, SplitsDType, Tensor};
use crate::tensor::ragged::RaggedValues;
use crate::value::{CallArgs, Value, ValueError};
use anyhow::anyhow;

pub type PropertyFn = fn(&Tensor) -> anyhow::Result<Value>;
pub type MethodFn = fn(&Tensor, &CallArgs) -> anyhow::Result<Value>;

/// Handles for one member name on each tensor class that has it.
#[derive(Clone, Copy)]
pub struct MemberTable<F> {
    pub dense: Option<F>,
    pub ragged: Option<F>,
    pub sparse: Option<F>,
}

impl<F: Copy> MemberTable<F> {
    pub fn get(&self, class: PlaceholderClass) -> Option<F> {
        match class {
            PlaceholderClass::Dense => self.dense,
            PlaceholderClass::Ragged => self.ragged,
            PlaceholderClass::Sparse => self.sparse,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_none() && self.ragged.is_none() && self.sparse.is_none()
    }
}

impl<F> std::fmt::Debug for MemberTable<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberTable")
            .field("dense", &self.dense.is_some())
            .field("ragged", &self.ragged.is_some())
            .field("sparse", &self.sparse.is_some())
            .finish()
    }
}

pub fn property(name: &str) -> MemberTable<PropertyFn> {
    MemberTable {
        dense: dense_property(name),
        ragged: ragged_property(name),
        sparse: sparse_property(name),
    }
}

pub fn method(name: &str) -> MemberTable<MethodFn> {
    MemberTable {
        dense: None,
        ragged: ragged_method(name),
        sparse: sparse_method(name),
    }
}

fn ints(values: Vec<i64>) -> Value {
    DenseTensor::vector_i64(values).into()
}

fn int_lists(values: Vec<Vec<i64>>) -> Value {
    Value::List(values.into_iter().map(ints).collect())
}

fn ragged(tensor: &Tensor) -> anyhow::Result<&RaggedTensor> {
    match tensor {
        Tensor::Ragged(x) => Ok(x),
        _ => Err(ValueError::TypeMismatch {
            expected: "ragged tensor",
            found: format!("{} tensor", tensor.kind().class()),
        }
        .into()),
    }
}

fn dense_property(name: &str) -> Option<PropertyFn> {
    let f: PropertyFn = match name {
        "shape" => |t| {
            let shape = t.as_dense()?.shape();
            Ok(ints(shape.into_iter().map(|x| x as i64).collect()))
        },
        _ => return None,
    };
    Some(f)
}

fn ragged_property(name: &str) -> Option<PropertyFn> {
    let f: PropertyFn = match name {
        "values" => |t| Ok(ragged(t)?.values().to_tensor().into()),
        "flat_values" => |t| Ok(ragged(t)?.flat_values().clone().into()),
        "row_splits" => |t| Ok(ints(ragged(t)?.row_splits().to_vec())),
        "nested_row_splits" => |t| Ok(int_lists(ragged(t)?.nested_row_splits())),
        "ragged_rank" => |t| Ok(Value::Int(ragged(t)?.ragged_rank() as i64)),
        "shape" => |t| Ok(ints(ragged(t)?.bounding_shape())),
        // Row partitions built from splits carry no uniform length.
        "uniform_row_length" => |t| {
            ragged(t)?;
            Ok(Value::None)
        },
        _ => return None,
    };
    Some(f)
}

fn sparse_property(name: &str) -> Option<PropertyFn> {
    let f: PropertyFn = match name {
        "indices" => |t| match t {
            Tensor::Sparse(x) => Ok(x.indices_tensor()?.into()),
            _ => Err(anyhow!("indices is only defined on sparse tensors")),
        },
        "values" => |t| match t {
            Tensor::Sparse(x) => Ok(x.values().clone().into()),
            _ => Err(anyhow!("values is only defined on sparse tensors")),
        },
        "dense_shape" => |t| match t {
            Tensor::Sparse(x) => Ok(ints(x.dense_shape().to_vec())),
            _ => Err(anyhow!("dense_shape is only defined on sparse tensors")),
        },
        _ => return None,
    };
    Some(f)
}

fn ragged_method(name: &str) -> Option<MethodFn> {
    let f: MethodFn = match name {
        "value_rowids" => |t, _| Ok(ints(ragged(t)?.value_rowids())),
        "nested_value_rowids" => |t, _| Ok(int_lists(ragged(t)?.nested_value_rowids())),
        "nrows" => |t, _| Ok(DenseTensor::scalar_i64(ragged(t)?.nrows() as i64).into()),
        "row_starts" => |t, _| Ok(ints(ragged(t)?.row_starts())),
        "row_limits" => |t, _| Ok(ints(ragged(t)?.row_limits())),
        "row_lengths" => |t, args| {
            let axis = match args.optional(0, "axis") {
                Some(x) => x.to_i64()?,
                None => 1,
            };
            Ok(row_lengths(ragged(t)?, axis)?.into())
        },
        "nested_row_lengths" => |t, _| Ok(int_lists(ragged(t)?.nested_row_lengths())),
        "bounding_shape" => |t, args| {
            let shape = ragged(t)?.bounding_shape();
            match args.optional(0, "axis") {
                Some(axis) => {
                    let axis = crate::tensor::normalize_index(axis.to_i64()?, shape.len())?;
                    Ok(DenseTensor::scalar_i64(shape[axis]).into())
                }
                None => Ok(ints(shape)),
            }
        },
        "with_values" => |t, args| {
            let values = args.require(0, "new_values")?.to_tensor()?;
            Ok(Tensor::Ragged(ragged(t)?.with_values(values)?).into())
        },
        "with_flat_values" => |t, args| {
            let values = args.require(0, "new_values")?.to_dense()?;
            Ok(Tensor::Ragged(ragged(t)?.with_flat_values(values)?).into())
        },
        "with_row_splits_dtype" => |t, args| {
            let dtype = args.require(0, "dtype")?;
            let dtype: SplitsDType = dtype
                .as_str()
                .ok_or_else(|| ValueError::mismatch("dtype name", dtype))?
                .parse()
                .map_err(|_| anyhow!("row_splits dtype must be int32 or int64"))?;
            Ok(Tensor::Ragged(ragged(t)?.with_row_splits_dtype(dtype)?).into())
        },
        "merge_dims" => |t, args| {
            let outer = args.require(0, "outer_axis")?.to_i64()?;
            let inner = args.require(1, "inner_axis")?.to_i64()?;
            Ok(ragged(t)?.merge_dims(outer, inner)?.into())
        },
        "to_tensor" => |t, args| {
            let default = args
                .optional(0, "default_value")
                .map(|x| x.to_dense())
                .transpose()?;
            Ok(ragged(t)?.to_tensor(default.as_ref())?.into())
        },
        "to_sparse" => |t, _| Ok(Tensor::Sparse(ragged(t)?.to_sparse()?).into()),
        _ => return None,
    };
    Some(f)
}

fn sparse_method(name: &str) -> Option<MethodFn> {
    let f: MethodFn = match name {
        "with_values" => |t, args| match t {
            Tensor::Sparse(x) => {
                let values = args.require(0, "new_values")?.to_dense()?;
                Ok(Tensor::Sparse(x.with_values(values)?).into())
            }
            _ => Err(anyhow!("with_values expects a sparse tensor here")),
        },
        _ => return None,
    };
    Some(f)
}

/// Kind of the value `input.<name>` produces.
pub fn property_kind(name: &str, input: PlaceholderKind) -> PlaceholderKind {
    match (input, name) {
        (PlaceholderKind::Ragged { .. }, "values") => input.inner(),
        _ => PlaceholderKind::Dense,
    }
}

/// Kind of the value `input.<name>(*args, **kwargs)` produces.
pub fn method_kind(name: &str, input: PlaceholderKind, args: &CallArgs) -> PlaceholderKind {
    let ragged_rank = input.ragged_rank();
    match name {
        "with_values" if input.class() == PlaceholderClass::Ragged => {
            value_kind(args.get(0, "new_values")).outer()
        }
        "with_values" | "to_sparse" => PlaceholderKind::Sparse,
        "with_flat_values" | "with_row_splits_dtype" => input,
        "row_lengths" => match args.optional(0, "axis").and_then(|x| x.as_i64()) {
            Some(axis) if axis > 1 => PlaceholderKind::ragged(axis as usize - 1),
            _ => PlaceholderKind::Dense,
        },
        "merge_dims" => {
            let outer = args.get(0, "outer_axis").and_then(|x| x.as_i64()).unwrap_or(0);
            let inner = args.get(1, "inner_axis").and_then(|x| x.as_i64()).unwrap_or(-1);
            // A negative inner axis reaches past every ragged axis.
            let inner = if inner < 0 { ragged_rank as i64 } else { inner.min(ragged_rank as i64) };
            let merged = (inner - outer.max(0)).max(0) as usize;
            match ragged_rank.saturating_sub(merged) {
                0 => PlaceholderKind::Dense,
                rank => PlaceholderKind::ragged(rank),
            }
        }
        _ => PlaceholderKind::Dense,
    }
}

fn value_kind(value: Option<&Value>) -> PlaceholderKind {
    match value {
        Some(Value::Placeholder(p)) => p.kind(),
        Some(Value::Tensor(t)) => t.kind(),
        _ => PlaceholderKind::Dense,
    }
}

/// Row lengths along `axis`; ragged again for axes past the first.
fn row_lengths(tensor: &RaggedTensor, axis: i64) -> Result<Tensor, ValueError> {
    match axis {
        1 => Ok(DenseTensor::vector_i64(tensor.row_lengths()).into()),
        a if a > 1 => match tensor.values() {
            RaggedValues::Ragged(inner) => {
                let lengths = row_lengths(inner, a - 1)?;
                Ok(Tensor::Ragged(tensor.with_values(lengths)?))
            }
            RaggedValues::Dense(_) => Err(ValueError::Unsupported(format!(
                "row_lengths on uniform axis {}",
                a
            ))),
        },
        _ => Err(ValueError::Invalid(format!(
            "row_lengths axis must be at least 1, got {}",
            axis
        ))),
    }
}
