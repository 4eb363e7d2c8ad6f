use crate::symbols::{Operation, dense_output, like_first_input};
use crate::tensor::{DenseTensor, RaggedTensor, Tensor, normalize_index};
use crate::tensor::ragged::RaggedValues;
use crate::value::{CallArgs, Value, ValueError};
use ndarray::{ArrayD, Axis, IxDyn, Zip};

fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, ValueError> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(ValueError::InvalidShape(format!(
                    "shapes {:?} and {:?} are not broadcastable",
                    a, b
                )));
            }
        };
    }
    Ok(out)
}

fn zip_broadcast<A: Copy>(
    a: &ArrayD<A>,
    b: &ArrayD<A>,
    f: impl Fn(A, A) -> A,
) -> Result<ArrayD<A>, ValueError> {
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let not_broadcastable = || ValueError::InvalidShape(format!("cannot broadcast to {:?}", shape));
    let va = a.broadcast(IxDyn(&shape)).ok_or_else(not_broadcastable)?;
    let vb = b.broadcast(IxDyn(&shape)).ok_or_else(not_broadcastable)?;
    Ok(Zip::from(&va).and(&vb).map_collect(|x, y| f(*x, *y)))
}

#[derive(Clone, Copy)]
struct BinaryKernel {
    float: fn(f64, f64) -> f64,
    int: fn(i64, i64) -> i64,
}

const ADD: BinaryKernel = BinaryKernel {
    float: |a, b| a + b,
    int: |a, b| a.wrapping_add(b),
};

const MULTIPLY: BinaryKernel = BinaryKernel {
    float: |a, b| a * b,
    int: |a, b| a.wrapping_mul(b),
};

fn dense_binary(x: &DenseTensor, y: &DenseTensor, kernel: BinaryKernel) -> Result<DenseTensor, ValueError> {
    match (x, y) {
        (DenseTensor::I64(a), DenseTensor::I64(b)) => {
            Ok(DenseTensor::I64(zip_broadcast(a, b, kernel.int)?))
        }
        (DenseTensor::Bool(_), _) | (_, DenseTensor::Bool(_)) => Err(ValueError::TypeMismatch {
            expected: "numeric tensors",
            found: format!("{} and {}", x.dtype(), y.dtype()),
        }),
        _ => Ok(DenseTensor::F64(zip_broadcast(
            &x.to_f64_array(),
            &y.to_f64_array(),
            kernel.float,
        )?)),
    }
}

// Ragged operands combine through their flat values; the other operand must
// be a scalar or share the same row partitions.
fn binary(x: &Tensor, y: &Tensor, kernel: BinaryKernel) -> Result<Tensor, ValueError> {
    match (x, y) {
        (Tensor::Dense(a), Tensor::Dense(b)) => Ok(Tensor::Dense(dense_binary(a, b, kernel)?)),
        (Tensor::Ragged(a), Tensor::Dense(b)) if b.rank() == 0 => Ok(Tensor::Ragged(
            a.with_flat_values(dense_binary(a.flat_values(), b, kernel)?)?,
        )),
        (Tensor::Dense(a), Tensor::Ragged(b)) if a.rank() == 0 => Ok(Tensor::Ragged(
            b.with_flat_values(dense_binary(a, b.flat_values(), kernel)?)?,
        )),
        (Tensor::Ragged(a), Tensor::Ragged(b)) => {
            if a.nested_row_splits() != b.nested_row_splits() {
                return Err(ValueError::InvalidShape(
                    "ragged operands have different row partitions".to_string(),
                ));
            }
            Ok(Tensor::Ragged(a.with_flat_values(dense_binary(
                a.flat_values(),
                b.flat_values(),
                kernel,
            )?)?))
        }
        _ => Err(ValueError::Unsupported(format!(
            "elementwise op between {} and {} tensors",
            x.kind().class(),
            y.kind().class()
        ))),
    }
}

fn binary_op(name: &str, kernel: BinaryKernel) -> Operation {
    Operation::new(name, like_first_input, move |args: &CallArgs| {
        let x = args.require(0, "x")?.to_tensor()?;
        let y = args.require(1, "y")?.to_tensor()?;
        Ok(binary(&x, &y, kernel)?.into())
    })
}

pub fn add() -> Operation {
    binary_op("add", ADD)
}

pub fn multiply() -> Operation {
    binary_op("multiply", MULTIPLY)
}

fn sum_dense(x: &DenseTensor, axis: Option<usize>, keepdims: bool) -> Result<DenseTensor, ValueError> {
    let out = match (x, axis) {
        (DenseTensor::F64(a), None) => DenseTensor::scalar_f64(a.sum()),
        (DenseTensor::I64(a), None) => DenseTensor::scalar_i64(a.sum()),
        (DenseTensor::F64(a), Some(axis)) => DenseTensor::F64(a.sum_axis(Axis(axis))),
        (DenseTensor::I64(a), Some(axis)) => DenseTensor::I64(a.sum_axis(Axis(axis))),
        (DenseTensor::Bool(_), _) => {
            return Err(ValueError::TypeMismatch {
                expected: "numeric tensor",
                found: "bool tensor".to_string(),
            });
        }
    };
    if !keepdims {
        return Ok(out);
    }
    let mut shape = x.shape();
    match axis {
        Some(axis) => shape[axis] = 1,
        None => shape.iter_mut().for_each(|d| *d = 1),
    }
    out.reshape(&shape)
}

// Per-row sums over the ragged axis of a tensor with dense values.
fn sum_rows(x: &RaggedTensor) -> Result<DenseTensor, ValueError> {
    let RaggedValues::Dense(values) = x.values() else {
        return Err(ValueError::Unsupported(
            "reduce_sum over axis 1 of a nested ragged tensor".to_string(),
        ));
    };
    let mut rows = Vec::with_capacity(x.nrows());
    for bounds in x.row_splits().windows(2) {
        let row = values.slice_axis0(bounds[0] as usize, bounds[1] as usize)?;
        rows.push(sum_dense(&row, Some(0), false)?);
    }
    if rows.is_empty() {
        return Ok(DenseTensor::vector_f64(vec![]));
    }
    DenseTensor::stack(&rows)
}

pub fn reduce_sum() -> Operation {
    Operation::new("reduce_sum", dense_output, |args: &CallArgs| {
        let input = args.require(0, "input_tensor")?.to_tensor()?;
        let axis = args.optional(1, "axis").map(|x| x.to_i64()).transpose()?;
        let keepdims = matches!(args.get(2, "keepdims"), Some(Value::Bool(true)));
        let out = match (&input, axis) {
            (Tensor::Dense(x), axis) => {
                let axis = axis.map(|a| normalize_index(a, x.rank())).transpose()?;
                sum_dense(x, axis, keepdims)?
            }
            (Tensor::Ragged(x), None) => sum_dense(x.flat_values(), None, keepdims)?,
            (Tensor::Ragged(x), Some(a)) if normalize_index(a, x.rank()).ok() == Some(1) => {
                sum_rows(x)?
            },
            _ => {
                return Err(ValueError::Unsupported(format!(
                    "reduce_sum on a {} tensor along axis {:?}",
                    input.kind().class(),
                    axis
                ))
                .into());
            }
        };
        Ok(out.into())
    })
}
