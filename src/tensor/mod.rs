//! Runtime values wrapped operations execute on once a graph is replayed.

pub mod members;
pub mod ragged;
pub mod sparse;

pub use ragged::{RaggedTensor, SplitsDType};
pub use sparse::SparseTensor;

use crate::placeholder::PlaceholderKind;
use crate::value::{Value, ValueError};
use ndarray::{Array1, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    F64,
    I64,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DenseTensor {
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
    Bool(ArrayD<bool>),
}

macro_rules! map_dense {
    ($tensor:expr, $array:ident => $body:expr) => {
        match $tensor {
            DenseTensor::F64($array) => DenseTensor::F64($body),
            DenseTensor::I64($array) => DenseTensor::I64($body),
            DenseTensor::Bool($array) => DenseTensor::Bool($body),
        }
    };
}

fn reshape_typed<A: Clone>(array: &ArrayD<A>, shape: &[usize]) -> Result<ArrayD<A>, ValueError> {
    ArrayD::from_shape_vec(IxDyn(shape), array.iter().cloned().collect())
        .map_err(|e| ValueError::InvalidShape(e.to_string()))
}

fn concat_typed<A: Clone>(arrays: &[&ArrayD<A>], axis: usize) -> Result<ArrayD<A>, ValueError> {
    let views: Vec<_> = arrays.iter().map(|x| x.view()).collect();
    ndarray::concatenate(Axis(axis), &views).map_err(|e| ValueError::InvalidShape(e.to_string()))
}

impl DenseTensor {
    pub fn from_vec_shape_f64(data: Vec<f64>, shape: Vec<usize>) -> Result<Self, ValueError> {
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map(DenseTensor::F64)
            .map_err(|e| ValueError::InvalidShape(e.to_string()))
    }

    pub fn from_vec_shape_i64(data: Vec<i64>, shape: Vec<usize>) -> Result<Self, ValueError> {
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map(DenseTensor::I64)
            .map_err(|e| ValueError::InvalidShape(e.to_string()))
    }

    pub fn vector_f64(data: Vec<f64>) -> Self {
        DenseTensor::F64(Array1::from(data).into_dyn())
    }

    pub fn vector_i64(data: Vec<i64>) -> Self {
        DenseTensor::I64(Array1::from(data).into_dyn())
    }

    pub fn vector_bool(data: Vec<bool>) -> Self {
        DenseTensor::Bool(Array1::from(data).into_dyn())
    }

    pub fn scalar_f64(x: f64) -> Self {
        DenseTensor::F64(ArrayD::from_elem(IxDyn(&[]), x))
    }

    pub fn scalar_i64(x: i64) -> Self {
        DenseTensor::I64(ArrayD::from_elem(IxDyn(&[]), x))
    }

    pub fn scalar_bool(x: bool) -> Self {
        DenseTensor::Bool(ArrayD::from_elem(IxDyn(&[]), x))
    }

    pub fn dtype(&self) -> DType {
        match self {
            DenseTensor::F64(_) => DType::F64,
            DenseTensor::I64(_) => DType::I64,
            DenseTensor::Bool(_) => DType::Bool,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            DenseTensor::F64(x) => x.shape().to_vec(),
            DenseTensor::I64(x) => x.shape().to_vec(),
            DenseTensor::Bool(x) => x.shape().to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Size of the outermost dimension.
    pub fn dim0(&self) -> Result<usize, ValueError> {
        self.shape()
            .first()
            .copied()
            .ok_or_else(|| ValueError::InvalidShape("scalar has no outer dimension".to_string()))
    }

    pub fn as_scalar_i64(&self) -> Result<i64, ValueError> {
        match self {
            DenseTensor::I64(x) if x.ndim() == 0 => x
                .first()
                .copied()
                .ok_or_else(|| ValueError::InvalidShape("empty scalar".to_string())),
            _ => Err(ValueError::TypeMismatch {
                expected: "integer scalar",
                found: format!("{} tensor of rank {}", self.dtype(), self.rank()),
            }),
        }
    }

    /// All elements of an integer tensor in row-major order.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, ValueError> {
        match self {
            DenseTensor::I64(x) => Ok(x.iter().copied().collect()),
            _ => Err(ValueError::TypeMismatch {
                expected: "integer tensor",
                found: format!("{} tensor", self.dtype()),
            }),
        }
    }

    pub fn to_bool_vec(&self) -> Result<Vec<bool>, ValueError> {
        match self {
            DenseTensor::Bool(x) => Ok(x.iter().copied().collect()),
            DenseTensor::I64(x) => Ok(x.iter().map(|v| *v != 0).collect()),
            DenseTensor::F64(_) => Err(ValueError::TypeMismatch {
                expected: "boolean tensor",
                found: "f64 tensor".to_string(),
            }),
        }
    }

    pub fn to_f64_array(&self) -> ArrayD<f64> {
        match self {
            DenseTensor::F64(x) => x.clone(),
            DenseTensor::I64(x) => x.mapv(|v| v as f64),
            DenseTensor::Bool(x) => x.mapv(|v| if v { 1.0 } else { 0.0 }),
        }
    }

    pub fn index_axis0(&self, index: usize) -> Result<Self, ValueError> {
        let size = self.dim0()?;
        if index >= size {
            return Err(ValueError::IndexOutOfBounds {
                index: index as i64,
                size,
            });
        }
        Ok(map_dense!(self, x => x.index_axis(Axis(0), index).to_owned()))
    }

    pub fn select_axis(&self, axis: usize, indices: &[usize]) -> Result<Self, ValueError> {
        let shape = self.shape();
        let size = *shape
            .get(axis)
            .ok_or_else(|| ValueError::InvalidShape(format!("no axis {} in rank {}", axis, shape.len())))?;
        if let Some(bad) = indices.iter().find(|i| **i >= size) {
            return Err(ValueError::IndexOutOfBounds {
                index: *bad as i64,
                size,
            });
        }
        Ok(map_dense!(self, x => x.select(Axis(axis), indices)))
    }

    pub fn slice_axis0(&self, start: usize, end: usize) -> Result<Self, ValueError> {
        let indices: Vec<usize> = (start..end).collect();
        self.select_axis(0, &indices)
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Self, ValueError> {
        Ok(match self {
            DenseTensor::F64(x) => DenseTensor::F64(reshape_typed(x, shape)?),
            DenseTensor::I64(x) => DenseTensor::I64(reshape_typed(x, shape)?),
            DenseTensor::Bool(x) => DenseTensor::Bool(reshape_typed(x, shape)?),
        })
    }

    /// Merge axes `outer..=inner` into one.
    pub fn merge_axes(&self, outer: usize, inner: usize) -> Result<Self, ValueError> {
        let shape = self.shape();
        if outer > inner || inner >= shape.len() {
            return Err(ValueError::InvalidShape(format!(
                "cannot merge axes {}..={} of rank {}",
                outer,
                inner,
                shape.len()
            )));
        }
        let mut new_shape = shape[..outer].to_vec();
        new_shape.push(shape[outer..=inner].iter().product());
        new_shape.extend_from_slice(&shape[inner + 1..]);
        self.reshape(&new_shape)
    }

    pub fn concat(parts: &[DenseTensor], axis: usize) -> Result<Self, ValueError> {
        let first = parts
            .first()
            .ok_or_else(|| ValueError::Invalid("cannot concatenate zero tensors".to_string()))?;
        macro_rules! gather {
            ($variant:ident) => {{
                let mut arrays = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        DenseTensor::$variant(x) => arrays.push(x),
                        other => {
                            return Err(ValueError::TypeMismatch {
                                expected: "tensors of one dtype",
                                found: format!("{} and {}", first.dtype(), other.dtype()),
                            });
                        }
                    }
                }
                DenseTensor::$variant(concat_typed(&arrays, axis)?)
            }};
        }
        Ok(match first {
            DenseTensor::F64(_) => gather!(F64),
            DenseTensor::I64(_) => gather!(I64),
            DenseTensor::Bool(_) => gather!(Bool),
        })
    }

    /// Stack along a new outer axis. An empty list stacks to `f64[0]`.
    pub fn stack(parts: &[DenseTensor]) -> Result<Self, ValueError> {
        if parts.is_empty() {
            return Ok(DenseTensor::vector_f64(vec![]));
        }
        let expanded: Vec<_> = parts
            .iter()
            .map(|x| map_dense!(x, a => a.clone().insert_axis(Axis(0))))
            .collect();
        // Mixed int/float literals promote to float.
        if expanded.iter().any(|x| x.dtype() == DType::F64)
            && expanded.iter().all(|x| x.dtype() != DType::Bool)
        {
            let promoted: Vec<_> = expanded
                .iter()
                .map(|x| DenseTensor::F64(x.to_f64_array()))
                .collect();
            return Self::concat(&promoted, 0);
        }
        Self::concat(&expanded, 0)
    }

    /// Whether every element equals the scalar `pad`.
    pub fn all_equal(&self, pad: &DenseTensor) -> Result<bool, ValueError> {
        Ok(match (self, pad) {
            (DenseTensor::Bool(x), DenseTensor::Bool(p)) => {
                let p = p.first().copied().unwrap_or(false);
                x.iter().all(|v| *v == p)
            }
            (DenseTensor::I64(x), DenseTensor::I64(p)) => {
                let p = p.first().copied().unwrap_or(0);
                x.iter().all(|v| *v == p)
            }
            (DenseTensor::Bool(_), _) | (_, DenseTensor::Bool(_)) => {
                return Err(ValueError::TypeMismatch {
                    expected: "padding of the tensor dtype",
                    found: pad.dtype().to_string(),
                });
            }
            _ => {
                let p = pad.to_f64_array().first().copied().unwrap_or(0.0);
                self.to_f64_array().iter().all(|v| *v == p)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tensor {
    Dense(DenseTensor),
    Ragged(RaggedTensor),
    Sparse(SparseTensor),
}

impl Tensor {
    pub fn kind(&self) -> PlaceholderKind {
        match self {
            Tensor::Dense(_) => PlaceholderKind::Dense,
            Tensor::Ragged(x) => PlaceholderKind::ragged(x.ragged_rank()),
            Tensor::Sparse(_) => PlaceholderKind::Sparse,
        }
    }

    /// Size of the outermost dimension.
    pub fn nrows(&self) -> Result<usize, ValueError> {
        match self {
            Tensor::Dense(x) => x.dim0(),
            Tensor::Ragged(x) => Ok(x.nrows()),
            Tensor::Sparse(x) => x
                .dense_shape()
                .first()
                .map(|x| *x as usize)
                .ok_or_else(|| ValueError::InvalidShape("scalar has no outer dimension".to_string())),
        }
    }

    pub fn rank(&self) -> usize {
        match self {
            Tensor::Dense(x) => x.rank(),
            Tensor::Ragged(x) => x.rank(),
            Tensor::Sparse(x) => x.dense_shape().len(),
        }
    }

    pub fn as_dense(&self) -> Result<&DenseTensor, ValueError> {
        match self {
            Tensor::Dense(x) => Ok(x),
            _ => Err(ValueError::TypeMismatch {
                expected: "dense tensor",
                found: format!("{:?} tensor", self.kind().class()),
            }),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Tensor(self)
    }
}

impl From<DenseTensor> for Tensor {
    fn from(value: DenseTensor) -> Self {
        Tensor::Dense(value)
    }
}

impl From<RaggedTensor> for Tensor {
    fn from(value: RaggedTensor) -> Self {
        Tensor::Ragged(value)
    }
}

impl From<SparseTensor> for Tensor {
    fn from(value: SparseTensor) -> Self {
        Tensor::Sparse(value)
    }
}

/// Python slice semantics for a dimension of size `len`.
pub fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, ValueError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ValueError::Invalid("slice step cannot be zero".to_string()));
    }
    let n = len as i64;
    let mut out = Vec::new();
    if step > 0 {
        let clamp = |v: i64| if v < 0 { (v + n).max(0) } else { v.min(n) };
        let start = start.map(clamp).unwrap_or(0);
        let stop = stop.map(clamp).unwrap_or(n);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let clamp = |v: i64| if v < 0 { (v + n).max(-1) } else { v.min(n - 1) };
        let start = start.map(clamp).unwrap_or(n - 1);
        let stop = stop.map(clamp).unwrap_or(-1);
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    Ok(out)
}

/// Resolve a possibly negative index against a dimension of size `len`.
pub fn normalize_index(index: i64, len: usize) -> Result<usize, ValueError> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ValueError::IndexOutOfBounds { index, size: len });
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_indices_python_semantics() {
        assert_eq!(slice_indices(5, None, None, None).unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(slice_indices(5, Some(1), Some(-1), None).unwrap(), vec![1, 2, 3]);
        assert_eq!(slice_indices(5, None, None, Some(2)).unwrap(), vec![0, 2, 4]);
        assert_eq!(slice_indices(5, None, None, Some(-1)).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_indices(5, Some(10), None, None).unwrap(), Vec::<usize>::new());
        assert!(slice_indices(5, None, None, Some(0)).is_err());
    }

    #[test]
    fn test_stack_promotes_mixed_literals() {
        let parts = vec![DenseTensor::scalar_i64(1), DenseTensor::scalar_f64(2.5)];
        let stacked = DenseTensor::stack(&parts).unwrap();
        assert_eq!(stacked, DenseTensor::vector_f64(vec![1.0, 2.5]));
    }

    #[test]
    fn test_merge_axes() {
        let x = DenseTensor::from_vec_shape_i64((0..24).collect(), vec![2, 3, 4]).unwrap();
        assert_eq!(x.merge_axes(0, 1).unwrap().shape(), vec![6, 4]);
        assert_eq!(x.merge_axes(1, 2).unwrap().shape(), vec![2, 12]);
        assert!(x.merge_axes(2, 3).is_err());
    }
}
