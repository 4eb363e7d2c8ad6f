use crate::tensor::DenseTensor;
use crate::value::ValueError;
use serde::{Deserialize, Serialize};

/// Coordinate-format sparse tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseTensor {
    indices: Vec<Vec<i64>>,
    values: DenseTensor,
    dense_shape: Vec<i64>,
}

impl SparseTensor {
    pub fn new(
        indices: Vec<Vec<i64>>,
        values: DenseTensor,
        dense_shape: Vec<i64>,
    ) -> Result<Self, ValueError> {
        if values.rank() != 1 {
            return Err(ValueError::InvalidShape(format!(
                "sparse values must be a vector, got rank {}",
                values.rank()
            )));
        }
        if values.dim0()? != indices.len() {
            return Err(ValueError::InvalidShape(format!(
                "{} indices for {} values",
                indices.len(),
                values.dim0()?
            )));
        }
        for index in &indices {
            if index.len() != dense_shape.len() {
                return Err(ValueError::InvalidShape(format!(
                    "index {:?} does not match rank {}",
                    index,
                    dense_shape.len()
                )));
            }
            if index
                .iter()
                .zip(&dense_shape)
                .any(|(i, d)| *i < 0 || i >= d)
            {
                return Err(ValueError::Invalid(format!(
                    "index {:?} is outside dense shape {:?}",
                    index, dense_shape
                )));
            }
        }
        Ok(Self {
            indices,
            values,
            dense_shape,
        })
    }

    pub fn indices(&self) -> &[Vec<i64>] {
        &self.indices
    }

    /// Indices as an `i64[nnz, rank]` tensor.
    pub fn indices_tensor(&self) -> Result<DenseTensor, ValueError> {
        let data = self.indices.iter().flatten().copied().collect();
        DenseTensor::from_vec_shape_i64(data, vec![self.indices.len(), self.dense_shape.len()])
    }

    pub fn values(&self) -> &DenseTensor {
        &self.values
    }

    pub fn dense_shape(&self) -> &[i64] {
        &self.dense_shape
    }

    pub fn with_values(&self, values: DenseTensor) -> Result<Self, ValueError> {
        Self::new(self.indices.clone(), values, self.dense_shape.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_index() {
        let err = SparseTensor::new(vec![vec![0, 3]], DenseTensor::vector_f64(vec![1.0]), vec![2, 3]);
        assert!(err.is_err());
    }

    #[test]
    fn test_with_values_keeps_layout() {
        let st = SparseTensor::new(
            vec![vec![0, 0], vec![1, 2]],
            DenseTensor::vector_f64(vec![1.0, 2.0]),
            vec![2, 3],
        )
        .unwrap();
        let doubled = st.with_values(DenseTensor::vector_f64(vec![2.0, 4.0])).unwrap();
        assert_eq!(doubled.indices(), st.indices());
        assert_eq!(doubled.dense_shape(), &[2, 3]);
        assert!(st.with_values(DenseTensor::vector_f64(vec![1.0])).is_err());
        assert_eq!(st.indices_tensor().unwrap().shape(), vec![2, 2]);
    }
}
