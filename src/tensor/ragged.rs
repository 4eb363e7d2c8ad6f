use crate::tensor::{DenseTensor, SparseTensor, Tensor, normalize_index};
use crate::value::ValueError;
use ndarray::{ArrayD, Dimension, IxDyn};
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum SplitsDType {
    Int32,
    Int64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RaggedValues {
    Dense(DenseTensor),
    Ragged(RaggedTensor),
}

impl RaggedValues {
    fn nrows(&self) -> Result<usize, ValueError> {
        match self {
            RaggedValues::Dense(x) => x.dim0(),
            RaggedValues::Ragged(x) => Ok(x.nrows()),
        }
    }

    pub fn to_tensor(&self) -> Tensor {
        match self {
            RaggedValues::Dense(x) => Tensor::Dense(x.clone()),
            RaggedValues::Ragged(x) => Tensor::Ragged(x.clone()),
        }
    }
}

impl TryFrom<Tensor> for RaggedValues {
    type Error = ValueError;

    fn try_from(value: Tensor) -> Result<Self, Self::Error> {
        match value {
            Tensor::Dense(x) => Ok(RaggedValues::Dense(x)),
            Tensor::Ragged(x) => Ok(RaggedValues::Ragged(x)),
            Tensor::Sparse(_) => Err(ValueError::Unsupported(
                "ragged values must be dense or ragged".to_string(),
            )),
        }
    }
}

fn invalid(msg: impl Into<String>) -> ValueError {
    ValueError::Invalid(msg.into())
}

/// A tensor whose outer dimension partitions `values` into rows of
/// varying length. `row_splits[i]..row_splits[i + 1]` is row `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaggedTensor {
    values: Box<RaggedValues>,
    row_splits: Vec<i64>,
    splits_dtype: SplitsDType,
}

impl RaggedTensor {
    pub fn from_row_splits(values: Tensor, row_splits: Vec<i64>) -> Result<Self, ValueError> {
        let values = RaggedValues::try_from(values)?;
        let nvals = values.nrows()? as i64;
        let Some(last) = row_splits.last().copied() else {
            return Err(invalid("row_splits must not be empty"));
        };
        if row_splits[0] != 0 {
            return Err(invalid("row_splits must start with 0"));
        }
        if row_splits.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid("row_splits must be sorted in ascending order"));
        }
        if last != nvals {
            return Err(invalid(format!(
                "row_splits must end with the number of values ({}), got {}",
                nvals, last
            )));
        }
        Ok(Self {
            values: Box::new(values),
            row_splits,
            splits_dtype: SplitsDType::Int64,
        })
    }

    pub fn from_row_lengths(values: Tensor, row_lengths: &[i64]) -> Result<Self, ValueError> {
        if row_lengths.iter().any(|x| *x < 0) {
            return Err(invalid("row_lengths must be non-negative"));
        }
        let mut splits = Vec::with_capacity(row_lengths.len() + 1);
        splits.push(0);
        for len in row_lengths {
            splits.push(splits[splits.len() - 1] + len);
        }
        Self::from_row_splits(values, splits)
    }

    pub fn from_value_rowids(
        values: Tensor,
        value_rowids: &[i64],
        nrows: Option<i64>,
    ) -> Result<Self, ValueError> {
        let nvals = values.nrows()?;
        if value_rowids.len() != nvals {
            return Err(invalid(format!(
                "expected {} value_rowids, got {}",
                nvals,
                value_rowids.len()
            )));
        }
        if value_rowids.iter().any(|x| *x < 0) {
            return Err(invalid("value_rowids must be non-negative"));
        }
        if value_rowids.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid("value_rowids must be sorted in ascending order"));
        }
        let min_rows = match value_rowids.last() {
            Some(x) => x
                .checked_add(1)
                .ok_or_else(|| invalid(format!("row id {} is out of range", x)))?,
            None => 0,
        };
        let nrows = nrows.unwrap_or(min_rows);
        if nrows < min_rows {
            return Err(invalid(format!(
                "nrows ({}) is smaller than the largest row id plus one ({})",
                nrows, min_rows
            )));
        }
        let nrows = usize::try_from(nrows)
            .map_err(|_| invalid(format!("nrows ({}) does not fit in usize", nrows)))?;
        let mut lengths: Vec<i64> = Vec::new();
        lengths
            .try_reserve_exact(nrows)
            .map_err(|e| invalid(format!("cannot allocate {} rows: {}", nrows, e)))?;
        lengths.resize(nrows, 0);
        for row in value_rowids {
            lengths[*row as usize] += 1;
        }
        Self::from_row_lengths(values, &lengths)
    }

    pub fn from_row_starts(values: Tensor, row_starts: &[i64]) -> Result<Self, ValueError> {
        let mut splits = row_starts.to_vec();
        splits.push(values.nrows()? as i64);
        Self::from_row_splits(values, splits)
    }

    pub fn from_row_limits(values: Tensor, row_limits: &[i64]) -> Result<Self, ValueError> {
        let mut splits = vec![0];
        splits.extend_from_slice(row_limits);
        Self::from_row_splits(values, splits)
    }

    pub fn from_uniform_row_length(
        values: Tensor,
        uniform_row_length: i64,
        nrows: Option<i64>,
    ) -> Result<Self, ValueError> {
        if uniform_row_length < 0 {
            return Err(invalid("uniform_row_length must be non-negative"));
        }
        let nvals = values.nrows()? as i64;
        let nrows = match nrows {
            Some(n) => n,
            None if uniform_row_length == 0 => 0,
            None => nvals / uniform_row_length,
        };
        if nrows < 0 || nrows * uniform_row_length != nvals {
            return Err(invalid(format!(
                "{} values cannot be split into {} rows of length {}",
                nvals, nrows, uniform_row_length
            )));
        }
        let splits = (0..=nrows).map(|i| i * uniform_row_length).collect();
        Self::from_row_splits(values, splits)
    }

    pub fn from_nested_row_splits(
        flat_values: Tensor,
        nested_row_splits: &[Vec<i64>],
    ) -> Result<Self, ValueError> {
        Self::nest(flat_values, nested_row_splits, |values, splits| {
            Self::from_row_splits(values, splits.clone())
        })
    }

    pub fn from_nested_row_lengths(
        flat_values: Tensor,
        nested_row_lengths: &[Vec<i64>],
    ) -> Result<Self, ValueError> {
        Self::nest(flat_values, nested_row_lengths, |values, lengths| {
            Self::from_row_lengths(values, lengths)
        })
    }

    pub fn from_nested_value_rowids(
        flat_values: Tensor,
        nested_value_rowids: &[Vec<i64>],
        nested_nrows: Option<&[i64]>,
    ) -> Result<Self, ValueError> {
        if let Some(nrows) = nested_nrows {
            if nrows.len() != nested_value_rowids.len() {
                return Err(invalid(
                    "nested_nrows must have one entry per value_rowids tensor",
                ));
            }
        }
        let mut result = flat_values;
        for (level, rowids) in nested_value_rowids.iter().enumerate().rev() {
            let nrows = nested_nrows.map(|x| x[level]);
            result = Tensor::Ragged(Self::from_value_rowids(result, rowids, nrows)?);
        }
        match result {
            Tensor::Ragged(x) => Ok(x),
            _ => Err(invalid("at least one partition tensor is required")),
        }
    }

    // Applies `partition` from the innermost level outwards.
    fn nest(
        flat_values: Tensor,
        partitions: &[Vec<i64>],
        partition: impl Fn(Tensor, &Vec<i64>) -> Result<Self, ValueError>,
    ) -> Result<Self, ValueError> {
        let mut result = flat_values;
        for level in partitions.iter().rev() {
            result = Tensor::Ragged(partition(result, level)?);
        }
        match result {
            Tensor::Ragged(x) => Ok(x),
            _ => Err(invalid("at least one partition tensor is required")),
        }
    }

    /// Ragged tensor from the rows of a dense tensor of rank >= 2. Rows
    /// are trimmed to `lengths`, or have trailing `padding` removed.
    pub fn from_tensor(
        tensor: &DenseTensor,
        lengths: Option<&[i64]>,
        padding: Option<&DenseTensor>,
    ) -> Result<Self, ValueError> {
        let shape = tensor.shape();
        if shape.len() < 2 {
            return Err(invalid("from_tensor requires a tensor of rank >= 2"));
        }
        let (rows, cols) = (shape[0], shape[1]);
        let merged = tensor.merge_axes(0, 1)?;
        let row_lengths: Vec<usize> = match (lengths, padding) {
            (Some(_), Some(_)) => {
                return Err(invalid("specify lengths or padding, but not both"));
            }
            (Some(lengths), None) => {
                if lengths.len() != rows {
                    return Err(invalid(format!(
                        "expected {} lengths, got {}",
                        rows,
                        lengths.len()
                    )));
                }
                if let Some(bad) = lengths.iter().find(|x| **x < 0 || **x as usize > cols) {
                    return Err(invalid(format!(
                        "row length {} is outside 0..={}",
                        bad, cols
                    )));
                }
                lengths.iter().map(|x| *x as usize).collect()
            }
            (None, Some(pad)) => {
                let mut out = Vec::with_capacity(rows);
                for row in 0..rows {
                    let mut len = cols;
                    while len > 0 && merged.index_axis0(row * cols + len - 1)?.all_equal(pad)? {
                        len -= 1;
                    }
                    out.push(len);
                }
                out
            }
            (None, None) => vec![cols; rows],
        };
        let keep: Vec<usize> = row_lengths
            .iter()
            .enumerate()
            .flat_map(|(row, len)| (0..*len).map(move |col| row * cols + col))
            .collect();
        let values = merged.select_axis(0, &keep)?;
        let row_lengths: Vec<i64> = row_lengths.into_iter().map(|x| x as i64).collect();
        Self::from_row_lengths(Tensor::Dense(values), &row_lengths)
    }

    /// Rank 2 sparse tensor whose rows are left aligned.
    pub fn from_sparse(sparse: &SparseTensor) -> Result<Self, ValueError> {
        if sparse.dense_shape().len() != 2 {
            return Err(ValueError::Unsupported(
                "from_sparse requires a sparse tensor of rank 2".to_string(),
            ));
        }
        let nrows = sparse.dense_shape()[0];
        let mut rowids = Vec::with_capacity(sparse.indices().len());
        let mut previous_row = -1;
        let mut expected_col = 0;
        for index in sparse.indices() {
            let (row, col) = (index[0], index[1]);
            if row < previous_row {
                return Err(invalid("sparse indices must be in row-major order"));
            }
            if row != previous_row {
                previous_row = row;
                expected_col = 0;
            }
            if col != expected_col {
                return Err(invalid(format!(
                    "row {} is not left aligned: expected column {}, got {}",
                    row, expected_col, col
                )));
            }
            expected_col += 1;
            rowids.push(row);
        }
        Self::from_value_rowids(
            Tensor::Dense(sparse.values().clone()),
            &rowids,
            Some(nrows),
        )
    }

    pub fn values(&self) -> &RaggedValues {
        &self.values
    }

    pub fn row_splits(&self) -> &[i64] {
        &self.row_splits
    }

    pub fn splits_dtype(&self) -> SplitsDType {
        self.splits_dtype
    }

    pub fn ragged_rank(&self) -> usize {
        match &*self.values {
            RaggedValues::Dense(_) => 1,
            RaggedValues::Ragged(x) => 1 + x.ragged_rank(),
        }
    }

    pub fn rank(&self) -> usize {
        match &*self.values {
            RaggedValues::Dense(x) => 1 + x.rank(),
            RaggedValues::Ragged(x) => 1 + x.rank(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.row_splits.len() - 1
    }

    pub fn flat_values(&self) -> &DenseTensor {
        match &*self.values {
            RaggedValues::Dense(x) => x,
            RaggedValues::Ragged(x) => x.flat_values(),
        }
    }

    pub fn nested_row_splits(&self) -> Vec<Vec<i64>> {
        let mut out = vec![self.row_splits.clone()];
        if let RaggedValues::Ragged(inner) = &*self.values {
            out.extend(inner.nested_row_splits());
        }
        out
    }

    pub fn row_starts(&self) -> Vec<i64> {
        self.row_splits[..self.nrows()].to_vec()
    }

    pub fn row_limits(&self) -> Vec<i64> {
        self.row_splits[1..].to_vec()
    }

    pub fn row_lengths(&self) -> Vec<i64> {
        self.row_splits.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn nested_row_lengths(&self) -> Vec<Vec<i64>> {
        self.nested_row_splits()
            .iter()
            .map(|splits| splits.windows(2).map(|w| w[1] - w[0]).collect())
            .collect()
    }

    pub fn value_rowids(&self) -> Vec<i64> {
        self.row_lengths()
            .iter()
            .enumerate()
            .flat_map(|(row, len)| std::iter::repeat_n(row as i64, *len as usize))
            .collect()
    }

    pub fn nested_value_rowids(&self) -> Vec<Vec<i64>> {
        let mut out = vec![self.value_rowids()];
        if let RaggedValues::Ragged(inner) = &*self.values {
            out.extend(inner.nested_value_rowids());
        }
        out
    }

    /// Smallest dense shape containing every row.
    pub fn bounding_shape(&self) -> Vec<i64> {
        let longest = self.row_lengths().into_iter().max().unwrap_or(0);
        let mut out = vec![self.nrows() as i64, longest];
        match &*self.values {
            RaggedValues::Dense(x) => out.extend(x.shape()[1..].iter().map(|d| *d as i64)),
            RaggedValues::Ragged(x) => out.extend_from_slice(&x.bounding_shape()[1..]),
        }
        out
    }

    pub fn with_values(&self, values: Tensor) -> Result<Self, ValueError> {
        let expected = self.values.nrows()?;
        let found = values.nrows()?;
        if expected != found {
            return Err(invalid(format!(
                "new values must have {} rows, got {}",
                expected, found
            )));
        }
        let mut out = Self::from_row_splits(values, self.row_splits.clone())?;
        out.splits_dtype = self.splits_dtype;
        Ok(out)
    }

    pub fn with_flat_values(&self, flat_values: DenseTensor) -> Result<Self, ValueError> {
        let values = match &*self.values {
            RaggedValues::Dense(_) => Tensor::Dense(flat_values),
            RaggedValues::Ragged(inner) => Tensor::Ragged(inner.with_flat_values(flat_values)?),
        };
        self.with_values(values)
    }

    pub fn with_row_splits_dtype(&self, dtype: SplitsDType) -> Result<Self, ValueError> {
        if dtype == SplitsDType::Int32
            && self.row_splits.last().copied().unwrap_or(0) > i32::MAX as i64
        {
            return Err(invalid("row_splits do not fit in int32"));
        }
        let values = match &*self.values {
            RaggedValues::Dense(x) => RaggedValues::Dense(x.clone()),
            RaggedValues::Ragged(x) => RaggedValues::Ragged(x.with_row_splits_dtype(dtype)?),
        };
        Ok(Self {
            values: Box::new(values),
            row_splits: self.row_splits.clone(),
            splits_dtype: dtype,
        })
    }

    /// Merge axes `outer_axis..=inner_axis` into a single axis.
    pub fn merge_dims(&self, outer_axis: i64, inner_axis: i64) -> Result<Tensor, ValueError> {
        let rank = self.rank();
        let outer = normalize_index(outer_axis, rank)?;
        let inner = normalize_index(inner_axis, rank)?;
        if outer > inner {
            return Err(invalid(format!(
                "outer_axis ({}) must not be greater than inner_axis ({})",
                outer_axis, inner_axis
            )));
        }
        merge_tensor_dims(Tensor::Ragged(self.clone()), outer, inner)
    }

    /// Row `index` as a tensor of rank one lower.
    pub fn row(&self, index: i64) -> Result<Tensor, ValueError> {
        let row = normalize_index(index, self.nrows())?;
        let (start, end) = (self.row_splits[row] as usize, self.row_splits[row + 1] as usize);
        let range: Vec<usize> = (start..end).collect();
        Ok(match &*self.values {
            RaggedValues::Dense(x) => Tensor::Dense(x.select_axis(0, &range)?),
            RaggedValues::Ragged(x) => Tensor::Ragged(x.gather_rows(&range)?),
        })
    }

    pub fn gather_rows(&self, rows: &[usize]) -> Result<Self, ValueError> {
        let nrows = self.nrows();
        let mut lengths = Vec::with_capacity(rows.len());
        let mut value_rows = Vec::new();
        for row in rows {
            if *row >= nrows {
                return Err(ValueError::IndexOutOfBounds {
                    index: *row as i64,
                    size: nrows,
                });
            }
            let (start, end) = (self.row_splits[*row], self.row_splits[row + 1]);
            lengths.push(end - start);
            value_rows.extend((start as usize)..(end as usize));
        }
        let values = match &*self.values {
            RaggedValues::Dense(x) => Tensor::Dense(x.select_axis(0, &value_rows)?),
            RaggedValues::Ragged(x) => Tensor::Ragged(x.gather_rows(&value_rows)?),
        };
        let mut out = Self::from_row_lengths(values, &lengths)?;
        out.splits_dtype = self.splits_dtype;
        Ok(out)
    }

    /// Dense tensor of `bounding_shape`, missing entries set to `default`.
    pub fn to_tensor(&self, default: Option<&DenseTensor>) -> Result<DenseTensor, ValueError> {
        let flat = self.flat_values();
        let positions = self.flat_positions();
        let ragged_dims: Vec<usize> = self.bounding_shape()[..=self.ragged_rank()]
            .iter()
            .map(|x| *x as usize)
            .collect();
        let inner_shape = flat.shape()[1..].to_vec();
        let mut out_shape = ragged_dims.clone();
        out_shape.extend_from_slice(&inner_shape);
        let layout = ScatterLayout {
            positions: &positions,
            dims: &ragged_dims,
            inner_size: inner_shape.iter().product(),
            out_shape: &out_shape,
        };
        Ok(match flat {
            DenseTensor::F64(x) => {
                let fill = default
                    .map(|d| d.to_f64_array().first().copied().unwrap_or(0.0))
                    .unwrap_or(0.0);
                DenseTensor::F64(layout.scatter(x, fill)?)
            }
            DenseTensor::I64(x) => {
                let fill = match default {
                    Some(d) => d.as_scalar_i64()?,
                    None => 0,
                };
                DenseTensor::I64(layout.scatter(x, fill)?)
            }
            DenseTensor::Bool(x) => {
                let fill = match default {
                    Some(d) => d.to_bool_vec()?.first().copied().unwrap_or(false),
                    None => false,
                };
                DenseTensor::Bool(layout.scatter(x, fill)?)
            }
        })
    }

    pub fn to_sparse(&self) -> Result<SparseTensor, ValueError> {
        let flat = self.flat_values();
        let inner_shape = flat.shape()[1..].to_vec();
        let mut indices = Vec::new();
        for position in self.flat_positions() {
            let prefix: Vec<i64> = position.iter().map(|x| *x as i64).collect();
            if inner_shape.is_empty() {
                indices.push(prefix);
                continue;
            }
            for inner in ndarray::indices(IxDyn(&inner_shape)) {
                let mut full = prefix.clone();
                full.extend(inner.slice().iter().map(|x| *x as i64));
                indices.push(full);
            }
        }
        let count = indices.len();
        let values = flat.reshape(&[count])?;
        SparseTensor::new(indices, values, self.bounding_shape())
    }

    // Index of each row of `values` within the ragged dimensions: [row, column].
    fn row_positions(&self) -> Vec<Vec<usize>> {
        self.row_lengths()
            .iter()
            .enumerate()
            .flat_map(|(row, len)| (0..*len as usize).map(move |col| vec![row, col]))
            .collect()
    }

    // Index of each row of `flat_values` within all ragged dimensions.
    fn flat_positions(&self) -> Vec<Vec<usize>> {
        let outer = self.row_positions();
        match &*self.values {
            RaggedValues::Dense(_) => outer,
            RaggedValues::Ragged(inner) => inner
                .flat_positions()
                .into_iter()
                .map(|position| {
                    let mut full = outer[position[0]].clone();
                    full.extend_from_slice(&position[1..]);
                    full
                })
                .collect(),
        }
    }
}

struct ScatterLayout<'a> {
    positions: &'a [Vec<usize>],
    dims: &'a [usize],
    inner_size: usize,
    out_shape: &'a [usize],
}

impl ScatterLayout<'_> {
    fn scatter<A: Clone>(&self, flat: &ArrayD<A>, fill: A) -> Result<ArrayD<A>, ValueError> {
        let total = self.dims.iter().product::<usize>() * self.inner_size;
        let mut data = vec![fill; total];
        let source: Vec<A> = flat.iter().cloned().collect();
        for (row, position) in self.positions.iter().enumerate() {
            let offset = position
                .iter()
                .zip(self.dims)
                .fold(0, |acc, (p, d)| acc * d + p);
            let src = &source[row * self.inner_size..(row + 1) * self.inner_size];
            data[offset * self.inner_size..(offset + 1) * self.inner_size].clone_from_slice(src);
        }
        ArrayD::from_shape_vec(IxDyn(self.out_shape), data)
            .map_err(|e| ValueError::InvalidShape(e.to_string()))
    }
}

fn merge_tensor_dims(tensor: Tensor, outer: usize, inner: usize) -> Result<Tensor, ValueError> {
    if outer == inner {
        return Ok(tensor);
    }
    match tensor {
        Tensor::Dense(x) => Ok(Tensor::Dense(x.merge_axes(outer, inner)?)),
        Tensor::Ragged(x) if outer == 0 => {
            // Concatenating the rows merges the two outermost axes.
            merge_tensor_dims(x.values.to_tensor(), 0, inner - 1)
        }
        Tensor::Ragged(x) => {
            let values = x.values.to_tensor();
            let splits = if outer == 1 {
                map_boundaries(&values, inner - 1, &x.row_splits)?
            } else {
                x.row_splits.clone()
            };
            let merged = merge_tensor_dims(values, outer - 1, inner - 1)?;
            let mut out = RaggedTensor::from_row_splits(merged, splits)?;
            out.splits_dtype = x.splits_dtype;
            Ok(Tensor::Ragged(out))
        }
        Tensor::Sparse(_) => Err(ValueError::Unsupported(
            "merge_dims on sparse tensors".to_string(),
        )),
    }
}

// Where row boundaries of `tensor` land after merging its outer `steps + 1` axes.
fn map_boundaries(tensor: &Tensor, steps: usize, boundaries: &[i64]) -> Result<Vec<i64>, ValueError> {
    let mut current = tensor.clone();
    let mut bounds = boundaries.to_vec();
    for _ in 0..steps {
        current = match current {
            Tensor::Ragged(x) => {
                bounds = bounds
                    .iter()
                    .map(|b| {
                        x.row_splits
                            .get(*b as usize)
                            .copied()
                            .ok_or_else(|| invalid(format!("row boundary {} out of range", b)))
                    })
                    .collect::<Result<_, _>>()?;
                x.values.to_tensor()
            }
            Tensor::Dense(x) => {
                let width = *x
                    .shape()
                    .get(1)
                    .ok_or_else(|| invalid("not enough dimensions to merge"))?
                    as i64;
                bounds = bounds.iter().map(|b| b * width).collect();
                Tensor::Dense(x.merge_axes(0, 1)?)
            }
            Tensor::Sparse(_) => {
                return Err(ValueError::Unsupported(
                    "merge_dims on sparse tensors".to_string(),
                ));
            }
        };
    }
    Ok(bounds)
}
