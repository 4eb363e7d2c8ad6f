use crate::placeholder::PlaceholderKind;
use crate::symbols::{Operation, like_first_input};
use crate::tensor::{DenseTensor, RaggedTensor, Tensor, normalize_index, slice_indices};
use crate::value::{CallArgs, SliceSpec, Value, ValueError};

fn slice_bound(value: &Value) -> Result<Option<i64>, ValueError> {
    match value {
        Value::None => Ok(None),
        other => other.to_i64().map(Some),
    }
}

fn resolve_slice(slice: &SliceSpec, len: usize) -> Result<Vec<usize>, ValueError> {
    slice_indices(
        len,
        slice_bound(&slice.start)?,
        slice_bound(&slice.stop)?,
        slice_bound(&slice.step)?,
    )
}

/// Index keys of a subscript: a list is one key per axis.
fn subscript_keys(key: &Value) -> Vec<Value> {
    match key {
        Value::List(keys) => keys.clone(),
        other => vec![other.clone()],
    }
}

fn dense_getitem(tensor: &DenseTensor, keys: &[Value]) -> Result<DenseTensor, ValueError> {
    let mut out = tensor.clone();
    let mut axis = 0;
    for key in keys {
        let shape = out.shape();
        let len = *shape.get(axis).ok_or_else(|| {
            ValueError::InvalidShape(format!("too many indices for a tensor of rank {}", shape.len()))
        })?;
        match key {
            Value::Slice(slice) => {
                out = out.select_axis(axis, &resolve_slice(slice, len)?)?;
                axis += 1;
            }
            other => {
                let index = normalize_index(other.to_i64()?, len)?;
                let selected = out.select_axis(axis, &[index])?;
                let mut reduced = shape.clone();
                reduced.remove(axis);
                out = selected.reshape(&reduced)?;
            }
        }
    }
    Ok(out)
}

fn getitem_tensor(tensor: &Tensor, keys: &[Value]) -> Result<Tensor, ValueError> {
    match tensor {
        Tensor::Dense(x) => Ok(Tensor::Dense(dense_getitem(x, keys)?)),
        Tensor::Ragged(x) => ragged_getitem_keys(x, keys),
        Tensor::Sparse(_) => Err(ValueError::Unsupported(
            "indexing a sparse tensor".to_string(),
        )),
    }
}

fn ragged_getitem_keys(tensor: &RaggedTensor, keys: &[Value]) -> Result<Tensor, ValueError> {
    let Some((first, rest)) = keys.split_first() else {
        return Ok(Tensor::Ragged(tensor.clone()));
    };
    match first {
        Value::Slice(slice) => {
            let rows = tensor.gather_rows(&resolve_slice(slice, tensor.nrows())?)?;
            if rest.is_empty() {
                return Ok(Tensor::Ragged(rows));
            }
            let mut results = Vec::with_capacity(rows.nrows());
            for row in 0..rows.nrows() {
                results.push(getitem_tensor(&rows.row(row as i64)?, rest)?);
            }
            stack_rows(results)
        }
        other => getitem_tensor(&tensor.row(other.to_i64()?)?, rest),
    }
}

// Rows that are scalars stack densely, anything else becomes a ragged row.
fn stack_rows(rows: Vec<Tensor>) -> Result<Tensor, ValueError> {
    if rows.is_empty() {
        return Ok(Tensor::Dense(DenseTensor::vector_f64(vec![])));
    }
    if rows.iter().all(|r| r.rank() == 0) {
        let parts = rows
            .iter()
            .map(|r| r.as_dense().cloned())
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Tensor::Dense(DenseTensor::stack(&parts)?));
    }
    let lengths = rows
        .iter()
        .map(|r| r.nrows().map(|n| n as i64))
        .collect::<Result<Vec<_>, _>>()?;
    let values = concat_rows(&rows)?;
    Ok(Tensor::Ragged(RaggedTensor::from_row_lengths(values, &lengths)?))
}

/// Concatenate along the outermost axis.
fn concat_rows(parts: &[Tensor]) -> Result<Tensor, ValueError> {
    if let Some(dense) = parts
        .iter()
        .map(|p| match p {
            Tensor::Dense(x) => Some(x.clone()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
    {
        return Ok(Tensor::Dense(DenseTensor::concat(&dense, 0)?));
    }
    let mut lengths = Vec::new();
    let mut values = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Tensor::Ragged(x) => {
                lengths.extend(x.row_lengths());
                values.push(x.values().to_tensor());
            }
            _ => {
                return Err(ValueError::TypeMismatch {
                    expected: "tensors of one kind",
                    found: format!("{} tensor among ragged tensors", part.kind().class()),
                });
            }
        }
    }
    Ok(Tensor::Ragged(RaggedTensor::from_row_lengths(
        concat_rows(&values)?,
        &lengths,
    )?))
}

/// `tf.concat(values, axis)`
pub fn concat() -> Operation {
    Operation::new("concat", like_first_input, |args: &CallArgs| {
        let values = args.require(0, "values")?;
        let Value::List(items) = values else {
            return Err(ValueError::mismatch("list of tensors", values).into());
        };
        let parts = items
            .iter()
            .map(|x| x.to_tensor())
            .collect::<Result<Vec<_>, _>>()?;
        let axis = args.require(1, "axis")?.to_i64()?;
        let first = parts
            .first()
            .ok_or_else(|| ValueError::Invalid("cannot concatenate zero tensors".to_string()))?;
        let axis = normalize_index(axis, first.rank())?;
        if axis == 0 {
            return Ok(concat_rows(&parts)?.into());
        }
        let dense = parts
            .iter()
            .map(|p| p.as_dense().cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DenseTensor::concat(&dense, axis)?.into())
    })
}

// Ragged rank left after the integer keys among the ragged axes.
fn getitem_output(args: &CallArgs) -> PlaceholderKind {
    let kind = args
        .args
        .first()
        .and_then(|x| x.as_placeholder())
        .map(|p| p.kind())
        .unwrap_or(PlaceholderKind::Dense);
    let PlaceholderKind::Ragged { ragged_rank } = kind else {
        return kind;
    };
    let keys = args.get(1, "key").map(subscript_keys).unwrap_or_default();
    let dropped = keys
        .iter()
        .take(ragged_rank + 1)
        .filter(|k| !matches!(k, Value::Slice(_) | Value::Map(_)))
        .count();
    match ragged_rank.saturating_sub(dropped) {
        0 => PlaceholderKind::Dense,
        rank => PlaceholderKind::ragged(rank),
    }
}

/// `tensor[key]`
pub fn getitem() -> Operation {
    Operation::new("getitem", getitem_output, |args: &CallArgs| {
        let tensor = args.require(0, "tensor")?.to_tensor()?;
        let keys = subscript_keys(args.require(1, "key")?);
        Ok(getitem_tensor(&tensor, &keys)?.into())
    })
}

/// `ragged_tensor[key]`
pub fn ragged_getitem() -> Operation {
    Operation::new("ragged_getitem", getitem_output, |args: &CallArgs| {
        let tensor = args.require(0, "rt_input")?.to_tensor()?;
        let Tensor::Ragged(rt) = &tensor else {
            return Err(ValueError::TypeMismatch {
                expected: "ragged tensor",
                found: format!("{} tensor", tensor.kind().class()),
            }
            .into());
        };
        let keys = subscript_keys(args.require(1, "key")?);
        Ok(ragged_getitem_keys(rt, &keys)?.into())
    })
}

/// `tf.boolean_mask(tensor, mask, axis=None)` along the outermost axis.
pub fn boolean_mask() -> Operation {
    Operation::new("boolean_mask", like_first_input, |args: &CallArgs| {
        let tensor = args.require(0, "tensor")?.to_tensor()?;
        let mask = args.require(1, "mask")?.to_dense()?;
        if let Some(axis) = args.optional(2, "axis") {
            if axis.to_i64()? != 0 {
                return Err(ValueError::Unsupported(
                    "boolean_mask along an inner axis".to_string(),
                )
                .into());
            }
        }
        if mask.rank() != 1 {
            return Err(ValueError::InvalidShape(format!(
                "mask must be a vector, got rank {}",
                mask.rank()
            ))
            .into());
        }
        let mask = mask.to_bool_vec()?;
        let rows = tensor.nrows()?;
        if mask.len() != rows {
            return Err(ValueError::InvalidShape(format!(
                "mask of length {} for {} rows",
                mask.len(),
                rows
            ))
            .into());
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, m)| **m)
            .map(|(i, _)| i)
            .collect();
        let out = match &tensor {
            Tensor::Dense(x) => Tensor::Dense(x.select_axis(0, &keep)?),
            Tensor::Ragged(x) => Tensor::Ragged(x.gather_rows(&keep)?),
            Tensor::Sparse(_) => {
                return Err(ValueError::Unsupported("masking a sparse tensor".to_string()).into());
            }
        };
        Ok(out.into())
    })
}
