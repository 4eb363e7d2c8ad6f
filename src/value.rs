use crate::placeholder::Placeholder;
use crate::tensor::{DenseTensor, Tensor};
use crate::variable::Variable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("Expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("Missing argument \"{0}\"")]
    MissingArgument(String),
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds { index: i64, size: usize },
    #[error("Invalid value: {0}")]
    Invalid(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ValueError {
    pub(crate) fn mismatch(expected: &'static str, found: &Value) -> Self {
        ValueError::TypeMismatch {
            expected,
            found: found.type_name().to_string(),
        }
    }
}

/// A `start:stop:step` slice. Bounds may themselves be
/// placeholders, which is why slices need normalizing before traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceSpec {
    pub start: Box<Value>,
    pub stop: Box<Value>,
    pub step: Box<Value>,
}

impl SliceSpec {
    pub fn new(start: impl Into<Value>, stop: impl Into<Value>, step: impl Into<Value>) -> Self {
        Self {
            start: Box::new(start.into()),
            stop: Box::new(stop.into()),
            step: Box::new(step.into()),
        }
    }

    /// `start:stop`
    pub fn range(start: impl Into<Value>, stop: impl Into<Value>) -> Self {
        Self::new(start, stop, Value::None)
    }

    /// `:`
    pub fn full() -> Self {
        Self::new(Value::None, Value::None, Value::None)
    }
}

/// Argument tree handed to operations and layers.
///
/// `List` and `Map` are the only containers generic traversal descends
/// into. Everything else, `Slice` included, is a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Slice(SliceSpec),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Tensor(Tensor),
    Placeholder(Placeholder),
    #[serde(skip)]
    Variable(Variable),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Slice(_) => "slice",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Tensor(Tensor::Dense(_)) => "dense tensor",
            Value::Tensor(Tensor::Ragged(_)) => "ragged tensor",
            Value::Tensor(Tensor::Sparse(_)) => "sparse tensor",
            Value::Placeholder(_) => "placeholder",
            Value::Variable(_) => "variable",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Placeholder(_))
    }

    pub fn as_placeholder(&self) -> Option<&Placeholder> {
        match self {
            Value::Placeholder(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer scalar, accepting 0-d integer tensors as well.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            Value::Tensor(Tensor::Dense(d)) => d.as_scalar_i64().ok(),
            _ => None,
        }
    }

    pub fn to_i64(&self) -> Result<i64, ValueError> {
        self.as_i64().ok_or_else(|| ValueError::mismatch("integer", self))
    }

    pub fn to_i64_vec(&self) -> Result<Vec<i64>, ValueError> {
        match self {
            Value::List(items) => items.iter().map(|x| x.to_i64()).collect(),
            Value::Tensor(Tensor::Dense(d)) => d.to_i64_vec(),
            _ => Err(ValueError::mismatch("integer vector", self)),
        }
    }

    /// Coerce to a runtime tensor. Python-style scalars and nested lists
    /// become dense tensors.
    pub fn to_tensor(&self) -> Result<Tensor, ValueError> {
        match self {
            Value::Tensor(t) => Ok(t.clone()),
            Value::Variable(v) => v.read().to_tensor(),
            _ => Ok(Tensor::Dense(self.to_dense()?)),
        }
    }

    pub fn to_dense(&self) -> Result<DenseTensor, ValueError> {
        match self {
            Value::Int(x) => Ok(DenseTensor::scalar_i64(*x)),
            Value::Float(x) => Ok(DenseTensor::scalar_f64(*x)),
            Value::Bool(x) => Ok(DenseTensor::scalar_bool(*x)),
            Value::Tensor(Tensor::Dense(d)) => Ok(d.clone()),
            Value::Variable(v) => v.read().to_dense(),
            Value::List(items) => {
                let parts = items
                    .iter()
                    .map(|x| x.to_dense())
                    .collect::<Result<Vec<_>, _>>()?;
                DenseTensor::stack(&parts)
            }
            _ => Err(ValueError::mismatch("dense tensor", self)),
        }
    }

    /// Leaves of the structure in traversal order. Map entries are visited
    /// in key order.
    pub fn flatten(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            Value::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            Value::Map(entries) => {
                for item in entries.values() {
                    item.flatten_into(out);
                }
            }
            leaf => out.push(leaf),
        }
    }

    /// Rebuild the structure with every leaf replaced by `f(leaf)`.
    pub fn map_structure<E, F>(&self, f: &mut F) -> Result<Value, E>
    where
        F: FnMut(&Value) -> Result<Value, E>,
    {
        match self {
            Value::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|x| x.map_structure(&mut *f))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Map(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    out.insert(k.clone(), v.map_structure(&mut *f)?);
                }
                Ok(Value::Map(out))
            }
            leaf => f(leaf),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<SliceSpec> for Value {
    fn from(value: SliceSpec) -> Self {
        Value::Slice(value)
    }
}

impl From<Tensor> for Value {
    fn from(value: Tensor) -> Self {
        Value::Tensor(value)
    }
}

impl From<DenseTensor> for Value {
    fn from(value: DenseTensor) -> Self {
        Value::Tensor(Tensor::Dense(value))
    }
}

impl From<Placeholder> for Value {
    fn from(value: Placeholder) -> Self {
        Value::Placeholder(value)
    }
}

impl From<&Placeholder> for Value {
    fn from(value: &Placeholder) -> Self {
        Value::Placeholder(value.clone())
    }
}

impl From<Variable> for Value {
    fn from(value: Variable) -> Self {
        Value::Variable(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Option<i64>> for Value {
    fn from(value: Option<i64>) -> Self {
        value.map(Value::Int).unwrap_or(Value::None)
    }
}

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Argument passed either by keyword `name` or at position `index`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.kwargs.get(name).or_else(|| self.args.get(index))
    }

    pub fn require(&self, index: usize, name: &str) -> Result<&Value, ValueError> {
        self.get(index, name)
            .ok_or_else(|| ValueError::MissingArgument(name.to_string()))
    }

    /// Like `get`, but an explicit `None` counts as absent.
    pub fn optional(&self, index: usize, name: &str) -> Option<&Value> {
        self.get(index, name).filter(|x| !x.is_none())
    }

    /// Leaves of `[args, kwargs]`.
    pub fn flatten(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        for arg in &self.args {
            arg.flatten_into(&mut out);
        }
        for value in self.kwargs.values() {
            value.flatten_into(&mut out);
        }
        out
    }

    pub fn contains_placeholder(&self) -> bool {
        self.flatten().iter().any(|x| x.is_placeholder())
    }

    pub fn placeholders(&self) -> Vec<&Placeholder> {
        self.flatten()
            .into_iter()
            .filter_map(|x| x.as_placeholder())
            .collect()
    }

    pub fn map_structure<E, F>(&self, f: &mut F) -> Result<CallArgs, E>
    where
        F: FnMut(&Value) -> Result<Value, E>,
    {
        let args = self
            .args
            .iter()
            .map(|x| x.map_structure(&mut *f))
            .collect::<Result<_, _>>()?;
        let mut kwargs = BTreeMap::new();
        for (k, v) in &self.kwargs {
            kwargs.insert(k.clone(), v.map_structure(&mut *f)?);
        }
        Ok(CallArgs { args, kwargs })
    }
}
