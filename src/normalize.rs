//! Conversion between slices and plain keyed maps.
//!
//! Generic traversal treats `Value::Map` as a container, so an encoded slice
//! whose bounds are placeholders exposes them to flattening, while a raw
//! `Value::Slice` would hide them.

use crate::value::{CallArgs, SliceSpec, Value};
use std::collections::BTreeMap;

const SLICE_KEYS: [&str; 3] = ["start", "stop", "step"];

/// `Slice` to `{start, stop, step}`; anything else unchanged.
pub fn encode(value: &Value) -> Value {
    match value {
        Value::Slice(slice) => {
            let mut map = BTreeMap::new();
            map.insert("start".to_string(), (*slice.start).clone());
            map.insert("stop".to_string(), (*slice.stop).clone());
            map.insert("step".to_string(), (*slice.step).clone());
            Value::Map(map)
        }
        other => other.clone(),
    }
}

/// Inverse of [`encode`]. Only maps whose key set is exactly
/// `{start, stop, step}` are converted.
pub fn decode(value: &Value) -> Value {
    match value {
        Value::Map(map)
            if map.len() == SLICE_KEYS.len() && SLICE_KEYS.iter().all(|k| map.contains_key(*k)) =>
        {
            let field = |key: &str| map.get(key).cloned().unwrap_or(Value::None);
            Value::Slice(SliceSpec::new(field("start"), field("stop"), field("step")))
        }
        other => other.clone(),
    }
}

fn apply_one_level(value: &Value, f: fn(&Value) -> Value) -> Value {
    match f(value) {
        Value::List(items) => Value::List(items.iter().map(f).collect()),
        other => other,
    }
}

fn apply_call_args(args: &CallArgs, f: fn(&Value) -> Value) -> CallArgs {
    CallArgs {
        args: args.args.iter().map(|x| apply_one_level(x, f)).collect(),
        kwargs: args
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), apply_one_level(v, f)))
            .collect(),
    }
}

/// Encode each argument, and each element of a list argument.
pub fn encode_call_args(args: &CallArgs) -> CallArgs {
    apply_call_args(args, encode)
}

pub fn decode_call_args(args: &CallArgs) -> CallArgs {
    apply_call_args(args, decode)
}
