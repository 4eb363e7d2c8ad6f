pub mod api;
pub mod delegation;
pub mod dispatch;
pub mod graph;
pub mod layers;
pub mod naming;
pub mod normalize;
pub mod placeholder;
pub mod safety;
pub mod symbols;
pub mod tensor;
pub mod value;
pub mod variable;

pub use dispatch::{DispatchRegistry, default_registry};
pub use graph::{FunctionalGraph, GraphBuilder, GraphError};
pub use layers::{AnyLayer, Layer, LayerError};
pub use placeholder::{Placeholder, PlaceholderKind};
pub use value::{CallArgs, SliceSpec, Value, ValueError};
