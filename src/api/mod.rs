//! The operation set exported under the `tf` namespace by default.

pub mod array_ops;
pub mod math;
pub mod ragged;

use crate::symbols::{ApiNamespace, OpClass, Operation, SymbolTable};
use std::sync::OnceLock;

/// Symbols of the slicing, indexing and masking operations.
pub const SLICING_SYMBOLS: [&str; 3] = [
    "__operators__.getitem",
    "boolean_mask",
    "__operators__.ragged_getitem",
];

pub const RAGGED_CLASS_METHODS: [&str; 11] = [
    "from_value_rowids",
    "from_row_splits",
    "from_row_lengths",
    "from_row_starts",
    "from_row_limits",
    "from_uniform_row_length",
    "from_nested_value_rowids",
    "from_nested_row_splits",
    "from_nested_row_lengths",
    "from_tensor",
    "from_sparse",
];

pub struct Api {
    pub add: Operation,
    pub multiply: Operation,
    pub reduce_sum: Operation,
    pub concat: Operation,
    pub getitem: Operation,
    pub boolean_mask: Operation,
    pub ragged_getitem: Operation,
    pub ragged_tensor: OpClass,
}

impl Api {
    fn new() -> Self {
        Self {
            add: math::add(),
            multiply: math::multiply(),
            reduce_sum: math::reduce_sum(),
            concat: array_ops::concat(),
            getitem: array_ops::getitem(),
            boolean_mask: array_ops::boolean_mask(),
            ragged_getitem: array_ops::ragged_getitem(),
            ragged_tensor: ragged::ragged_tensor_class(),
        }
    }
}

static API: OnceLock<Api> = OnceLock::new();

/// Process-wide operation handles. Identity of these handles is what the
/// symbol table and the dispatch registry key on.
pub fn api() -> &'static Api {
    API.get_or_init(Api::new)
}

/// Symbol table exporting every default operation.
pub fn default_symbols() -> SymbolTable {
    let api = api();
    let mut table = SymbolTable::new();
    table.export(ApiNamespace::Tf, "math.add", api.add.clone());
    table.export(ApiNamespace::Tf, "math.multiply", api.multiply.clone());
    table.export(ApiNamespace::Tf, "math.reduce_sum", api.reduce_sum.clone());
    table.export(ApiNamespace::Tf, "concat", api.concat.clone());
    table.export(ApiNamespace::Tf, "__operators__.getitem", api.getitem.clone());
    table.export(ApiNamespace::Tf, "boolean_mask", api.boolean_mask.clone());
    table.export(
        ApiNamespace::Tf,
        "compat.v1.boolean_mask",
        api.boolean_mask.clone(),
    );
    table.export(
        ApiNamespace::Tf,
        "__operators__.ragged_getitem",
        api.ragged_getitem.clone(),
    );
    table.export(ApiNamespace::Tf, "RaggedTensor", api.ragged_tensor.clone());
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTarget;

    #[test]
    fn test_default_symbols_resolve_both_ways() {
        let table = default_symbols();
        for symbol in SLICING_SYMBOLS {
            let op = table.lookup_operation(symbol).unwrap();
            assert_eq!(
                table.canonical_name(&SymbolTarget::from(op)).as_deref(),
                Some(symbol)
            );
        }
        assert_eq!(
            table.lookup_operation("compat.v1.boolean_mask"),
            Some(api().boolean_mask.clone())
        );
        let class = table.lookup_class("RaggedTensor").unwrap();
        for method in RAGGED_CLASS_METHODS {
            assert!(class.method(method).is_some(), "missing {}", method);
        }
    }
}
