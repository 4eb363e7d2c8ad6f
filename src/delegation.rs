//! Which members of each placeholder class resolve through graph nodes.
//!
//! Accessing a delegated property records an `InstanceProperty` node, and
//! calling a delegated method records an `InstanceMethod` node. Anything
//! not listed here is unavailable on placeholders.

use crate::placeholder::PlaceholderClass;
use std::collections::HashMap;

pub const RAGGED_PROPERTIES: [&str; 4] = ["values", "flat_values", "row_splits", "nested_row_splits"];

pub const RAGGED_METHODS: [&str; 14] = [
    "value_rowids",
    "nested_value_rowids",
    "nrows",
    "row_starts",
    "row_limits",
    "row_lengths",
    "nested_row_lengths",
    "bounding_shape",
    "with_values",
    "with_flat_values",
    "with_row_splits_dtype",
    "merge_dims",
    "to_tensor",
    "to_sparse",
];

pub const SPARSE_PROPERTIES: [&str; 2] = ["indices", "values"];

pub const SPARSE_METHODS: [&str; 1] = ["with_values"];

/// Members that may be statically known to be absent on a concrete value.
/// A placeholder would always answer with another placeholder, which breaks
/// callers that branch on absence, so these are never delegated.
pub const NON_DELEGATED: [&str; 1] = ["uniform_row_length"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Property,
    Method,
}

#[derive(Debug, Default)]
pub struct DelegationTable {
    members: HashMap<(PlaceholderClass, String), MemberKind>,
}

impl DelegationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `member` was already delegated on `class` or is
    /// never delegated.
    pub fn insert(&mut self, class: PlaceholderClass, member: &str, kind: MemberKind) -> bool {
        if NON_DELEGATED.contains(&member) {
            return false;
        }
        let key = (class, member.to_string());
        if self.members.contains_key(&key) {
            return false;
        }
        self.members.insert(key, kind);
        true
    }

    pub fn lookup(&self, class: PlaceholderClass, member: &str) -> Option<MemberKind> {
        self.members.get(&(class, member.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Install the fixed member lists. Returns how many entries were new.
pub fn install_delegations(table: &mut DelegationTable) -> usize {
    let lists: [(PlaceholderClass, &[&str], MemberKind); 4] = [
        (PlaceholderClass::Ragged, &RAGGED_PROPERTIES[..], MemberKind::Property),
        (PlaceholderClass::Ragged, &RAGGED_METHODS[..], MemberKind::Method),
        (PlaceholderClass::Sparse, &SPARSE_PROPERTIES[..], MemberKind::Property),
        (PlaceholderClass::Sparse, &SPARSE_METHODS[..], MemberKind::Method),
    ];
    let mut installed = 0;
    for (class, members, kind) in lists {
        for member in members {
            if table.insert(class, member, kind) {
                installed += 1;
            }
        }
    }
    log::debug!("Installed {} delegated members", installed);
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent() {
        let mut table = DelegationTable::new();
        let first = install_delegations(&mut table);
        assert_eq!(first, 4 + 14 + 2 + 1);
        assert_eq!(install_delegations(&mut table), 0);
        assert_eq!(table.len(), first);
    }

    #[test]
    fn test_lookup_by_class() {
        let mut table = DelegationTable::new();
        install_delegations(&mut table);
        assert_eq!(
            table.lookup(PlaceholderClass::Ragged, "with_values"),
            Some(MemberKind::Method)
        );
        assert_eq!(
            table.lookup(PlaceholderClass::Sparse, "values"),
            Some(MemberKind::Property)
        );
        assert_eq!(table.lookup(PlaceholderClass::Sparse, "row_splits"), None);
        assert_eq!(table.lookup(PlaceholderClass::Dense, "values"), None);
    }

    #[test]
    fn test_denylist_is_never_delegated() {
        let mut table = DelegationTable::new();
        install_delegations(&mut table);
        assert!(!table.insert(
            PlaceholderClass::Ragged,
            "uniform_row_length",
            MemberKind::Property
        ));
        assert_eq!(table.lookup(PlaceholderClass::Ragged, "uniform_row_length"), None);
    }
}
