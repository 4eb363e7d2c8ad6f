use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

/// The placeholder subtypes members can be delegated on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum PlaceholderClass {
    Dense,
    Ragged,
    Sparse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceholderKind {
    Dense,
    Ragged { ragged_rank: usize },
    Sparse,
}

impl PlaceholderKind {
    pub fn ragged(ragged_rank: usize) -> Self {
        PlaceholderKind::Ragged { ragged_rank }
    }

    pub fn class(&self) -> PlaceholderClass {
        match self {
            PlaceholderKind::Dense => PlaceholderClass::Dense,
            PlaceholderKind::Ragged { .. } => PlaceholderClass::Ragged,
            PlaceholderKind::Sparse => PlaceholderClass::Sparse,
        }
    }

    pub fn ragged_rank(&self) -> usize {
        match self {
            PlaceholderKind::Ragged { ragged_rank } => *ragged_rank,
            _ => 0,
        }
    }

    /// Kind of a value one ragged dimension deeper (`x.values`).
    pub fn inner(&self) -> Self {
        match self {
            PlaceholderKind::Ragged { ragged_rank } if *ragged_rank > 1 => {
                PlaceholderKind::Ragged {
                    ragged_rank: ragged_rank - 1,
                }
            }
            _ => PlaceholderKind::Dense,
        }
    }

    /// Kind of a ragged value whose values have this kind.
    pub fn outer(&self) -> Self {
        PlaceholderKind::Ragged {
            ragged_rank: self.ragged_rank() + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderId {
    inner: usize,
}

impl PlaceholderId {
    pub(crate) fn new(inner: usize) -> Self {
        Self { inner }
    }

    pub fn index(&self) -> usize {
        self.inner
    }
}

/// The node that produced a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub node: NodeId,
    pub layer_name: String,
    pub class_name: &'static str,
}

/// Stand-in for a value that only exists once the recorded graph executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placeholder {
    id: PlaceholderId,
    kind: PlaceholderKind,
    // Issuing builder; zero once deserialized.
    #[serde(skip)]
    scope: u64,
    #[serde(skip)]
    producer: Option<Producer>,
}

impl Placeholder {
    pub(crate) fn input(scope: u64, id: PlaceholderId, kind: PlaceholderKind) -> Self {
        Self {
            id,
            kind,
            scope,
            producer: None,
        }
    }

    pub(crate) fn produced(
        scope: u64,
        id: PlaceholderId,
        kind: PlaceholderKind,
        producer: Producer,
    ) -> Self {
        Self {
            id,
            kind,
            scope,
            producer: Some(producer),
        }
    }

    pub(crate) fn with_producer(mut self, producer: Producer) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn id(&self) -> PlaceholderId {
        self.id
    }

    pub(crate) fn scope(&self) -> u64 {
        self.scope
    }

    pub fn kind(&self) -> PlaceholderKind {
        self.kind
    }

    pub fn class(&self) -> PlaceholderClass {
        self.kind.class()
    }

    /// `None` for graph inputs.
    pub fn producer(&self) -> Option<&Producer> {
        self.producer.as_ref()
    }
}

impl PartialEq for Placeholder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}
