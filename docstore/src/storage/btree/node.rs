//! B-tree node and entry types.
//!
//! Nodes live in an arena owned by the tree and refer to each other by
//! [`NodeId`]. A node is external when its entries are [`Entry::Leaf`] and
//! internal when they are [`Entry::Separator`]; a node never mixes the two.

/// Maximum number of entries in a node. A node that reaches it is split into
/// two halves of `MAX_ENTRIES / 2`.
pub const MAX_ENTRIES: usize = 6;

/// Index of a node in the tree's arena.
pub type NodeId = usize;

/// Value slot of an external entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafValue<V> {
    /// The value is held in memory.
    Resident(V),
    /// The value has been handed to the persistence manager.
    Parked,
    /// The key is present but holds no value.
    Vacant,
}

/// Observable state of a key, without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueState {
    Resident,
    Parked,
    Vacant,
}

impl<V> LeafValue<V> {
    /// The state of this slot.
    #[must_use]
    pub const fn state(&self) -> ValueState {
        match self {
            Self::Resident(_) => ValueState::Resident,
            Self::Parked => ValueState::Parked,
            Self::Vacant => ValueState::Vacant,
        }
    }

    /// The value, if it is resident.
    #[must_use]
    pub const fn resident(&self) -> Option<&V> {
        match self {
            Self::Resident(value) => Some(value),
            Self::Parked | Self::Vacant => None,
        }
    }
}

/// One entry of a node.
#[derive(Debug)]
pub(crate) enum Entry<K, V> {
    /// Internal entry. `key` is the smallest key stored under `child`.
    Separator { key: K, child: NodeId },
    /// External entry.
    Leaf { key: K, value: LeafValue<V> },
}

impl<K, V> Entry<K, V> {
    pub(crate) const fn key(&self) -> &K {
        match self {
            Self::Separator { key, .. } | Self::Leaf { key, .. } => key,
        }
    }

    pub(crate) const fn child(&self) -> Option<NodeId> {
        match self {
            Self::Separator { child, .. } => Some(*child),
            Self::Leaf { .. } => None,
        }
    }

    pub(crate) const fn slot(&self) -> Option<&LeafValue<V>> {
        match self {
            Self::Leaf { value, .. } => Some(value),
            Self::Separator { .. } => None,
        }
    }

    pub(crate) const fn slot_mut(&mut self) -> Option<&mut LeafValue<V>> {
        match self {
            Self::Leaf { value, .. } => Some(value),
            Self::Separator { .. } => None,
        }
    }
}

/// A node of the tree.
///
/// `previous` and `next` link external nodes in key order and are always
/// `None` for internal nodes.
#[derive(Debug)]
pub(crate) struct Node<K, V> {
    pub(crate) entries: Vec<Entry<K, V>>,
    pub(crate) previous: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl<K: Ord, V> Node<K, V> {
    pub(crate) const fn new() -> Self {
        Self::with_entries(Vec::new())
    }

    pub(crate) const fn with_entries(entries: Vec<Entry<K, V>>) -> Self {
        Self {
            entries,
            previous: None,
            next: None,
        }
    }

    pub(crate) fn is_external(&self) -> bool {
        !matches!(self.entries.first(), Some(Entry::Separator { .. }))
    }

    /// Index of the last entry whose key is `<= key`, or 0 if every key is
    /// larger.
    ///
    /// For internal nodes this is the child to descend into; for external
    /// nodes it is the only candidate for an exact match.
    pub(crate) fn floor_index(&self, key: &K) -> usize {
        self.entries
            .iter()
            .rposition(|entry| entry.key() <= key)
            .unwrap_or(0)
    }

    /// Index at which a new external entry for `key` keeps the node sorted.
    pub(crate) fn insertion_index(&self, key: &K) -> usize {
        self.entries
            .iter()
            .position(|entry| key < entry.key())
            .unwrap_or(self.entries.len())
    }
}
