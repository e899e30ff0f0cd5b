use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::MAX_DEPTH;
use crate::key::{KeyPart, KeyPositions};
use crate::value::Value;

use super::NodeRef;

pub type ChildMap<V> = FxHashMap<KeyPart, NodeRef<V>>;
pub type ValueMap<V> = FxHashMap<KeyPart, V>;

/// Outgoing edges of a full node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edges<V> {
    /// Depth 1: key part to value.
    Values(ValueMap<V>),
    /// Depth > 1: for every position, key part to the child of depth - 1.
    Children(SmallVec<[ChildMap<V>; MAX_DEPTH]>),
}

/// A node holding two or more entries.
///
/// For every position the node maps each key part occurring there to the
/// sub-hypertrie of all entries with that key part, with the position
/// removed. The same entry is therefore reachable once per position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullNode<V> {
    size: usize,
    edges: Edges<V>,
}

impl<V: Value> FullNode<V> {
    pub(crate) fn new(depth: usize) -> Self {
        debug_assert!((1..=MAX_DEPTH).contains(&depth));
        let edges = if depth == 1 {
            Edges::Values(ValueMap::default())
        } else {
            Edges::Children((0..depth).map(|_| ChildMap::default()).collect())
        };
        Self { size: 0, edges }
    }

    pub fn depth(&self) -> usize {
        match &self.edges {
            Edges::Values(_) => 1,
            Edges::Children(children) => children.len(),
        }
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        match &self.edges {
            Edges::Values(values) => values.len(),
            Edges::Children(_) => self.size,
        }
    }

    pub(crate) fn grow(&mut self, added: usize) {
        self.size += added;
    }

    pub(crate) fn shrink(&mut self, removed: usize) {
        self.size -= removed;
    }

    pub fn edges(&self) -> &Edges<V> {
        &self.edges
    }

    pub(crate) fn edges_mut(&mut self) -> &mut Edges<V> {
        &mut self.edges
    }

    pub fn values(&self) -> Option<&ValueMap<V>> {
        match &self.edges {
            Edges::Values(values) => Some(values),
            Edges::Children(_) => None,
        }
    }

    pub fn children(&self, pos: usize) -> Option<&ChildMap<V>> {
        match &self.edges {
            Edges::Values(_) => None,
            Edges::Children(children) => children.get(pos),
        }
    }

    /// Value stored under `key_part` of a depth-1 node.
    pub fn value(&self, key_part: KeyPart) -> Option<V> {
        self.values()?.get(&key_part).copied()
    }

    /// Child reached via `key_part` at `pos` of a node of depth > 1.
    pub fn child(&self, pos: usize, key_part: KeyPart) -> Option<NodeRef<V>> {
        self.children(pos)?.get(&key_part).copied()
    }

    /// Number of distinct key parts at `pos`.
    pub fn cardinality(&self, pos: usize) -> usize {
        match &self.edges {
            Edges::Values(values) => values.len(),
            Edges::Children(children) => children[pos].len(),
        }
    }

    /// Position with the fewest distinct key parts.
    pub fn min_card_pos(&self) -> usize {
        (0..self.depth())
            .min_by_key(|pos| self.cardinality(*pos))
            .unwrap_or_default()
    }

    /// Position among `positions` with the fewest distinct key parts.
    pub fn min_card_pos_in(&self, positions: KeyPositions) -> usize {
        positions
            .iter()
            .min_by_key(|pos| self.cardinality(*pos))
            .unwrap_or_default()
    }

    /// Position with the most distinct key parts.
    pub fn max_card_pos(&self) -> usize {
        (0..self.depth())
            .max_by_key(|pos| self.cardinality(*pos))
            .unwrap_or_default()
    }
}
