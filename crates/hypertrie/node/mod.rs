mod full;
mod node_ref;

use std::borrow::Cow;

pub use full::{ChildMap, Edges, FullNode, ValueMap};
pub use node_ref::{NodeKind, NodeRef};

use crate::identifier::Identifier;
use crate::key::{Entry, KeyPart};
use crate::value::Value;

/// A stored node holding exactly one entry.
pub type CompressedNode<V> = Entry<V>;

/// Externally visible handle to a (sub-)hypertrie: its depth and root reference.
///
/// It never owns the node; lifetime is managed by node storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeContainer<V> {
    pub depth: usize,
    pub node: NodeRef<V>,
}

impl<V: Value> NodeContainer<V> {
    pub fn empty(depth: usize) -> Self {
        Self {
            depth,
            node: NodeRef::Empty,
        }
    }

    pub fn identifier(&self) -> Identifier {
        self.node.identifier()
    }
}

/// A resolved node, borrowed from node storage or detached from it.
#[derive(Debug, Clone)]
pub enum NodeView<'a, V: Value> {
    Empty,
    Inline(KeyPart, V),
    /// Borrowed when stored, owned when produced by slicing a stored node.
    Compressed(Cow<'a, CompressedNode<V>>),
    Full(Identifier, &'a FullNode<V>),
}

impl<'a, V: Value> NodeView<'a, V> {
    /// A detached view holding `entry`.
    pub fn from_entry(entry: Entry<V>) -> Self {
        if entry.depth() == 1 {
            NodeView::Inline(entry.key[0], entry.value)
        } else {
            NodeView::Compressed(Cow::Owned(entry))
        }
    }

    pub fn size(&self) -> usize {
        match self {
            NodeView::Empty => 0,
            NodeView::Inline(..) | NodeView::Compressed(_) => 1,
            NodeView::Full(_, node) => node.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeView::Empty)
    }

    pub fn identifier(&self) -> Identifier {
        match self {
            NodeView::Empty => Identifier::EMPTY,
            NodeView::Inline(key_part, value) => Identifier::of_entry(&[*key_part], *value),
            NodeView::Compressed(entry) => Identifier::of_entry(&entry.key, entry.value),
            NodeView::Full(id, _) => *id,
        }
    }

    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            NodeView::Empty => None,
            NodeView::Inline(..) | NodeView::Compressed(_) => Some(NodeKind::Compressed),
            NodeView::Full(..) => Some(NodeKind::Full),
        }
    }

    /// The single entry of a compressed view.
    pub fn single_entry(&self) -> Option<Entry<V>> {
        match self {
            NodeView::Inline(key_part, value) => Some(Entry::new(&[*key_part], *value)),
            NodeView::Compressed(entry) => Some(entry.as_ref().clone()),
            NodeView::Empty | NodeView::Full(..) => None,
        }
    }
}
