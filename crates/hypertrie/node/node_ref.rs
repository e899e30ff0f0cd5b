use crate::identifier::Identifier;
use crate::key::KeyPart;
use crate::value::Value;

/// A reference to a node, held by a parent edge or by a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeRef<V> {
    /// No entries at all.
    #[default]
    Empty,
    /// The single entry of a depth-1 node, embedded within the reference.
    Inline(KeyPart, V),
    /// A stored single-entry node, referenced by its identifier.
    Compressed(Identifier),
    /// A stored node with two or more entries, referenced by its identifier.
    Full(Identifier),
}

/// How a node is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Compressed = 0,
    Full = 1,
}

impl<V: Value> NodeRef<V> {
    pub fn identifier(&self) -> Identifier {
        match *self {
            NodeRef::Empty => Identifier::EMPTY,
            NodeRef::Inline(key_part, value) => Identifier::of_entry(&[key_part], value),
            NodeRef::Compressed(id) | NodeRef::Full(id) => id,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            NodeRef::Empty => None,
            NodeRef::Inline(..) | NodeRef::Compressed(_) => Some(NodeKind::Compressed),
            NodeRef::Full(_) => Some(NodeKind::Full),
        }
    }

    /// Whether the referenced node lives in node storage and is reference counted.
    pub fn is_stored(&self) -> bool {
        matches!(self, NodeRef::Compressed(_) | NodeRef::Full(_))
    }
}
