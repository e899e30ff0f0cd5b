use std::fmt;

use crate::allocator::NodeAllocator;
use crate::diagonal::HashDiagonal;
use crate::error::HypertrieError;
use crate::identifier::Identifier;
use crate::iter::Iter;
use crate::key::{Entry, KeyPart, KeyPositions, RawKey, SliceKey, check_key_length};
use crate::node::{NodeContainer, NodeView};
use crate::storage::NodeStorage;
use crate::value::Value;

/// Read-only view of a hypertrie or of a sub-hypertrie within node storage.
///
/// Views borrow the storage, so they stay valid exactly as long as no update
/// can run.
pub struct HypertrieRef<'a, V: Value, A: NodeAllocator> {
    storage: &'a NodeStorage<V, A>,
    depth: usize,
    node: NodeView<'a, V>,
}

/// Outcome of slicing: a value when every position was fixed, otherwise the
/// sub-hypertrie over the free positions.
pub enum SliceResult<'a, V: Value, A: NodeAllocator> {
    Value(V),
    Trie(HypertrieRef<'a, V, A>),
}

impl<'a, V: Value, A: NodeAllocator> HypertrieRef<'a, V, A> {
    pub(crate) fn new(storage: &'a NodeStorage<V, A>, depth: usize, node: NodeView<'a, V>) -> Self {
        Self {
            storage,
            depth,
            node,
        }
    }

    pub(crate) fn of_container(
        storage: &'a NodeStorage<V, A>,
        container: &NodeContainer<V>,
    ) -> Self {
        Self::new(
            storage,
            container.depth,
            storage.resolve(container.depth, &container.node),
        )
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn size(&self) -> usize {
        self.node.size()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    /// Content hash of the viewed entries. Equal contents hash equally.
    pub fn hash(&self) -> Identifier {
        self.node.identifier()
    }

    pub fn node(&self) -> &NodeView<'a, V> {
        &self.node
    }

    pub fn get(&self, key: &[KeyPart]) -> Result<V, HypertrieError> {
        check_key_length(key, self.depth)?;
        Ok(get_value(self.storage, self.depth, self.node.clone(), key))
    }

    pub fn contains(&self, key: &[KeyPart]) -> Result<bool, HypertrieError> {
        Ok(!self.get(key)?.is_empty())
    }

    /// Fixes the positions set in `slice_key` and returns what is left.
    ///
    /// The fixed position with the fewest distinct key parts is resolved
    /// first at every node, which keeps the number of visited nodes low.
    pub fn slice(
        &self,
        slice_key: &[Option<KeyPart>],
    ) -> Result<SliceResult<'a, V, A>, HypertrieError> {
        if slice_key.len() != self.depth {
            return Err(HypertrieError::WrongSliceKeyLength {
                expected: self.depth,
                actual: slice_key.len(),
            });
        }
        let fixed = slice_key.iter().flatten().count();
        if fixed == self.depth {
            let key: RawKey = slice_key.iter().flatten().copied().collect();
            return Ok(SliceResult::Value(get_value(
                self.storage,
                self.depth,
                self.node.clone(),
                &key,
            )));
        }
        let result_depth = self.depth - fixed;
        let node = slice_view(self.storage, self.depth, self.node.clone(), slice_key);
        Ok(SliceResult::Trie(Self::new(self.storage, result_depth, node)))
    }

    /// Iterates the key parts shared by `positions`, see [`HashDiagonal`].
    pub fn diagonal(&self, positions: &[usize]) -> Result<HashDiagonal<'a, V, A>, HypertrieError> {
        let positions = KeyPositions::new(positions, self.depth)?;
        Ok(HashDiagonal::new(self.storage, self.depth, self.node.clone(), positions))
    }

    pub fn iter(&self) -> Iter<'a, V, A> {
        Iter::new(self.storage, self.depth, self.node.clone())
    }

    pub fn to_entries(&self) -> Vec<Entry<V>> {
        self.iter().collect()
    }
}

impl<V: Value, A: NodeAllocator> Clone for HypertrieRef<'_, V, A> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage,
            depth: self.depth,
            node: self.node.clone(),
        }
    }
}

impl<V: Value, A: NodeAllocator> fmt::Debug for HypertrieRef<'_, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HypertrieRef")
            .field("depth", &self.depth)
            .field("size", &self.size())
            .field("hash", &self.hash())
            .finish()
    }
}

impl<'a, V: Value, A: NodeAllocator> IntoIterator for &HypertrieRef<'a, V, A> {
    type Item = Entry<V>;
    type IntoIter = Iter<'a, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<V: Value, A: NodeAllocator> SliceResult<'_, V, A> {
    /// The value of a fully fixed slice, empty for a sub-hypertrie.
    pub fn value(&self) -> V {
        match self {
            SliceResult::Value(value) => *value,
            SliceResult::Trie(_) => V::default(),
        }
    }
}

impl<'a, V: Value, A: NodeAllocator> SliceResult<'a, V, A> {
    pub fn into_trie(self) -> Option<HypertrieRef<'a, V, A>> {
        match self {
            SliceResult::Value(_) => None,
            SliceResult::Trie(trie) => Some(trie),
        }
    }
}

impl<V: Value, A: NodeAllocator> fmt::Debug for SliceResult<'_, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceResult::Value(value) => f.debug_tuple("Value").field(value).finish(),
            SliceResult::Trie(trie) => f.debug_tuple("Trie").field(trie).finish(),
        }
    }
}

/// Point lookup, descending along the position with the fewest key parts.
pub(crate) fn get_value<'a, V: Value, A: NodeAllocator>(
    storage: &'a NodeStorage<V, A>,
    depth: usize,
    node: NodeView<'a, V>,
    key: &[KeyPart],
) -> V {
    let mut key = RawKey::from_slice(key);
    let mut depth = depth;
    let mut node = node;
    loop {
        match node {
            NodeView::Empty => return V::default(),
            NodeView::Inline(key_part, value) => {
                return if key[0] == key_part {
                    value
                } else {
                    V::default()
                };
            }
            NodeView::Compressed(entry) => {
                return if entry.key == key {
                    entry.value
                } else {
                    V::default()
                };
            }
            NodeView::Full(_, full) => {
                if depth == 1 {
                    return full.value(key[0]).unwrap_or_default();
                }
                let pos = full.min_card_pos();
                let Some(child) = full.child(pos, key[pos]) else {
                    return V::default();
                };
                key.remove(pos);
                depth -= 1;
                node = storage.resolve(depth, &child);
            }
        }
    }
}

/// Sub-hypertrie of `node` over the free positions of `slice_key`, which has
/// at least one fixed and one free position.
fn slice_view<'a, V: Value, A: NodeAllocator>(
    storage: &'a NodeStorage<V, A>,
    depth: usize,
    node: NodeView<'a, V>,
    slice_key: &[Option<KeyPart>],
) -> NodeView<'a, V> {
    let mut slice_key = SliceKey::from_slice(slice_key);
    let mut depth = depth;
    let mut node = node;
    loop {
        match &node {
            NodeView::Empty => return NodeView::Empty,
            NodeView::Inline(..) | NodeView::Compressed(_) => {
                let Some(entry) = node.single_entry() else {
                    return NodeView::Empty;
                };
                let matches = slice_key
                    .iter()
                    .zip(&entry.key)
                    .all(|(fixed, key_part)| fixed.is_none_or(|fixed| fixed == *key_part));
                if !matches {
                    return NodeView::Empty;
                }
                let key: RawKey = slice_key
                    .iter()
                    .zip(&entry.key)
                    .filter(|(fixed, _)| fixed.is_none())
                    .map(|(_, key_part)| *key_part)
                    .collect();
                return NodeView::from_entry(Entry {
                    key,
                    value: entry.value,
                });
            }
            NodeView::Full(_, full) => {
                let fixed = (0..depth)
                    .filter_map(|pos| slice_key[pos].map(|key_part| (pos, key_part)))
                    .min_by_key(|(pos, _)| full.cardinality(*pos));
                let Some((pos, key_part)) = fixed else {
                    return node;
                };
                let Some(child) = full.child(pos, key_part) else {
                    return NodeView::Empty;
                };
                slice_key.remove(pos);
                depth -= 1;
                node = storage.resolve(depth, &child);
            }
        }
    }
}
