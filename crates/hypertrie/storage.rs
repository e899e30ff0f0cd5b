use std::borrow::Cow;

use rustc_hash::FxHashMap;

use crate::allocator::{NodeAllocator, NodeBox};
use crate::identifier::Identifier;
use crate::node::{CompressedNode, FullNode, NodeRef, NodeView};
use crate::value::Value;

struct Slot<N, A: NodeAllocator> {
    node: NodeBox<N, A>,
    ref_count: usize,
}

/// Hash-consing table for one node kind at one depth: identifier to node and
/// reference count.
///
/// Nodes live in memory of the table's allocator. Every entry has a reference
/// count of at least one once an update has completed. Releasing or adjusting
/// an identifier that is not present is an accounting bug and panics.
pub struct SpecificNodeStorage<N, A: NodeAllocator> {
    depth: usize,
    nodes: FxHashMap<Identifier, Slot<N, A>>,
    allocator: A,
}

impl<N, A: NodeAllocator> SpecificNodeStorage<N, A> {
    pub fn new(depth: usize, allocator: A) -> Self {
        Self {
            depth,
            nodes: FxHashMap::default(),
            allocator,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: Identifier) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Reads a node without touching its reference count.
    pub fn get(&self, id: Identifier) -> Option<&N> {
        self.nodes.get(&id).map(|slot| &*slot.node)
    }

    pub fn ref_count(&self, id: Identifier) -> Option<usize> {
        self.nodes.get(&id).map(|slot| slot.ref_count)
    }

    /// Like [`SpecificNodeStorage::get`] for identifiers that must be present.
    pub fn lookup(&self, id: Identifier) -> &N {
        match self.nodes.get(&id) {
            Some(slot) => &*slot.node,
            None => panic!("dangling identifier {id} at depth {}", self.depth),
        }
    }

    /// Adds `count` references to `id`, creating the node with `create` if it
    /// does not exist yet.
    pub fn acquire(&mut self, id: Identifier, count: usize, create: impl FnOnce() -> N) -> &N {
        let allocator = &self.allocator;
        let slot = self.nodes.entry(id).or_insert_with(|| Slot {
            node: NodeBox::new_in(create(), allocator.clone()),
            ref_count: 0,
        });
        slot.ref_count += count;
        &*slot.node
    }

    /// Removes `count` references from `id`. When the count reaches zero the
    /// node is removed and handed back to the caller, who is responsible for
    /// its children.
    pub fn release(&mut self, id: Identifier, count: usize) -> Option<N> {
        let depth = self.depth;
        let Some(slot) = self.nodes.get_mut(&id) else {
            panic!("releasing {count} references of absent identifier {id} at depth {depth}");
        };
        let Some(ref_count) = slot.ref_count.checked_sub(count) else {
            panic!("negative reference count for {id} at depth {depth}");
        };
        slot.ref_count = ref_count;
        if ref_count > 0 {
            return None;
        }
        let slot = self.nodes.remove(&id)?;
        Some(NodeBox::into_inner(slot.node))
    }

    /// Stores a new node under `id` with an initial reference count.
    pub fn insert(&mut self, id: Identifier, node: N, ref_count: usize) {
        let node = NodeBox::new_in(node, self.allocator.clone());
        self.attach(id, node, ref_count);
    }

    /// Adds `delta` to the reference count of `id`, see
    /// [`SpecificNodeStorage::release`] for negative deltas.
    pub fn adjust(&mut self, id: Identifier, delta: isize) -> Option<N> {
        if delta < 0 {
            return self.release(id, delta.unsigned_abs());
        }
        match self.nodes.get_mut(&id) {
            Some(slot) => slot.ref_count += delta.unsigned_abs(),
            None => panic!(
                "reference count change {delta} for absent identifier {id} at depth {}",
                self.depth
            ),
        }
        None
    }

    /// Removes the node for `id` whatever its reference count.
    pub fn remove(&mut self, id: Identifier) -> N {
        NodeBox::into_inner(self.detach(id))
    }

    /// Moves the node for `id` out of the table without deallocating it.
    ///
    /// Only valid for nodes whose reference count is about to reach zero: the
    /// caller becomes the sole owner and may mutate the node before handing it
    /// back through [`SpecificNodeStorage::attach`] under its new identifier.
    pub fn detach(&mut self, id: Identifier) -> NodeBox<N, A> {
        match self.nodes.remove(&id) {
            Some(slot) => slot.node,
            None => panic!("detaching absent identifier {id} at depth {}", self.depth),
        }
    }

    /// Stores an already allocated node under `id`.
    pub fn attach(&mut self, id: Identifier, node: NodeBox<N, A>, ref_count: usize) {
        assert!(
            ref_count > 0,
            "node {id} at depth {} stored with zero references",
            self.depth
        );
        let previous = self.nodes.insert(id, Slot { node, ref_count });
        assert!(
            previous.is_none(),
            "identifier {id} at depth {} stored twice",
            self.depth
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = (Identifier, &N, usize)> {
        self.nodes
            .iter()
            .map(|(id, slot)| (*id, &*slot.node, slot.ref_count))
    }
}

/// The compressed and the full node tables of one depth.
pub struct LevelStorage<V: Value, A: NodeAllocator> {
    pub compressed: SpecificNodeStorage<CompressedNode<V>, A>,
    pub full: SpecificNodeStorage<FullNode<V>, A>,
}

impl<V: Value, A: NodeAllocator> LevelStorage<V, A> {
    fn new(depth: usize, allocator: A) -> Self {
        Self {
            compressed: SpecificNodeStorage::new(depth, allocator.clone()),
            full: SpecificNodeStorage::new(depth, allocator),
        }
    }

    pub fn len(&self) -> usize {
        self.compressed.len() + self.full.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compressed.is_empty() && self.full.is_empty()
    }
}

/// One [`LevelStorage`] per depth `1..=max_depth`.
pub struct NodeStorage<V: Value, A: NodeAllocator> {
    levels: Vec<LevelStorage<V, A>>,
    allocator: A,
}

impl<V: Value, A: NodeAllocator> NodeStorage<V, A> {
    pub fn new(max_depth: usize, allocator: A) -> Self {
        let levels = (1..=max_depth)
            .map(|depth| LevelStorage::new(depth, allocator.clone()))
            .collect();
        Self { levels, allocator }
    }

    pub fn max_depth(&self) -> usize {
        self.levels.len()
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Storage of `depth` (1-based).
    pub fn level(&self, depth: usize) -> &LevelStorage<V, A> {
        &self.levels[depth - 1]
    }

    pub(crate) fn levels(&self) -> &[LevelStorage<V, A>] {
        &self.levels
    }

    pub(crate) fn levels_mut(&mut self) -> &mut [LevelStorage<V, A>] {
        &mut self.levels
    }

    /// Total number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.levels.iter().map(LevelStorage::len).sum()
    }

    pub fn ref_count(&self, depth: usize, node: &NodeRef<V>) -> Option<usize> {
        ref_count_in(&self.levels, depth, node)
    }

    pub fn resolve(&self, depth: usize, node: &NodeRef<V>) -> NodeView<'_, V> {
        resolve_in(&self.levels, depth, node)
    }
}

/// Reference count of `node` within `levels`, where `levels[depth - 1]` is
/// the storage of `depth`.
pub(crate) fn ref_count_in<V: Value, A: NodeAllocator>(
    levels: &[LevelStorage<V, A>],
    depth: usize,
    node: &NodeRef<V>,
) -> Option<usize> {
    let level = &levels[depth - 1];
    match node {
        NodeRef::Empty | NodeRef::Inline(..) => None,
        NodeRef::Compressed(id) => level.compressed.ref_count(*id),
        NodeRef::Full(id) => level.full.ref_count(*id),
    }
}

pub(crate) fn resolve_in<'a, V: Value, A: NodeAllocator>(
    levels: &'a [LevelStorage<V, A>],
    depth: usize,
    node: &NodeRef<V>,
) -> NodeView<'a, V> {
    match *node {
        NodeRef::Empty => NodeView::Empty,
        NodeRef::Inline(key_part, value) => NodeView::Inline(key_part, value),
        NodeRef::Compressed(id) => {
            NodeView::Compressed(Cow::Borrowed(levels[depth - 1].compressed.lookup(id)))
        }
        NodeRef::Full(id) => NodeView::Full(id, levels[depth - 1].full.lookup(id)),
    }
}
