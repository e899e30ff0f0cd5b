use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crossbeam::queue::SegQueue;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::Hypertrie;
use crate::allocator::{HeapAllocator, NodeAllocator};
use crate::config::ContextConfig;
use crate::error::HypertrieError;
use crate::identifier::Identifier;
use crate::iter::Iter;
use crate::key::{Entry, KeyPart, RawKey, check_key_length};
use crate::node::{Edges, NodeContainer, NodeRef, NodeView};
use crate::storage::NodeStorage;
use crate::update::{adjust_root_references, erase_entries, insert_entries};
use crate::value::Value;
use crate::view::{HypertrieRef, get_value};

/// How a batch of changes was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Keys that were absent and now hold a value.
    pub inserted: usize,
    /// Keys whose value was replaced by a different non-empty value.
    pub changed: usize,
    /// Keys that held a value and are now absent.
    pub removed: usize,
}

impl UpdateSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Number of references every stored node should have, keyed by depth and
/// node.
type ReferenceCounts<V> = FxHashMap<(usize, NodeRef<V>), usize>;

/// Node storage of a set of hypertries plus the operations on their roots.
///
/// Every hypertrie of one context shares its nodes with all the others.
pub struct RawContext<V: Value, A: NodeAllocator = HeapAllocator> {
    config: ContextConfig,
    storage: NodeStorage<V, A>,
}

impl<V: Value, A: NodeAllocator> RawContext<V, A> {
    pub fn new(config: ContextConfig, allocator: A) -> Result<Self, HypertrieError> {
        config.validate()?;
        Ok(Self {
            config,
            storage: NodeStorage::new(config.max_depth, allocator),
        })
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn storage(&self) -> &NodeStorage<V, A> {
        &self.storage
    }

    pub fn check_depth(&self, depth: usize) -> Result<(), HypertrieError> {
        if depth == 0 {
            return Err(HypertrieError::DepthOutOfRange(depth));
        }
        if depth > self.config.max_depth {
            return Err(HypertrieError::DepthExceedsContext {
                depth,
                max_depth: self.config.max_depth,
            });
        }
        Ok(())
    }

    pub fn view(&self, container: &NodeContainer<V>) -> HypertrieRef<'_, V, A> {
        HypertrieRef::of_container(&self.storage, container)
    }

    pub fn size(&self, container: &NodeContainer<V>) -> usize {
        self.storage
            .resolve(container.depth, &container.node)
            .size()
    }

    pub fn get(&self, container: &NodeContainer<V>, key: &[KeyPart]) -> Result<V, HypertrieError> {
        check_key_length(key, container.depth)?;
        Ok(self.get_unchecked(container, key))
    }

    pub(crate) fn get_unchecked(&self, container: &NodeContainer<V>, key: &[KeyPart]) -> V {
        let node = self.storage.resolve(container.depth, &container.node);
        get_value(&self.storage, container.depth, node, key)
    }

    /// Applies a batch of changes: an empty value removes the key, any other
    /// value stores it. For a key listed more than once the last change wins.
    ///
    /// Keys are validated before anything is modified.
    pub fn update(
        &mut self,
        container: &mut NodeContainer<V>,
        changes: Vec<Entry<V>>,
    ) -> Result<UpdateSummary, HypertrieError> {
        for change in &changes {
            check_key_length(&change.key, container.depth)?;
        }
        let mut latest: FxHashMap<RawKey, V> = FxHashMap::default();
        for change in changes {
            latest.insert(change.key, change.value);
        }

        let mut summary = UpdateSummary::default();
        let mut erased = Vec::new();
        let mut inserted = Vec::new();
        for (key, value) in latest {
            let old = self.get_unchecked(container, &key);
            match (old.is_empty(), value.is_empty()) {
                (true, true) => {}
                (true, false) => {
                    summary.inserted += 1;
                    inserted.push(Entry { key, value });
                }
                (false, true) => {
                    summary.removed += 1;
                    erased.push(Entry { key, value: old });
                }
                (false, false) if old == value => {}
                (false, false) => {
                    summary.changed += 1;
                    erased.push(Entry {
                        key: key.clone(),
                        value: old,
                    });
                    inserted.push(Entry { key, value });
                }
            }
        }
        debug!(
            depth = container.depth,
            inserted = summary.inserted,
            changed = summary.changed,
            removed = summary.removed,
            "updating hypertrie"
        );
        erase_entries(&mut self.storage, container, erased);
        insert_entries(&mut self.storage, container, inserted);
        Ok(summary)
    }

    /// Sets `key` to `value` and returns the previous value.
    pub fn set(
        &mut self,
        container: &mut NodeContainer<V>,
        key: &[KeyPart],
        value: V,
    ) -> Result<V, HypertrieError> {
        let old = self.get(container, key)?;
        if old != value {
            self.update(container, vec![Entry::new(key, value)])?;
        }
        Ok(old)
    }

    /// Inserts entries whose keys are pairwise distinct and not stored yet.
    pub(crate) fn insert_unchecked(
        &mut self,
        container: &mut NodeContainer<V>,
        entries: Vec<Entry<V>>,
    ) {
        insert_entries(&mut self.storage, container, entries);
    }

    /// Erases entries that are stored with exactly the given values.
    pub(crate) fn erase_unchecked(
        &mut self,
        container: &mut NodeContainer<V>,
        entries: Vec<Entry<V>>,
    ) {
        erase_entries(&mut self.storage, container, entries);
    }

    /// Registers one more holder of the root of `container`.
    pub fn inc_ref(&mut self, container: &NodeContainer<V>) {
        let level = &mut self.storage.levels_mut()[container.depth - 1];
        match container.node {
            NodeRef::Empty | NodeRef::Inline(..) => {}
            NodeRef::Compressed(id) => {
                level.compressed.adjust(id, 1);
            }
            NodeRef::Full(id) => {
                level.full.adjust(id, 1);
            }
        }
    }

    /// Releases one holder of the root of `container`, deleting every node
    /// that is no longer reachable.
    pub fn dec_ref(&mut self, container: &NodeContainer<V>) {
        adjust_root_references(&mut self.storage, container, -1);
    }

    /// Checks the structural invariants of node storage.
    ///
    /// Reference counts are only checked to cover the parent edges: counts
    /// held by roots are invisible to storage. See [`RawContext::verify_roots`]
    /// for the exact check.
    pub fn verify(&self) -> Result<(), HypertrieError> {
        for ((depth, child), edges) in self.verify_structure()? {
            let ref_count = self.storage.ref_count(depth, &child).unwrap_or_default();
            if ref_count < edges {
                return inconsistent(format!(
                    "node {} at depth {depth}: {edges} parents, reference count {ref_count}",
                    child.identifier()
                ));
            }
        }
        Ok(())
    }

    /// Like [`RawContext::verify`], and checks that the reference count of
    /// every stored node equals the number of its parent edges plus the
    /// number of `roots` referencing it. `roots` must list the root of every
    /// live holder, once per holder.
    pub fn verify_roots<'r>(
        &self,
        roots: impl IntoIterator<Item = &'r NodeContainer<V>>,
    ) -> Result<(), HypertrieError> {
        let mut expected = self.verify_structure()?;
        for root in roots {
            if root.node.is_stored() {
                *expected.entry((root.depth, root.node)).or_default() += 1;
            }
        }
        for depth in 1..=self.config.max_depth {
            let level = self.storage.level(depth);
            let compressed = level
                .compressed
                .iter()
                .map(|(id, _, ref_count)| (NodeRef::Compressed(id), ref_count));
            let full = level
                .full
                .iter()
                .map(|(id, _, ref_count)| (NodeRef::Full(id), ref_count));
            for (node, ref_count) in compressed.chain(full) {
                let holders = expected.remove(&(depth, node)).unwrap_or_default();
                if holders != ref_count {
                    return inconsistent(format!(
                        "node {} at depth {depth}: {holders} holders, reference count {ref_count}",
                        node.identifier()
                    ));
                }
            }
        }
        match expected.into_keys().next() {
            Some((depth, node)) => inconsistent(format!(
                "root {} at depth {depth} is not stored",
                node.identifier()
            )),
            None => Ok(()),
        }
    }

    /// Checks every stored node and returns the number of parent edges of
    /// every stored child.
    fn verify_structure(&self) -> Result<ReferenceCounts<V>, HypertrieError> {
        let mut edge_counts = ReferenceCounts::default();
        for depth in 1..=self.config.max_depth {
            let level = self.storage.level(depth);
            if depth == 1 && !level.compressed.is_empty() {
                return inconsistent("compressed nodes stored at depth 1".to_string());
            }
            for (id, entry, ref_count) in level.compressed.iter() {
                if ref_count == 0 {
                    return inconsistent(format!(
                        "compressed node {id} at depth {depth} has no references"
                    ));
                }
                if entry.depth() != depth || entry.value.is_empty() {
                    return inconsistent(format!(
                        "compressed node {id} at depth {depth} holds {entry:?}"
                    ));
                }
                if Identifier::of_entry(&entry.key, entry.value) != id {
                    return inconsistent(format!(
                        "compressed node {id} at depth {depth} has a wrong identifier"
                    ));
                }
            }
            for (id, node, ref_count) in level.full.iter() {
                if ref_count == 0 {
                    return inconsistent(format!(
                        "full node {id} at depth {depth} has no references"
                    ));
                }
                if node.depth() != depth || node.size() < 2 {
                    return inconsistent(format!(
                        "full node {id} at depth {depth} has depth {} and size {}",
                        node.depth(),
                        node.size()
                    ));
                }
                if let Edges::Children(children) = node.edges() {
                    for (pos, edges) in children.iter().enumerate() {
                        let mut size = 0;
                        for child in edges.values() {
                            size += self.verify_child(id, depth, child)?;
                            if child.is_stored() {
                                *edge_counts.entry((depth - 1, *child)).or_default() += 1;
                            }
                        }
                        if size != node.size() {
                            return inconsistent(format!(
                                "full node {id} at depth {depth}: wrong size at position {pos}"
                            ));
                        }
                    }
                }
                let entries: Vec<Entry<V>> =
                    Iter::new(&self.storage, depth, NodeView::Full(id, node)).collect();
                if entries.len() != node.size() || Identifier::of(&entries) != id {
                    return inconsistent(format!(
                        "full node {id} at depth {depth} does not hash to its identifier"
                    ));
                }
            }
        }
        Ok(edge_counts)
    }

    /// Number of entries below `child`, after checking that it can be resolved.
    fn verify_child(
        &self,
        parent: Identifier,
        depth: usize,
        child: &NodeRef<V>,
    ) -> Result<usize, HypertrieError> {
        let child_depth = depth - 1;
        let level = self.storage.level(child_depth);
        let valid = match *child {
            NodeRef::Empty => false,
            NodeRef::Inline(_, value) => child_depth == 1 && !value.is_empty(),
            NodeRef::Compressed(id) => child_depth > 1 && level.compressed.contains(id),
            NodeRef::Full(id) => level.full.contains(id),
        };
        if !valid {
            return inconsistent(format!(
                "full node {parent} at depth {depth} has an invalid child {child:?}"
            ));
        }
        Ok(self.storage.resolve(child_depth, child).size())
    }
}

fn inconsistent<T>(message: String) -> Result<T, HypertrieError> {
    Err(HypertrieError::InconsistentStorage(message))
}

/// A change to the number of holders of a root that could not take the write
/// lock right away.
#[derive(Debug, Clone, Copy)]
enum RootChange<V> {
    Acquire(NodeContainer<V>),
    Release(NodeContainer<V>),
}

struct Shared<V: Value, A: NodeAllocator> {
    raw: RwLock<RawContext<V, A>>,
    /// Applied in order before the next write, and before reads whenever
    /// the lock is free.
    pending: SegQueue<RootChange<V>>,
}

/// Shared handle to a [`RawContext`].
///
/// Reads take the read lock, updates the write lock. Cloning or dropping a
/// [`Hypertrie`] never blocks: when the lock is taken, the root reference
/// change is queued and applied by the next writer. Clones share the
/// context; separate contexts never share nodes.
pub struct HypertrieContext<V: Value, A: NodeAllocator = HeapAllocator> {
    inner: Arc<Shared<V, A>>,
}

impl<V: Value> HypertrieContext<V, HeapAllocator> {
    pub fn new(config: ContextConfig) -> Result<Self, HypertrieError> {
        Self::with_allocator(config, HeapAllocator)
    }
}

impl<V: Value, A: NodeAllocator> HypertrieContext<V, A> {
    pub fn with_allocator(config: ContextConfig, allocator: A) -> Result<Self, HypertrieError> {
        Ok(Self {
            inner: Arc::new(Shared {
                raw: RwLock::new(RawContext::new(config, allocator)?),
                pending: SegQueue::new(),
            }),
        })
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, RawContext<V, A>>, HypertrieError> {
        if !self.inner.pending.is_empty()
            && let Some(mut raw) = self.try_write()
        {
            self.apply_pending(&mut raw);
        }
        self.inner.raw.read().map_err(|_| HypertrieError::LockError)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, RawContext<V, A>>, HypertrieError> {
        let lock = &self.inner.raw;
        let mut raw = lock.write().map_err(|_| HypertrieError::LockError)?;
        self.apply_pending(&mut raw);
        Ok(raw)
    }

    /// Write access if nobody holds the lock. Poisoning is ignored, so that
    /// references are still released while unwinding.
    fn try_write(&self) -> Option<RwLockWriteGuard<'_, RawContext<V, A>>> {
        match self.inner.raw.try_write() {
            Ok(raw) => Some(raw),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn apply_pending(&self, raw: &mut RawContext<V, A>) {
        while let Some(change) = self.inner.pending.pop() {
            match change {
                RootChange::Acquire(root) => raw.inc_ref(&root),
                RootChange::Release(root) => raw.dec_ref(&root),
            }
        }
    }

    fn change_root(&self, change: RootChange<V>) {
        match self.try_write() {
            Some(mut raw) => {
                self.apply_pending(&mut raw);
                match change {
                    RootChange::Acquire(root) => raw.inc_ref(&root),
                    RootChange::Release(root) => raw.dec_ref(&root),
                }
            }
            None => {
                trace!(?change, "context is locked, deferring root reference change");
                self.inner.pending.push(change);
            }
        }
    }

    /// Registers one more holder of `root`.
    pub(crate) fn acquire_root(&self, root: &NodeContainer<V>) {
        if root.node.is_stored() {
            self.change_root(RootChange::Acquire(*root));
        }
    }

    /// Releases one holder of `root`.
    pub(crate) fn release_root(&self, root: &NodeContainer<V>) {
        if root.node.is_stored() {
            self.change_root(RootChange::Release(*root));
        }
    }

    pub fn max_depth(&self) -> Result<usize, HypertrieError> {
        Ok(self.read()?.config().max_depth)
    }

    /// Total number of stored nodes over all depths.
    pub fn node_count(&self) -> Result<usize, HypertrieError> {
        Ok(self.read()?.storage().node_count())
    }

    pub fn verify(&self) -> Result<(), HypertrieError> {
        self.read()?.verify()
    }

    /// Exact reference count check, see [`RawContext::verify_roots`].
    /// `handles` must be every live hypertrie of the context.
    pub fn verify_handles<'h>(
        &self,
        handles: impl IntoIterator<Item = &'h Hypertrie<V, A>>,
    ) -> Result<(), HypertrieError> {
        self.write()?
            .verify_roots(handles.into_iter().map(Hypertrie::root))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<V: Value, A: NodeAllocator> Clone for HypertrieContext<V, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Value, A: NodeAllocator> std::fmt::Debug for HypertrieContext<V, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypertrieContext")
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}
