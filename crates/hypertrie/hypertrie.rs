pub mod allocator;
pub mod bulk;
pub mod config;
mod context;
mod diagonal;
pub mod error;
mod identifier;
mod iter;
mod key;
mod node;
mod storage;
#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_utils;
mod update;
mod value;
mod view;

use std::fmt;
use std::sync::RwLockReadGuard;

pub use self::allocator::{CountingAllocator, HeapAllocator, NodeAllocator};
pub use self::bulk::{AsyncBulkInserter, BulkCallback, SyncBulkInserter};
pub use self::config::{BulkConfig, BulkMode, ContextConfig, MAX_DEPTH};
pub use self::context::{HypertrieContext, RawContext, UpdateSummary};
pub use self::diagonal::HashDiagonal;
pub use self::error::HypertrieError;
pub use self::identifier::Identifier;
pub use self::iter::Iter;
pub use self::key::{Entry, KeyPart, KeyPositions, RawKey, SliceKey};
pub use self::node::{
    ChildMap, CompressedNode, Edges, FullNode, NodeContainer, NodeKind, NodeRef, NodeView,
    ValueMap,
};
pub use self::storage::{LevelStorage, NodeStorage, SpecificNodeStorage};
pub use self::value::Value;
pub use self::view::{HypertrieRef, SliceResult};

/// A sparse tensor of `depth` dimensions, indexed by [`KeyPart`]s.
///
/// The handle owns one reference to its root node within a
/// [`HypertrieContext`]. Structurally equal sub-hypertries are stored once per
/// context, so cloning a handle only increments a reference count and equal
/// contents have equal [`Hypertrie::hash`]es.
pub struct Hypertrie<V: Value = bool, A: NodeAllocator = HeapAllocator> {
    context: HypertrieContext<V, A>,
    root: NodeContainer<V>,
}

impl<V: Value, A: NodeAllocator> Hypertrie<V, A> {
    /// Creates an empty hypertrie of `depth` within `context`.
    pub fn new(context: &HypertrieContext<V, A>, depth: usize) -> Result<Self, HypertrieError> {
        context.read()?.check_depth(depth)?;
        Ok(Self {
            context: context.clone(),
            root: NodeContainer::empty(depth),
        })
    }

    pub fn context(&self) -> &HypertrieContext<V, A> {
        &self.context
    }

    pub fn depth(&self) -> usize {
        self.root.depth
    }

    pub fn root(&self) -> &NodeContainer<V> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.node.is_empty()
    }

    /// Content hash. Empty hypertries hash to [`Identifier::EMPTY`].
    pub fn hash(&self) -> Identifier {
        self.root.identifier()
    }

    /// Number of non-empty entries.
    pub fn size(&self) -> Result<usize, HypertrieError> {
        match self.root.node {
            NodeRef::Empty => Ok(0),
            NodeRef::Inline(..) | NodeRef::Compressed(_) => Ok(1),
            NodeRef::Full(_) => Ok(self.context.read()?.size(&self.root)),
        }
    }

    /// The value at `key`, empty when nothing is stored there.
    pub fn get(&self, key: &[KeyPart]) -> Result<V, HypertrieError> {
        self.context.read()?.get(&self.root, key)
    }

    pub fn contains(&self, key: &[KeyPart]) -> Result<bool, HypertrieError> {
        Ok(!self.get(key)?.is_empty())
    }

    /// Stores `value` at `key` and returns the previous value. Setting the
    /// empty value removes the entry.
    pub fn set(&mut self, key: &[KeyPart], value: V) -> Result<V, HypertrieError> {
        self.context.write()?.set(&mut self.root, key, value)
    }

    /// Stores every entry, replacing existing values. Entries with the empty
    /// value are ignored.
    pub fn insert(&mut self, entries: Vec<Entry<V>>) -> Result<UpdateSummary, HypertrieError> {
        let entries = entries
            .into_iter()
            .filter(|entry| !entry.value.is_empty())
            .collect();
        self.update(entries)
    }

    /// Removes the entries at `keys`. Absent keys are ignored.
    pub fn remove<K: AsRef<[KeyPart]>>(
        &mut self,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<UpdateSummary, HypertrieError> {
        let changes = keys
            .into_iter()
            .map(|key| Entry::new(key.as_ref(), V::default()))
            .collect();
        self.update(changes)
    }

    /// Applies a batch of changes, see [`RawContext::update`].
    pub fn update(&mut self, changes: Vec<Entry<V>>) -> Result<UpdateSummary, HypertrieError> {
        self.context.write()?.update(&mut self.root, changes)
    }

    /// Read access: holds the context's read lock until the guard is dropped.
    pub fn read(&self) -> Result<HypertrieGuard<'_, V, A>, HypertrieError> {
        Ok(HypertrieGuard {
            context: self.context.read()?,
            root: self.root,
        })
    }

    pub fn to_entries(&self) -> Result<Vec<Entry<V>>, HypertrieError> {
        Ok(self.read()?.view().to_entries())
    }

    /// Commits a batch prepared by a bulk pipeline and returns the new size.
    pub(crate) fn commit_batch(
        &mut self,
        mode: BulkMode,
        entries: Vec<Entry<V>>,
    ) -> Result<usize, HypertrieError> {
        let mut context = self.context.write()?;
        match mode {
            BulkMode::Insert => context.insert_unchecked(&mut self.root, entries),
            BulkMode::Remove => context.erase_unchecked(&mut self.root, entries),
        }
        Ok(context.size(&self.root))
    }
}

impl<V: Value, A: NodeAllocator> Clone for Hypertrie<V, A> {
    fn clone(&self) -> Self {
        self.context.acquire_root(&self.root);
        Self {
            context: self.context.clone(),
            root: self.root,
        }
    }
}

impl<V: Value, A: NodeAllocator> Drop for Hypertrie<V, A> {
    fn drop(&mut self) {
        self.context.release_root(&self.root);
    }
}

impl<V: Value, A: NodeAllocator> PartialEq for Hypertrie<V, A> {
    fn eq(&self, other: &Self) -> bool {
        self.context.ptr_eq(&other.context) && self.root == other.root
    }
}

impl<V: Value, A: NodeAllocator> Eq for Hypertrie<V, A> {}

impl<V: Value, A: NodeAllocator> fmt::Debug for Hypertrie<V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hypertrie")
            .field("depth", &self.root.depth)
            .field("root", &self.root.node)
            .finish()
    }
}

/// A [`Hypertrie`] under the read lock of its context.
pub struct HypertrieGuard<'h, V: Value, A: NodeAllocator> {
    context: RwLockReadGuard<'h, RawContext<V, A>>,
    root: NodeContainer<V>,
}

impl<V: Value, A: NodeAllocator> HypertrieGuard<'_, V, A> {
    pub fn view(&self) -> HypertrieRef<'_, V, A> {
        self.context.view(&self.root)
    }
}
