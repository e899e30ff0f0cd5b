//! Batched updates of hash-consed node storage.
//!
//! A batch is turned into [`UpdateRequests`](requests::UpdateRequests) for the
//! depth of the root. Applying the requests of a depth creates, rewrites or
//! deletes the full nodes of that depth and registers requests for the depth
//! below, so every depth is visited exactly once, top-down.

mod apply;
mod plan;
mod requests;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::allocator::NodeAllocator;
use crate::key::{Entry, KeyPart};
use crate::node::NodeContainer;
use crate::storage::NodeStorage;
use crate::value::Value;

use apply::apply_update;
use requests::UpdateRequests;

/// Groups `entries` by their key part at `pos`, dropping that position.
pub(crate) fn entries_by_key_part<V: Value>(
    entries: &[Entry<V>],
    pos: usize,
) -> FxHashMap<KeyPart, Vec<Entry<V>>> {
    let mut groups: FxHashMap<KeyPart, Vec<Entry<V>>> = FxHashMap::default();
    for entry in entries {
        groups
            .entry(entry.key[pos])
            .or_default()
            .push(entry.subentry(pos));
    }
    groups
}

/// Inserts `entries` into the hypertrie rooted at `container`.
///
/// The keys must be pairwise distinct and absent, the values non-empty.
pub(crate) fn insert_entries<V: Value, A: NodeAllocator>(
    storage: &mut NodeStorage<V, A>,
    container: &mut NodeContainer<V>,
    entries: Vec<Entry<V>>,
) {
    if entries.is_empty() {
        return;
    }
    trace!(
        depth = container.depth,
        count = entries.len(),
        "inserting entries"
    );
    let mut requests = UpdateRequests::new(container.depth);
    let root = if container.node.is_empty() {
        requests.add_node(entries)
    } else {
        requests.insert_into_node(storage.levels(), container.node, entries, true)
    };
    apply_update(storage.levels_mut(), requests);
    container.node = root;
}

/// Erases `entries` from the hypertrie rooted at `container`.
///
/// Every entry must be stored with exactly the given value.
pub(crate) fn erase_entries<V: Value, A: NodeAllocator>(
    storage: &mut NodeStorage<V, A>,
    container: &mut NodeContainer<V>,
    entries: Vec<Entry<V>>,
) {
    if entries.is_empty() {
        return;
    }
    trace!(
        depth = container.depth,
        count = entries.len(),
        "erasing entries"
    );
    let mut requests = UpdateRequests::new(container.depth);
    let root = requests.remove_from_node(storage.levels(), container.node, entries, true);
    apply_update(storage.levels_mut(), requests);
    container.node = root;
}

/// Changes the reference count of the root of `container` by `delta`,
/// deleting whatever becomes unreachable.
pub(crate) fn adjust_root_references<V: Value, A: NodeAllocator>(
    storage: &mut NodeStorage<V, A>,
    container: &NodeContainer<V>,
    delta: isize,
) {
    if !container.node.is_stored() {
        return;
    }
    let mut requests = UpdateRequests::new(container.depth);
    requests.apply_ref_count_delta(container.node, delta);
    apply_update(storage.levels_mut(), requests);
}
