use std::collections::hash_map;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::allocator::NodeAllocator;
use crate::identifier::Identifier;
use crate::key::{Entry, KeyPart};
use crate::node::{Edges, FullNode, NodeRef};
use crate::storage::LevelStorage;
use crate::value::Value;

use super::entries_by_key_part;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateMode {
    Insert,
    Erase,
}

/// Pending change to one compressed node.
#[derive(Debug, Default)]
pub(crate) struct CompressedChange<V> {
    pub ref_count_delta: isize,
    /// The node's entry, needed when the node has to be created.
    pub entry: Option<Entry<V>>,
}

/// Entries to insert into or erase from a full node.
#[derive(Debug)]
pub(crate) struct FullEntriesUpdate<V> {
    pub entries: Vec<Entry<V>>,
    pub mode: UpdateMode,
}

/// Update requests registered against the nodes of one depth.
///
/// Requests are only collected here. Nothing is written to node storage until
/// the requests of a depth are complete and turned into an
/// [`UpdatePlan`](super::plan::UpdatePlan).
#[derive(Debug)]
pub(crate) struct UpdateRequests<V> {
    depth: usize,
    /// Creations, reference count deltas and deletions of compressed nodes.
    pub(super) compressed_changes: FxHashMap<Identifier, CompressedChange<V>>,
    /// source -> (target -> entries): updating the source yields the target.
    pub(super) full_updates: FxHashMap<Identifier, FxHashMap<Identifier, FullEntriesUpdate<V>>>,
    /// Full nodes that can be built from scratch out of the listed entries.
    pub(super) full_creations: FxHashMap<Identifier, Vec<Entry<V>>>,
    pub(super) full_deltas: FxHashMap<Identifier, isize>,
    /// Full nodes whose count is decremented at least once.
    pub(super) full_deletion_candidates: FxHashSet<Identifier>,
    /// Full nodes whose count is incremented at least once.
    pub(super) full_potentially_new: FxHashSet<Identifier>,
}

impl<V: Value> UpdateRequests<V> {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            compressed_changes: FxHashMap::default(),
            full_updates: FxHashMap::default(),
            full_creations: FxHashMap::default(),
            full_deltas: FxHashMap::default(),
            full_deletion_candidates: FxHashSet::default(),
            full_potentially_new: FxHashSet::default(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.compressed_changes.is_empty()
            && self.full_updates.is_empty()
            && self.full_creations.is_empty()
            && self.full_deltas.is_empty()
    }

    /// Requests a node holding exactly `entries`, referenced once more.
    pub fn add_node(&mut self, mut entries: Vec<Entry<V>>) -> NodeRef<V> {
        debug_assert!(!entries.is_empty());
        debug_assert!(entries.iter().all(|entry| !entry.value.is_empty()));
        if entries.len() == 1 {
            let Some(entry) = entries.pop() else {
                return NodeRef::Empty;
            };
            if self.depth == 1 {
                return NodeRef::Inline(entry.key[0], entry.value);
            }
            let id = Identifier::of_entry(&entry.key, entry.value);
            let change = self.compressed_changes.entry(id).or_default();
            change.ref_count_delta += 1;
            change.entry = Some(entry);
            return NodeRef::Compressed(id);
        }
        let id = Identifier::of(&entries);
        self.full_creations.entry(id).or_insert(entries);
        self.apply_ref_count_delta(NodeRef::Full(id), 1);
        NodeRef::Full(id)
    }

    /// Requests the insertion of `entries` into `source` and returns the
    /// (possibly future) node holding the union. The result is always full.
    ///
    /// `source_needs_decrement` releases the reference the caller held on
    /// `source`.
    pub fn insert_into_node<A: NodeAllocator>(
        &mut self,
        levels: &[LevelStorage<V, A>],
        source: NodeRef<V>,
        mut entries: Vec<Entry<V>>,
        source_needs_decrement: bool,
    ) -> NodeRef<V> {
        debug_assert!(!entries.is_empty());
        let target_id = Identifier::of(&entries).combine(source.identifier());
        let target = NodeRef::Full(target_id);
        self.apply_ref_count_delta(target, 1);
        match source {
            NodeRef::Empty => panic!("insertion into an empty node at depth {}", self.depth),
            NodeRef::Inline(key_part, value) => {
                entries.push(Entry::new(&[key_part], value));
                self.full_creations.entry(target_id).or_insert(entries);
            }
            NodeRef::Compressed(source_id) => {
                let level = &levels[self.depth - 1];
                let change = self.compressed_changes.entry(source_id).or_default();
                if source_needs_decrement {
                    change.ref_count_delta -= 1;
                }
                let entry = change
                    .entry
                    .get_or_insert_with(|| level.compressed.lookup(source_id).clone());
                entries.push(entry.clone());
                self.full_creations.entry(target_id).or_insert(entries);
            }
            NodeRef::Full(source_id) => {
                if source_needs_decrement {
                    self.apply_ref_count_delta(source, -1);
                }
                self.full_updates
                    .entry(source_id)
                    .or_default()
                    .entry(target_id)
                    .or_insert(FullEntriesUpdate {
                        entries,
                        mode: UpdateMode::Insert,
                    });
            }
        }
        target
    }

    /// Requests the removal of `entries` from `source` and returns the node
    /// that remains: empty, compressed (one entry left) or full.
    pub fn remove_from_node<A: NodeAllocator>(
        &mut self,
        levels: &[LevelStorage<V, A>],
        source: NodeRef<V>,
        mut entries: Vec<Entry<V>>,
        source_needs_decrement: bool,
    ) -> NodeRef<V> {
        debug_assert!(!entries.is_empty());
        match source {
            NodeRef::Empty => panic!("removal from an empty node at depth {}", self.depth),
            NodeRef::Inline(key_part, value) => {
                debug_assert!(entries.len() == 1 && entries[0] == Entry::new(&[key_part], value));
                NodeRef::Empty
            }
            NodeRef::Compressed(source_id) => {
                debug_assert_eq!(entries.len(), 1);
                let change = self.compressed_changes.entry(source_id).or_default();
                if source_needs_decrement {
                    change.ref_count_delta -= 1;
                }
                change.entry = entries.pop();
                NodeRef::Empty
            }
            NodeRef::Full(source_id) => {
                let depth = self.depth;
                let target_id = source_id.uncombine(Identifier::of(&entries));
                if source_needs_decrement {
                    self.apply_ref_count_delta(source, -1);
                }
                let level = &levels[depth - 1];
                let node = level.full.lookup(source_id);
                let target_size = node.size().checked_sub(entries.len()).unwrap_or_else(|| {
                    panic!(
                        "removing {} entries from full node {source_id} of size {} at depth {}",
                        entries.len(),
                        node.size(),
                        depth
                    )
                });
                match target_size {
                    0 => NodeRef::Empty,
                    1 if depth == 1 => {
                        let remaining = remaining_single_entry(levels, depth, node, &entries);
                        NodeRef::Inline(remaining.key[0], remaining.value)
                    }
                    1 => {
                        if let Some(change) = self.compressed_changes.get_mut(&target_id) {
                            change.ref_count_delta += 1;
                            if change.entry.is_none() && !level.compressed.contains(target_id) {
                                let entry = remaining_single_entry(levels, depth, node, &entries);
                                change.entry = Some(entry);
                            }
                            return NodeRef::Compressed(target_id);
                        }
                        let entry = match level.compressed.get(target_id) {
                            Some(existing) => existing.clone(),
                            None => remaining_single_entry(levels, depth, node, &entries),
                        };
                        debug_assert_eq!(Identifier::of_entry(&entry.key, entry.value), target_id);
                        self.compressed_changes.insert(
                            target_id,
                            CompressedChange {
                                ref_count_delta: 1,
                                entry: Some(entry),
                            },
                        );
                        NodeRef::Compressed(target_id)
                    }
                    _ => {
                        let target = NodeRef::Full(target_id);
                        self.apply_ref_count_delta(target, 1);
                        self.full_updates
                            .entry(source_id)
                            .or_default()
                            .entry(target_id)
                            .or_insert(FullEntriesUpdate {
                                entries,
                                mode: UpdateMode::Erase,
                            });
                        target
                    }
                }
            }
        }
    }

    /// Adds `delta` to the pending reference count change of `node`.
    pub fn apply_ref_count_delta(&mut self, node: NodeRef<V>, delta: isize) {
        if delta == 0 {
            return;
        }
        match node {
            NodeRef::Empty | NodeRef::Inline(..) => {}
            NodeRef::Compressed(id) => {
                let change = self.compressed_changes.entry(id).or_default();
                change.ref_count_delta += delta;
            }
            NodeRef::Full(id) => {
                *self.full_deltas.entry(id).or_default() += delta;
                if delta < 0 {
                    self.full_deletion_candidates.insert(id);
                } else {
                    self.full_potentially_new.insert(id);
                }
            }
        }
    }
}

/// The single entry left in `node` once `removed` is taken out.
///
/// Walks the position with the highest cardinality: there the remaining entry
/// most likely sits behind a key part no removed entry touches.
fn remaining_single_entry<V: Value, A: NodeAllocator>(
    levels: &[LevelStorage<V, A>],
    depth: usize,
    node: &FullNode<V>,
    removed: &[Entry<V>],
) -> Entry<V> {
    match find_remaining_entry(levels, depth, node, removed) {
        Some(entry) => entry,
        None => panic!("no entry remains in full node at depth {depth}"),
    }
}

fn find_remaining_entry<V: Value, A: NodeAllocator>(
    levels: &[LevelStorage<V, A>],
    depth: usize,
    node: &FullNode<V>,
    removed: &[Entry<V>],
) -> Option<Entry<V>> {
    match node.edges() {
        Edges::Values(values) => {
            let removed: FxHashSet<KeyPart> = removed.iter().map(|entry| entry.key[0]).collect();
            values
                .iter()
                .find(|(key_part, _)| !removed.contains(key_part))
                .map(|(key_part, value)| Entry::new(&[*key_part], *value))
        }
        Edges::Children(children) => {
            let pos = node.max_card_pos();
            let mut removed = entries_by_key_part(removed, pos);
            for (key_part, child) in children[pos].iter() {
                let sub_removed = match removed.entry(*key_part) {
                    hash_map::Entry::Vacant(_) => {
                        // untouched: the child holds the remaining entry
                        let entry = single_entry_of(levels, depth - 1, child)?;
                        return Some(entry.with_key_part(pos, *key_part));
                    }
                    hash_map::Entry::Occupied(occupied) => occupied.remove(),
                };
                let NodeRef::Full(child_id) = child else {
                    continue;
                };
                let child_node = levels[depth - 2].full.lookup(*child_id);
                let found = find_remaining_entry(levels, depth - 1, child_node, &sub_removed);
                if let Some(entry) = found {
                    return Some(entry.with_key_part(pos, *key_part));
                }
            }
            None
        }
    }
}

fn single_entry_of<V: Value, A: NodeAllocator>(
    levels: &[LevelStorage<V, A>],
    depth: usize,
    node: &NodeRef<V>,
) -> Option<Entry<V>> {
    match *node {
        NodeRef::Inline(key_part, value) => Some(Entry::new(&[key_part], value)),
        NodeRef::Compressed(id) => Some(levels[depth - 1].compressed.lookup(id).clone()),
        NodeRef::Empty | NodeRef::Full(_) => None,
    }
}
