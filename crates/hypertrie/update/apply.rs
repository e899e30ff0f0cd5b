use std::cmp::Ordering;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::allocator::NodeAllocator;
use crate::identifier::Identifier;
use crate::key::Entry;
use crate::node::{Edges, FullNode};
use crate::storage::LevelStorage;
use crate::value::Value;

use super::entries_by_key_part;
use super::plan::{FullNodeUpdate, UpdatePlan};
use super::requests::{CompressedChange, UpdateMode, UpdateRequests};

/// How the full node being filled came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Built from scratch, every edge is new.
    Created,
    /// Clone of a source that keeps its own references to the children.
    Copied,
    /// The source itself, its references to the children are taken over.
    Moved,
}

/// Applies `requests` to `levels[..requests.depth()]`, one depth at a time
/// from the top down. Applying a depth only registers requests for the depth
/// below.
pub(crate) fn apply_update<V: Value, A: NodeAllocator>(
    levels: &mut [LevelStorage<V, A>],
    requests: UpdateRequests<V>,
) {
    let mut requests = requests;
    loop {
        let depth = requests.depth();
        let (lower, upper) = levels.split_at_mut(depth - 1);
        let plan = UpdatePlan::new(requests, &upper[0]);
        let mut update = LevelUpdate {
            depth,
            level: &mut upper[0],
            lower,
            child_requests: UpdateRequests::new(depth - 1),
            done: FxHashSet::default(),
        };
        update.execute(plan);
        if depth == 1 {
            debug_assert!(update.child_requests.is_empty());
            return;
        }
        requests = update.child_requests;
    }
}

struct LevelUpdate<'s, V: Value, A: NodeAllocator> {
    depth: usize,
    level: &'s mut LevelStorage<V, A>,
    /// Storage of the depths below, read while requests for them are collected.
    lower: &'s [LevelStorage<V, A>],
    child_requests: UpdateRequests<V>,
    /// Full nodes whose reference count is final.
    done: FxHashSet<Identifier>,
}

impl<V: Value, A: NodeAllocator> LevelUpdate<'_, V, A> {
    fn execute(&mut self, plan: UpdatePlan<V>) {
        let UpdatePlan {
            create,
            copy,
            moves,
            delete,
            deltas,
            compressed_changes,
        } = plan;
        debug!(
            depth = self.depth,
            created = create.len(),
            copied = copy.len(),
            moved = moves.len(),
            deleted = delete.len(),
            compressed = compressed_changes.len(),
            "applying node updates"
        );

        for (id, entries) in create {
            let ref_count = final_ref_count(&deltas, id, self.depth);
            let mut node = FullNode::new(self.depth);
            self.insert_entries(&mut node, entries, Origin::Created);
            self.level.full.insert(id, node, ref_count);
            self.done.insert(id);
        }

        for update in copy {
            let mut node = self.level.full.lookup(update.source).clone();
            self.fill(&mut node, update.entries, update.mode, Origin::Copied);
            let ref_count = final_ref_count(&deltas, update.target, self.depth);
            self.level.full.insert(update.target, node, ref_count);
            self.done.insert(update.target);
        }

        for FullNodeUpdate {
            source,
            target,
            entries,
            mode,
        } in moves
        {
            trace!(depth = self.depth, %source, %target, "reusing full node");
            let mut node = self.level.full.detach(source);
            self.fill(&mut *node, entries, mode, Origin::Moved);
            let ref_count = final_ref_count(&deltas, target, self.depth);
            self.level.full.attach(target, node, ref_count);
            self.done.insert(source);
            self.done.insert(target);
        }

        for id in delete {
            let node = self.level.full.remove(id);
            if let Edges::Children(children) = node.edges() {
                for child in children.iter().flat_map(|edges| edges.values()) {
                    self.child_requests.apply_ref_count_delta(*child, -1);
                }
            }
            self.done.insert(id);
        }

        for (id, delta) in deltas {
            if self.done.contains(&id) {
                continue;
            }
            if self.level.full.adjust(id, delta).is_some() {
                panic!(
                    "full node {id} at depth {} lost its last reference outside of a deletion",
                    self.depth
                );
            }
        }

        for (id, change) in compressed_changes {
            self.apply_compressed_change(id, change);
        }
    }

    fn fill(
        &mut self,
        node: &mut FullNode<V>,
        entries: Vec<Entry<V>>,
        mode: UpdateMode,
        origin: Origin,
    ) {
        match mode {
            UpdateMode::Insert => self.insert_entries(node, entries, origin),
            UpdateMode::Erase => self.erase_entries(node, entries, origin),
        }
    }

    fn insert_entries(&mut self, node: &mut FullNode<V>, entries: Vec<Entry<V>>, origin: Origin) {
        let added = entries.len();
        match node.edges_mut() {
            Edges::Values(values) => {
                for entry in entries {
                    let previous = values.insert(entry.key[0], entry.value);
                    debug_assert!(previous.is_none(), "key part {} inserted twice", entry.key[0]);
                }
            }
            Edges::Children(children) => {
                for (pos, edges) in children.iter_mut().enumerate() {
                    let inserted = entries_by_key_part(&entries, pos);
                    if origin == Origin::Copied {
                        for (key_part, child) in edges.iter() {
                            if !inserted.contains_key(key_part) {
                                self.child_requests.apply_ref_count_delta(*child, 1);
                            }
                        }
                    }
                    for (key_part, sub_entries) in inserted {
                        let existing = match origin {
                            Origin::Created => None,
                            Origin::Copied | Origin::Moved => edges.get(&key_part).copied(),
                        };
                        let child = match existing {
                            Some(child) => self.child_requests.insert_into_node(
                                self.lower,
                                child,
                                sub_entries,
                                origin == Origin::Moved,
                            ),
                            None => self.child_requests.add_node(sub_entries),
                        };
                        edges.insert(key_part, child);
                    }
                }
                node.grow(added);
            }
        }
    }

    fn erase_entries(&mut self, node: &mut FullNode<V>, entries: Vec<Entry<V>>, origin: Origin) {
        debug_assert_ne!(origin, Origin::Created);
        let count = entries.len();
        match node.edges_mut() {
            Edges::Values(values) => {
                for entry in &entries {
                    let previous = values.remove(&entry.key[0]);
                    debug_assert!(previous.is_some(), "key part {} is not stored", entry.key[0]);
                }
            }
            Edges::Children(children) => {
                for (pos, edges) in children.iter_mut().enumerate() {
                    let mut erased = entries_by_key_part(&entries, pos);
                    let lower = self.lower;
                    if origin == Origin::Copied {
                        let requests = &mut self.child_requests;
                        edges.retain(|key_part, child| match erased.remove(key_part) {
                            Some(removed) => {
                                *child = requests.remove_from_node(lower, *child, removed, false);
                                !child.is_empty()
                            }
                            None => {
                                requests.apply_ref_count_delta(*child, 1);
                                true
                            }
                        });
                        debug_assert!(
                            erased.is_empty(),
                            "erasing key parts missing at position {pos}"
                        );
                        continue;
                    }
                    for (key_part, removed) in erased {
                        let Some(child) = edges.get(&key_part).copied() else {
                            panic!(
                                "erasing key part {key_part} missing at position {pos} of depth {}",
                                self.depth
                            );
                        };
                        let requests = &mut self.child_requests;
                        let child = requests.remove_from_node(lower, child, removed, true);
                        if child.is_empty() {
                            edges.remove(&key_part);
                        } else {
                            edges.insert(key_part, child);
                        }
                    }
                }
                node.shrink(count);
            }
        }
        assert!(
            node.size() > 1,
            "full node at depth {} shrank to {} entries",
            self.depth,
            node.size()
        );
    }

    fn apply_compressed_change(&mut self, id: Identifier, change: CompressedChange<V>) {
        let delta = change.ref_count_delta;
        match delta.cmp(&0) {
            Ordering::Less => {
                self.level.compressed.release(id, delta.unsigned_abs());
                return;
            }
            Ordering::Equal => return,
            Ordering::Greater => {}
        }
        let depth = self.depth;
        self.level
            .compressed
            .acquire(id, delta.unsigned_abs(), || match change.entry {
                Some(entry) => {
                    debug_assert_eq!(Identifier::of_entry(&entry.key, entry.value), id);
                    entry
                }
                None => panic!(
                    "compressed node {id} at depth {depth} is absent and cannot be created"
                ),
            });
    }
}

fn final_ref_count(deltas: &FxHashMap<Identifier, isize>, id: Identifier, depth: usize) -> usize {
    match deltas.get(&id) {
        Some(&delta) if delta > 0 => delta.unsigned_abs(),
        _ => panic!("new full node {id} at depth {depth} has no references"),
    }
}
