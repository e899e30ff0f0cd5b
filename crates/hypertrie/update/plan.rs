use rustc_hash::{FxHashMap, FxHashSet};

use crate::allocator::NodeAllocator;
use crate::identifier::Identifier;
use crate::key::Entry;
use crate::storage::LevelStorage;
use crate::value::Value;

use super::requests::{CompressedChange, UpdateMode, UpdateRequests};

/// Turns a full node into another one by inserting or erasing entries.
#[derive(Debug)]
pub(crate) struct FullNodeUpdate<V> {
    pub source: Identifier,
    pub target: Identifier,
    pub entries: Vec<Entry<V>>,
    pub mode: UpdateMode,
}

/// What has to happen to the nodes of one depth, derived from the collected
/// [`UpdateRequests`] and the current node storage.
#[derive(Debug)]
pub(crate) struct UpdatePlan<V> {
    pub create: Vec<(Identifier, Vec<Entry<V>>)>,
    /// Targets built from a clone of a source that lives on.
    pub copy: Vec<FullNodeUpdate<V>>,
    /// Targets built in place from a source that would be deleted anyway.
    pub moves: Vec<FullNodeUpdate<V>>,
    pub delete: Vec<Identifier>,
    /// Net reference count changes of full nodes, none of them zero.
    pub deltas: FxHashMap<Identifier, isize>,
    pub compressed_changes: FxHashMap<Identifier, CompressedChange<V>>,
}

impl<V: Value> UpdatePlan<V> {
    pub fn new<A: NodeAllocator>(requests: UpdateRequests<V>, level: &LevelStorage<V, A>) -> Self {
        let depth = requests.depth();
        let UpdateRequests {
            compressed_changes,
            full_updates,
            mut full_creations,
            full_deltas: mut deltas,
            full_deletion_candidates,
            full_potentially_new,
            ..
        } = requests;

        let mut to_be_created: FxHashSet<Identifier> = full_potentially_new
            .into_iter()
            .filter(|id| !level.full.contains(*id))
            .collect();

        let mut delete = FxHashSet::default();
        for id in full_deletion_candidates {
            let Some(&delta) = deltas.get(&id) else {
                continue;
            };
            if delta == 0 {
                deltas.remove(&id);
                continue;
            }
            let Some(ref_count) = level.full.ref_count(id) else {
                panic!("reference count change {delta} for absent full node {id} at depth {depth}");
            };
            match ref_count.checked_add_signed(delta) {
                Some(0) => {
                    delete.insert(id);
                    deltas.remove(&id);
                }
                Some(_) => {}
                None => panic!("negative reference count for full node {id} at depth {depth}"),
            }
        }

        // A source that is deleted anyway hands its allocation to exactly one
        // of its targets. Every other target starts from a copy.
        let mut copy = Vec::new();
        let mut moves = Vec::new();
        for (source, targets) in full_updates {
            let mut movable = delete.contains(&source);
            for (target, update) in targets {
                if !to_be_created.remove(&target) {
                    continue;
                }
                let update = FullNodeUpdate {
                    source,
                    target,
                    entries: update.entries,
                    mode: update.mode,
                };
                if movable {
                    delete.remove(&source);
                    moves.push(update);
                    movable = false;
                } else {
                    copy.push(update);
                }
            }
        }

        let create = to_be_created
            .into_iter()
            .map(|id| match full_creations.remove(&id) {
                Some(entries) => (id, entries),
                None => panic!("full node {id} at depth {depth} has no way to be created"),
            })
            .collect();

        let compressed_changes = compressed_changes
            .into_iter()
            .filter(|(_, change)| change.ref_count_delta != 0)
            .collect();

        Self {
            create,
            copy,
            moves,
            delete: delete.into_iter().collect(),
            deltas,
            compressed_changes,
        }
    }
}
