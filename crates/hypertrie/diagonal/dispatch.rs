use std::collections::hash_map;

use crate::allocator::NodeAllocator;
use crate::key::{Entry, KeyPart, KeyPositions};
use crate::node::{Edges, NodeKind, NodeRef, NodeView};
use crate::storage::NodeStorage;
use crate::value::Value;

/// What a diagonal yields for one key part.
#[derive(Debug, Clone)]
pub(crate) enum DiagonalValue<'a, V: Value> {
    None,
    /// Every position was on the diagonal.
    Value(V),
    /// The sub-hypertrie over the positions off the diagonal.
    Node(NodeView<'a, V>),
}

pub(crate) enum EdgeCursor<'a, V> {
    Idle,
    Values(hash_map::Iter<'a, KeyPart, V>),
    Children {
        pos: usize,
        edges: hash_map::Iter<'a, KeyPart, NodeRef<V>>,
    },
}

/// Mutable state of a diagonal, driven through a [`DiagonalMethods`] table.
pub(crate) struct DiagonalState<'a, V: Value> {
    pub node: NodeView<'a, V>,
    pub positions: KeyPositions,
    pub cursor: EdgeCursor<'a, V>,
    pub current_key_part: KeyPart,
    pub current: DiagonalValue<'a, V>,
    pub ended: bool,
}

impl<'a, V: Value> DiagonalState<'a, V> {
    fn set_current(&mut self, key_part: KeyPart, value: DiagonalValue<'a, V>) {
        self.current_key_part = key_part;
        self.current = value;
    }

    fn finish(&mut self) {
        self.cursor = EdgeCursor::Idle;
        self.current = DiagonalValue::None;
        self.ended = true;
    }
}

/// Operations of a diagonal, specialised for one node depth, one number of
/// diagonal positions and one node kind.
pub(crate) struct DiagonalMethods<V: Value, A: NodeAllocator> {
    pub construct: for<'a> fn(NodeView<'a, V>, KeyPositions) -> DiagonalState<'a, V>,
    pub begin: for<'a> fn(&mut DiagonalState<'a, V>, &'a NodeStorage<V, A>),
    pub advance: for<'a> fn(&mut DiagonalState<'a, V>, &'a NodeStorage<V, A>),
    pub probe: for<'a> fn(&mut DiagonalState<'a, V>, &'a NodeStorage<V, A>, KeyPart) -> bool,
    pub size: fn(&DiagonalState<'_, V>) -> usize,
    pub ended: fn(&DiagonalState<'_, V>) -> bool,
    pub current_key_part: fn(&DiagonalState<'_, V>) -> KeyPart,
    pub current_value: for<'s, 'a> fn(&'s DiagonalState<'a, V>) -> &'s DiagonalValue<'a, V>,
    /// Depth of the values yielded: node depth minus diagonal positions.
    pub result_depth: usize,
}

impl<V: Value, A: NodeAllocator> DiagonalMethods<V, A> {
    const fn full<const DEPTH: usize, const DIAG_DEPTH: usize>() -> Self {
        Self {
            construct: construct::<V, DEPTH, DIAG_DEPTH>,
            begin: full_begin::<V, A, DEPTH, DIAG_DEPTH>,
            advance: full_advance::<V, A, DEPTH, DIAG_DEPTH>,
            probe: probe::<V, A, DEPTH>,
            size: full_size::<V>,
            ended: ended::<V>,
            current_key_part: current_key_part::<V>,
            current_value: current_value::<V>,
            result_depth: DEPTH - DIAG_DEPTH,
        }
    }

    const fn compressed<const DEPTH: usize, const DIAG_DEPTH: usize>() -> Self {
        Self {
            construct: construct::<V, DEPTH, DIAG_DEPTH>,
            begin: compressed_begin::<V, A>,
            advance: compressed_advance::<V, A>,
            probe: probe::<V, A, DEPTH>,
            size: compressed_size::<V>,
            ended: ended::<V>,
            current_key_part: current_key_part::<V>,
            current_value: current_value::<V>,
            result_depth: DEPTH - DIAG_DEPTH,
        }
    }
}

/// The method table for a node of `depth` and `kind` with `diag_depth`
/// diagonal positions. Empty nodes use the compressed table.
pub(crate) fn methods<V: Value, A: NodeAllocator>(
    depth: usize,
    diag_depth: usize,
    kind: NodeKind,
) -> &'static DiagonalMethods<V, A> {
    macro_rules! table {
        ($(($depth:literal, $diag_depth:literal)),* $(,)?) => {
            match (depth, diag_depth, kind) {
                $(
                    ($depth, $diag_depth, NodeKind::Full) => {
                        const { &DiagonalMethods::<V, A>::full::<$depth, $diag_depth>() }
                    }
                    ($depth, $diag_depth, NodeKind::Compressed) => {
                        const { &DiagonalMethods::<V, A>::compressed::<$depth, $diag_depth>() }
                    }
                )*
                _ => panic!("no diagonal for depth {depth} with {diag_depth} diagonal positions"),
            }
        };
    }
    table!(
        (1, 1),
        (2, 1),
        (2, 2),
        (3, 1),
        (3, 2),
        (3, 3),
        (4, 1),
        (4, 2),
        (4, 3),
        (4, 4),
        (5, 1),
        (5, 2),
        (5, 3),
        (5, 4),
        (5, 5),
    )
}

fn construct<'a, V: Value, const DEPTH: usize, const DIAG_DEPTH: usize>(
    node: NodeView<'a, V>,
    positions: KeyPositions,
) -> DiagonalState<'a, V> {
    debug_assert_eq!(positions.count(), DIAG_DEPTH);
    debug_assert!(positions.iter().all(|pos| pos < DEPTH));
    DiagonalState {
        node,
        positions,
        cursor: EdgeCursor::Idle,
        current_key_part: 0,
        current: DiagonalValue::None,
        ended: true,
    }
}

fn ended<V: Value>(state: &DiagonalState<'_, V>) -> bool {
    state.ended
}

fn current_key_part<V: Value>(state: &DiagonalState<'_, V>) -> KeyPart {
    state.current_key_part
}

fn current_value<'s, 'a, V: Value>(state: &'s DiagonalState<'a, V>) -> &'s DiagonalValue<'a, V> {
    &state.current
}

fn full_begin<'a, V: Value, A: NodeAllocator, const DEPTH: usize, const DIAG_DEPTH: usize>(
    state: &mut DiagonalState<'a, V>,
    storage: &'a NodeStorage<V, A>,
) {
    let NodeView::Full(_, node) = state.node else {
        state.finish();
        return;
    };
    state.cursor = match node.edges() {
        Edges::Values(values) => EdgeCursor::Values(values.iter()),
        Edges::Children(children) => {
            let pos = node.min_card_pos_in(state.positions);
            EdgeCursor::Children {
                pos,
                edges: children[pos].iter(),
            }
        }
    };
    state.ended = false;
    forward::<V, A, DEPTH, DIAG_DEPTH>(state, storage);
}

fn full_advance<'a, V: Value, A: NodeAllocator, const DEPTH: usize, const DIAG_DEPTH: usize>(
    state: &mut DiagonalState<'a, V>,
    storage: &'a NodeStorage<V, A>,
) {
    assert!(!state.ended, "advancing an exhausted diagonal");
    forward::<V, A, DEPTH, DIAG_DEPTH>(state, storage);
}

/// Moves the cursor to the next key part that lies on the diagonal.
fn forward<'a, V: Value, A: NodeAllocator, const DEPTH: usize, const DIAG_DEPTH: usize>(
    state: &mut DiagonalState<'a, V>,
    storage: &'a NodeStorage<V, A>,
) {
    loop {
        match &mut state.cursor {
            EdgeCursor::Idle => break,
            EdgeCursor::Values(values) => {
                let Some((key_part, value)) = values.next() else {
                    break;
                };
                state.current_key_part = *key_part;
                state.current = DiagonalValue::Value(*value);
                return;
            }
            EdgeCursor::Children { pos, edges } => {
                let Some((key_part, child)) = edges.next() else {
                    break;
                };
                let child_view = storage.resolve(DEPTH - 1, child);
                let result = if DIAG_DEPTH == 1 {
                    Some(DiagonalValue::Node(child_view))
                } else {
                    let remaining = state.positions.without(*pos);
                    diagonal_slice(storage, DEPTH - 1, child_view, remaining, *key_part)
                };
                if let Some(result) = result {
                    let key_part = *key_part;
                    state.set_current(key_part, result);
                    return;
                }
            }
        }
    }
    state.finish();
}

fn full_size<V: Value>(state: &DiagonalState<'_, V>) -> usize {
    match &state.node {
        NodeView::Full(_, node) => node.cardinality(node.min_card_pos_in(state.positions)),
        _ => 0,
    }
}

fn compressed_begin<'a, V: Value, A: NodeAllocator>(
    state: &mut DiagonalState<'a, V>,
    _storage: &'a NodeStorage<V, A>,
) {
    let Some(entry) = state.node.single_entry() else {
        state.finish();
        return;
    };
    match state.positions.common_key_part(&entry.key) {
        Some(key_part) => {
            let value = project(entry, state.positions);
            state.set_current(key_part, value);
            state.ended = false;
        }
        None => state.finish(),
    }
}

fn compressed_advance<'a, V: Value, A: NodeAllocator>(
    state: &mut DiagonalState<'a, V>,
    _storage: &'a NodeStorage<V, A>,
) {
    assert!(!state.ended, "advancing an exhausted diagonal");
    state.finish();
}

fn compressed_size<V: Value>(state: &DiagonalState<'_, V>) -> usize {
    state
        .node
        .single_entry()
        .and_then(|entry| state.positions.common_key_part(&entry.key))
        .map_or(0, |_| 1)
}

fn probe<'a, V: Value, A: NodeAllocator, const DEPTH: usize>(
    state: &mut DiagonalState<'a, V>,
    storage: &'a NodeStorage<V, A>,
    key_part: KeyPart,
) -> bool {
    let node = state.node.clone();
    match diagonal_slice(storage, DEPTH, node, state.positions, key_part) {
        Some(value) => {
            state.set_current(key_part, value);
            true
        }
        None => false,
    }
}

fn project<'a, V: Value>(entry: Entry<V>, positions: KeyPositions) -> DiagonalValue<'a, V> {
    let key = positions.project_out(&entry.key);
    if key.is_empty() {
        DiagonalValue::Value(entry.value)
    } else {
        DiagonalValue::Node(NodeView::from_entry(Entry {
            key,
            value: entry.value,
        }))
    }
}

/// Fixes all `positions` of `node` to `key_part`. `None` when nothing is
/// stored there.
pub(crate) fn diagonal_slice<'a, V: Value, A: NodeAllocator>(
    storage: &'a NodeStorage<V, A>,
    depth: usize,
    node: NodeView<'a, V>,
    positions: KeyPositions,
    key_part: KeyPart,
) -> Option<DiagonalValue<'a, V>> {
    let mut depth = depth;
    let mut node = node;
    let mut positions = positions;
    loop {
        match node {
            NodeView::Empty => return None,
            NodeView::Inline(..) | NodeView::Compressed(_) => {
                let entry = node.single_entry()?;
                return positions
                    .iter()
                    .all(|pos| entry.key[pos] == key_part)
                    .then(|| project(entry, positions));
            }
            NodeView::Full(_, full) => {
                if depth == 1 {
                    return full.value(key_part).map(DiagonalValue::Value);
                }
                let pos = full.min_card_pos_in(positions);
                let child = full.child(pos, key_part)?;
                let child_view = storage.resolve(depth - 1, &child);
                positions = positions.without(pos);
                depth -= 1;
                if positions.is_empty() {
                    return Some(DiagonalValue::Node(child_view));
                }
                node = child_view;
            }
        }
    }
}
