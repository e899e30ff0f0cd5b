//! Hash diagonals: iteration over the key parts that occur at a set of
//! positions simultaneously, the building block of worst-case optimal joins.

mod dispatch;

use std::fmt;

use crate::allocator::NodeAllocator;
use crate::key::{KeyPart, KeyPositions};
use crate::node::{NodeKind, NodeView};
use crate::storage::NodeStorage;
use crate::value::Value;
use crate::view::{HypertrieRef, SliceResult};

use dispatch::{DiagonalMethods, DiagonalState, DiagonalValue, methods};

/// Iterates every key part `k` for which fixing all diagonal positions to `k`
/// selects at least one entry.
///
/// The diagonal starts unpositioned: call [`HashDiagonal::begin`] before
/// reading the current key part, or drive it as an [`Iterator`]. Key parts
/// come in no particular order, each at most once.
pub struct HashDiagonal<'a, V: Value, A: NodeAllocator> {
    storage: &'a NodeStorage<V, A>,
    methods: &'static DiagonalMethods<V, A>,
    state: DiagonalState<'a, V>,
    started: bool,
}

impl<'a, V: Value, A: NodeAllocator> HashDiagonal<'a, V, A> {
    pub(crate) fn new(
        storage: &'a NodeStorage<V, A>,
        depth: usize,
        node: NodeView<'a, V>,
        positions: KeyPositions,
    ) -> Self {
        let kind = node.kind().unwrap_or(NodeKind::Compressed);
        let methods = methods::<V, A>(depth, positions.count(), kind);
        let state = (methods.construct)(node, positions);
        Self {
            storage,
            methods,
            state,
            started: false,
        }
    }

    /// Positions the diagonal on its first key part, if there is one.
    pub fn begin(&mut self) {
        self.started = true;
        (self.methods.begin)(&mut self.state, self.storage);
    }

    /// Moves to the next key part. Advancing an ended diagonal panics.
    pub fn advance(&mut self) {
        (self.methods.advance)(&mut self.state, self.storage);
    }

    /// Positions the diagonal on `key_part` if it lies on the diagonal and
    /// reports whether it does. The iteration cursor is not moved.
    pub fn probe(&mut self, key_part: KeyPart) -> bool {
        (self.methods.probe)(&mut self.state, self.storage, key_part)
    }

    pub fn ended(&self) -> bool {
        (self.methods.ended)(&self.state)
    }

    /// Upper bound for the number of key parts on the diagonal.
    pub fn size(&self) -> usize {
        (self.methods.size)(&self.state)
    }

    /// Depth of the current result: 0 when every position is on the diagonal.
    pub fn result_depth(&self) -> usize {
        self.methods.result_depth
    }

    pub fn current_key_part(&self) -> KeyPart {
        (self.methods.current_key_part)(&self.state)
    }

    /// The value for the current key part when the result depth is 0.
    pub fn current_value(&self) -> V {
        match (self.methods.current_value)(&self.state) {
            DiagonalValue::Value(value) => *value,
            DiagonalValue::None | DiagonalValue::Node(_) => V::default(),
        }
    }

    /// The current result: a value at result depth 0, otherwise the
    /// sub-hypertrie over the positions off the diagonal.
    pub fn current(&self) -> SliceResult<'a, V, A> {
        match (self.methods.current_value)(&self.state) {
            DiagonalValue::Value(value) => SliceResult::Value(*value),
            DiagonalValue::Node(node) => SliceResult::Trie(HypertrieRef::new(
                self.storage,
                self.methods.result_depth,
                node.clone(),
            )),
            DiagonalValue::None => SliceResult::Trie(HypertrieRef::new(
                self.storage,
                self.methods.result_depth,
                NodeView::Empty,
            )),
        }
    }
}

impl<'a, V: Value, A: NodeAllocator> Iterator for HashDiagonal<'a, V, A> {
    type Item = (KeyPart, SliceResult<'a, V, A>);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.begin();
        } else if !self.ended() {
            self.advance();
        }
        if self.ended() {
            return None;
        }
        Some((self.current_key_part(), self.current()))
    }
}

impl<V: Value, A: NodeAllocator> fmt::Debug for HashDiagonal<'_, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashDiagonal")
            .field("positions", &self.state.positions)
            .field("result_depth", &self.methods.result_depth)
            .field("ended", &self.state.ended)
            .finish()
    }
}
