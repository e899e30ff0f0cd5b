use std::collections::hash_map;

use smallvec::SmallVec;

use crate::allocator::NodeAllocator;
use crate::config::MAX_DEPTH;
use crate::key::{Entry, KeyPart, RawKey};
use crate::node::{Edges, FullNode, NodeRef, NodeView};
use crate::storage::NodeStorage;
use crate::value::Value;

enum Frame<'a, V> {
    Values(hash_map::Iter<'a, KeyPart, V>),
    Children(hash_map::Iter<'a, KeyPart, NodeRef<V>>),
}

impl<'a, V: Value> Frame<'a, V> {
    /// Full nodes are walked along position 0, which reaches every entry once.
    fn of(node: &'a FullNode<V>) -> Self {
        match node.edges() {
            Edges::Values(values) => Frame::Values(values.iter()),
            Edges::Children(children) => Frame::Children(children[0].iter()),
        }
    }
}

enum Step<V> {
    Value(KeyPart, V),
    Child(KeyPart, NodeRef<V>),
    Exhausted,
}

/// Iterator over all entries of a (sub-)hypertrie, in no particular order.
pub struct Iter<'a, V: Value, A: NodeAllocator> {
    storage: &'a NodeStorage<V, A>,
    depth: usize,
    /// Entry of a root that is not a full node.
    single: Option<Entry<V>>,
    frames: SmallVec<[Frame<'a, V>; MAX_DEPTH]>,
    /// Key parts of the frames below the root frame.
    prefix: RawKey,
}

impl<'a, V: Value, A: NodeAllocator> Iter<'a, V, A> {
    pub(crate) fn new(storage: &'a NodeStorage<V, A>, depth: usize, node: NodeView<'a, V>) -> Self {
        let mut frames = SmallVec::new();
        let mut single = None;
        match node {
            NodeView::Empty => {}
            NodeView::Full(_, full) => frames.push(Frame::of(full)),
            compressed => single = compressed.single_entry(),
        }
        Self {
            storage,
            depth,
            single,
            frames,
            prefix: RawKey::new(),
        }
    }

    fn entry(&self, tail: &[KeyPart], value: V) -> Entry<V> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(tail);
        Entry { key, value }
    }
}

impl<V: Value, A: NodeAllocator> Iterator for Iter<'_, V, A> {
    type Item = Entry<V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = match self.frames.last_mut() {
                None => return self.single.take(),
                Some(Frame::Values(values)) => match values.next() {
                    Some((key_part, value)) => Step::Value(*key_part, *value),
                    None => Step::Exhausted,
                },
                Some(Frame::Children(children)) => match children.next() {
                    Some((key_part, child)) => Step::Child(*key_part, *child),
                    None => Step::Exhausted,
                },
            };
            match step {
                Step::Exhausted => {
                    self.frames.pop();
                    self.prefix.pop();
                }
                Step::Value(key_part, value) => return Some(self.entry(&[key_part], value)),
                Step::Child(key_part, child) => {
                    let child_depth = self.depth - self.prefix.len() - 1;
                    match child {
                        NodeRef::Empty => {}
                        NodeRef::Inline(last, value) => {
                            return Some(self.entry(&[key_part, last], value));
                        }
                        NodeRef::Compressed(id) => {
                            let entry = self.storage.level(child_depth).compressed.lookup(id);
                            let mut key = self.prefix.clone();
                            key.push(key_part);
                            key.extend_from_slice(&entry.key);
                            return Some(Entry {
                                key,
                                value: entry.value,
                            });
                        }
                        NodeRef::Full(id) => {
                            let node = self.storage.level(child_depth).full.lookup(id);
                            self.prefix.push(key_part);
                            self.frames.push(Frame::of(node));
                        }
                    }
                }
            }
        }
    }
}
