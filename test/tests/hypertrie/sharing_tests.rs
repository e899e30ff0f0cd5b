use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use hypertrie::{CountingAllocator, Entry, Hypertrie, Identifier, NodeKind, NodeRef, NodeView};
use hypertrie_test::{bool_entries, context, counting_context, random_keys, seeded};
use proptest::{
    collection::{btree_set, vec},
    prelude::*,
    proptest,
};
use rand::Rng;

#[test]
fn second_key_turns_root_into_full_node() {
    let context = context::<bool>(3);
    let mut trie = Hypertrie::new(&context, 3).unwrap();
    trie.insert(bool_entries([[1, 2, 3]])).unwrap();
    trie.insert(bool_entries([[1, 4, 5]])).unwrap();

    let below_one = {
        let guard = trie.read().unwrap();
        let view = guard.view();
        assert_eq!(view.size(), 2);
        let NodeView::Full(_, root) = view.node() else {
            panic!("root with two entries must be full");
        };
        for (pos, key_part) in [(1, 2), (1, 4), (2, 3), (2, 5)] {
            let child = root.child(pos, key_part).unwrap();
            assert!(matches!(child, NodeRef::Compressed(_)), "{child:?} at position {pos}");
        }
        root.child(0, 1).unwrap()
    };

    assert_eq!(below_one.kind(), Some(NodeKind::Full));
    let guard = context.read().unwrap();
    assert_eq!(guard.storage().resolve(2, &below_one).size(), 2);
    drop(guard);
    context.verify().unwrap();
}

#[test]
fn equal_single_entries_share_one_node() {
    let context = context::<u32>(2);
    let mut first = Hypertrie::new(&context, 2).unwrap();
    let mut second = Hypertrie::new(&context, 2).unwrap();
    first.set(&[9, 9], 42).unwrap();
    second.set(&[9, 9], 42).unwrap();

    assert_eq!(first.hash(), second.hash());
    let shared = Identifier::of_entry(&[9, 9], 42u32);
    assert_eq!(first.root().node, NodeRef::Compressed(shared));
    let root = first.root().node;
    let storage_count = context.read().unwrap().storage().ref_count(2, &root);
    assert_eq!(storage_count, Some(2));
    assert_eq!(context.node_count().unwrap(), 1);
}

#[test]
fn common_sub_hypertrie_is_stored_once() {
    let context = context::<bool>(3);
    let mut first = Hypertrie::new(&context, 3).unwrap();
    let mut second = Hypertrie::new(&context, 3).unwrap();
    // both hold {(2, 3), (4, 5)} below key part 1 at position 0
    let entries = bool_entries([[1, 2, 3], [1, 4, 5], [7, 7, 7]]);
    first.insert(entries).unwrap();
    let entries = bool_entries([[1, 2, 3], [1, 4, 5], [8, 8, 8]]);
    second.insert(entries).unwrap();

    let first_child = full_child(&first, 0, 1);
    let second_child = full_child(&second, 0, 1);
    assert_eq!(first_child, second_child);
    let ref_count = context.read().unwrap().storage().ref_count(2, &first_child);
    assert_eq!(ref_count, Some(2));
    context.verify().unwrap();
}

#[test]
fn dropping_every_handle_releases_every_node() {
    let (context, allocator) = counting_context::<bool>(4);
    let mut first = Hypertrie::new(&context, 4).unwrap();
    first
        .insert(bool_entries([[1, 2, 3, 4], [1, 2, 3, 5], [2, 2, 3, 4], [6, 7, 8, 9]]))
        .unwrap();
    let mut second = first.clone();
    second.remove([[6, 7, 8, 9]]).unwrap();
    let third = second.clone();
    assert!(allocator.live_nodes() > 0);
    context.verify().unwrap();

    drop(first);
    drop(second);
    assert!(allocator.live_nodes() > 0);
    drop(third);
    assert_eq!(allocator.live_nodes(), 0);
    assert_eq!(context.node_count().unwrap(), 0);
}

#[test]
fn cloning_and_dropping_under_a_read_guard_does_not_block() {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let context = context::<bool>(3);
        let mut trie = Hypertrie::new(&context, 3).unwrap();
        let entries = bool_entries([[1, 2, 3], [1, 4, 5]]);
        trie.insert(entries).unwrap();

        let guard = trie.read().unwrap();
        let size = guard.view().size();
        let clone = trie.clone();
        drop(clone);
        let another = trie.clone();
        drop(guard);

        context.verify_handles([&trie, &another]).unwrap();
        drop(another);
        drop(trie);
        let _ = sender.send((size, context.node_count().unwrap()));
    });
    let result = receiver.recv_timeout(Duration::from_secs(5));
    assert_eq!(result, Ok((2, 0)));
}

#[test]
fn reference_counts_stay_exact_under_random_handles() {
    let (context, allocator) = counting_context::<bool>(4);
    let mut rng = seeded(11);
    let mut handles: Vec<Hypertrie<bool, CountingAllocator>> = Vec::new();
    for round in 0..300 {
        match rng.gen_range(0..4) {
            0 => {
                let depth = rng.gen_range(1..=4);
                let mut trie = Hypertrie::new(&context, depth).unwrap();
                let keys = random_keys(&mut rng, 8, depth, 4);
                trie.insert(bool_entries(&keys)).unwrap();
                handles.push(trie);
            }
            1 if !handles.is_empty() => {
                let index = rng.gen_range(0..handles.len());
                let clone = handles[index].clone();
                handles.push(clone);
            }
            2 if !handles.is_empty() => {
                let index = rng.gen_range(0..handles.len());
                let depth = handles[index].depth();
                let keys = random_keys(&mut rng, 3, depth, 4);
                handles[index].remove(&keys).unwrap();
            }
            _ if !handles.is_empty() => {
                let index = rng.gen_range(0..handles.len());
                handles.swap_remove(index);
            }
            _ => {}
        }
        context
            .verify_handles(&handles)
            .unwrap_or_else(|err| panic!("round {round}: {err}"));
    }

    handles.clear();
    assert_eq!(context.node_count().unwrap(), 0);
    assert_eq!(allocator.live_nodes(), 0);
}

fn full_child(trie: &Hypertrie, pos: usize, key_part: u64) -> NodeRef<bool> {
    let guard = trie.read().unwrap();
    let NodeView::Full(_, root) = guard.view().node().clone() else {
        panic!("root must be full");
    };
    root.child(pos, key_part).unwrap()
}

proptest! {
    #[test]
    fn proptest_identifier_ignores_insertion_order(keys in btree_set(vec(0u64..50, 3), 1..60)) {
        let entries: Vec<Entry<bool>> = bool_entries(keys.iter());
        let mut reversed = entries.clone();
        reversed.reverse();
        prop_assert_eq!(Identifier::of(&entries), Identifier::of(&reversed));

        let context = context::<bool>(3);
        let mut at_once = Hypertrie::new(&context, 3).unwrap();
        at_once.insert(entries.clone()).unwrap();
        let mut one_by_one = Hypertrie::new(&context, 3).unwrap();
        for entry in reversed {
            one_by_one.insert(vec![entry]).unwrap();
        }
        prop_assert_eq!(at_once.hash(), Identifier::of(&entries));
        prop_assert_eq!(&at_once, &one_by_one);
        prop_assert!(context.verify().is_ok());
    }

    #[test]
    fn proptest_add_then_remove_restores_identifier(
        keys in btree_set(vec(any::<u64>(), 2), 0..20),
        key in vec(any::<u64>(), 2),
        value in 1u32..,
    ) {
        let entries: Vec<_> = keys.iter().map(|key| Entry::new(key, value)).collect();
        let base = Identifier::of(&entries);
        prop_assert_eq!(base.add(&key, value).remove(&key, value), base);
    }
}
