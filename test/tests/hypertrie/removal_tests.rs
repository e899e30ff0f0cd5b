use hypertrie::{Entry, Hypertrie, Identifier, NodeRef, UpdateSummary};
use hypertrie_test::{bool_entries, content, context, counting_context, random_keys, seeded};

#[test]
fn removing_the_only_entry_empties_storage() {
    let context = context::<bool>(3);
    let mut trie = Hypertrie::new(&context, 3).unwrap();
    trie.insert(bool_entries([[1, 2, 3]])).unwrap();
    assert_eq!(context.node_count().unwrap(), 1);

    let summary = trie.remove([[1, 2, 3]]).unwrap();
    let expected = UpdateSummary {
        removed: 1,
        ..Default::default()
    };
    assert_eq!(summary, expected);
    assert_eq!(trie.root().node, NodeRef::Empty);
    assert_eq!(trie.hash(), Identifier::EMPTY);
    assert_eq!(context.node_count().unwrap(), 0);
    for depth in 1..=3 {
        let guard = context.read().unwrap();
        let level = guard.storage().level(depth);
        assert!(level.full.is_empty() && level.compressed.is_empty(), "residue at depth {depth}");
    }
}

#[test]
fn removing_absent_keys_changes_nothing() {
    let context = context::<bool>(2);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    trie.insert(bool_entries([[1, 1], [2, 2]])).unwrap();
    let before = trie.hash();

    let summary = trie.remove([[1, 2], [3, 3]]).unwrap();
    assert!(summary.is_noop());
    assert_eq!(trie.hash(), before);
    assert_eq!(trie.size().unwrap(), 2);
}

#[test]
fn full_root_demotes_to_compressed_on_removal() {
    let context = context::<bool>(3);
    let mut trie = Hypertrie::new(&context, 3).unwrap();
    trie.insert(bool_entries([[1, 2, 3], [1, 4, 5]])).unwrap();
    assert!(matches!(trie.root().node, NodeRef::Full(_)));

    trie.remove([[1, 4, 5]]).unwrap();
    let remaining = Identifier::of_entry(&[1, 2, 3], true);
    assert_eq!(trie.root().node, NodeRef::Compressed(remaining));
    assert!(trie.contains(&[1, 2, 3]).unwrap());
    assert!(!trie.contains(&[1, 4, 5]).unwrap());
    assert_eq!(context.node_count().unwrap(), 1);
    context.verify().unwrap();
}

#[test]
fn depth_one_root_demotes_to_inline() {
    let context = context::<u8>(1);
    let mut trie = Hypertrie::new(&context, 1).unwrap();
    let entries = vec![Entry::new(&[4], 1), Entry::new(&[5], 2)];
    trie.insert(entries).unwrap();
    trie.remove([[5]]).unwrap();
    assert_eq!(trie.root().node, NodeRef::Inline(4, 1));
    assert_eq!(context.node_count().unwrap(), 0);
}

#[test]
fn changing_a_value_rehashes_the_root() {
    let context = context::<u32>(2);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    let entries = vec![Entry::new(&[1, 1], 10), Entry::new(&[2, 2], 20)];
    trie.insert(entries).unwrap();
    let before = trie.hash();

    let summary = trie.update(vec![Entry::new(&[1, 1], 11)]).unwrap();
    let expected = UpdateSummary {
        changed: 1,
        ..Default::default()
    };
    assert_eq!(summary, expected);
    assert_eq!(trie.get(&[1, 1]).unwrap(), 11);
    assert_eq!(trie.hash(), before.change_value(&[1, 1], 10u32, 11));
    context.verify().unwrap();
}

#[test]
fn last_change_for_a_key_wins() {
    let context = context::<u32>(2);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    let entries = vec![
        Entry::new(&[1, 1], 5),
        Entry::new(&[1, 1], 0),
        Entry::new(&[1, 1], 7),
    ];
    let summary = trie.update(entries).unwrap();
    let expected = UpdateSummary {
        inserted: 1,
        ..Default::default()
    };
    assert_eq!(summary, expected);
    assert_eq!(trie.get(&[1, 1]).unwrap(), 7);
}

#[test]
fn shared_subtrees_survive_removal_from_one_holder() {
    let context = context::<bool>(3);
    let mut first = Hypertrie::new(&context, 3).unwrap();
    let entries = bool_entries([[1, 2, 3], [1, 4, 5], [6, 6, 6]]);
    first.insert(entries).unwrap();
    let mut second = first.clone();

    second.remove([[1, 2, 3], [6, 6, 6]]).unwrap();
    assert_eq!(first.size().unwrap(), 3);
    assert_eq!(second.size().unwrap(), 1);
    assert!(first.contains(&[1, 2, 3]).unwrap());
    context.verify().unwrap();
}

#[test]
fn removing_everything_leaks_no_node() {
    let (context, allocator) = counting_context::<bool>(4);
    let mut trie = Hypertrie::new(&context, 4).unwrap();
    let keys = random_keys(&mut seeded(11), 2_000, 4, 8);
    trie.insert(bool_entries(&keys)).unwrap();
    assert!(allocator.live_nodes() > 0);

    let (head, tail) = keys.split_at(keys.len() / 2);
    trie.remove(head).unwrap();
    context.verify().unwrap();
    let remaining = content(&trie);
    assert!(head.iter().all(|key| !remaining.contains_key(key)));

    trie.remove(tail).unwrap();
    assert!(trie.is_empty());
    assert_eq!(allocator.live_nodes(), 0);
    assert_eq!(context.node_count().unwrap(), 0);
}
