use std::collections::{BTreeMap, BTreeSet};

use hypertrie::{Entry, Hypertrie, HypertrieError, KeyPart, SliceResult};
use hypertrie_test::{bool_entries, context};
use proptest::{
    collection::{btree_set, vec},
    option,
    prelude::*,
    proptest,
};

#[test]
fn slicing_one_position_yields_the_rest_of_the_keys() {
    let context = context::<bool>(3);
    let mut trie = Hypertrie::new(&context, 3).unwrap();
    let entries = bool_entries([[1, 2, 3], [1, 4, 5], [2, 2, 3]]);
    trie.insert(entries).unwrap();

    let guard = trie.read().unwrap();
    let view = guard.view();
    let result = view.slice(&[None, Some(2), None]).unwrap();
    let sub = result.into_trie().unwrap();
    assert_eq!(sub.depth(), 2);
    let keys: BTreeSet<Vec<KeyPart>> = sub.iter().map(|entry| entry.key.to_vec()).collect();
    assert_eq!(keys, BTreeSet::from([vec![1, 3], vec![2, 3]]));

    let deeper = sub.slice(&[Some(2), None]).unwrap().into_trie().unwrap();
    assert_eq!(deeper.to_entries(), vec![Entry::new(&[3], true)]);
}

#[test]
fn fixing_every_position_yields_a_value() {
    let context = context::<u32>(2);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    let entries = vec![Entry::new(&[1, 2], 12), Entry::new(&[3, 4], 34)];
    trie.insert(entries).unwrap();
    let guard = trie.read().unwrap();
    let view = guard.view();
    assert_eq!(view.slice(&[Some(3), Some(4)]).unwrap().value(), 34);
    assert_eq!(view.slice(&[Some(3), Some(2)]).unwrap().value(), 0);
}

#[test]
fn slicing_a_missing_key_part_is_empty() {
    let context = context::<bool>(2);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    trie.insert(bool_entries([[1, 2], [3, 4]])).unwrap();
    let guard = trie.read().unwrap();
    let result = guard.view().slice(&[Some(9), None]).unwrap();
    let sub = result.into_trie().unwrap();
    assert!(sub.is_empty());
    assert_eq!(sub.iter().count(), 0);
}

#[test]
fn slice_key_length_is_checked() {
    let context = context::<bool>(2);
    let trie = Hypertrie::new(&context, 2).unwrap();
    let guard = trie.read().unwrap();
    assert_eq!(
        guard.view().slice(&[None]).err(),
        Some(HypertrieError::WrongSliceKeyLength {
            expected: 2,
            actual: 1,
        })
    );
}

#[test]
fn sliced_hash_matches_an_independently_built_hypertrie() {
    let context = context::<bool>(3);
    let mut big = Hypertrie::new(&context, 3).unwrap();
    let entries = bool_entries([[1, 2, 3], [1, 4, 5], [2, 2, 3], [1, 4, 6]]);
    big.insert(entries).unwrap();
    let mut small = Hypertrie::new(&context, 2).unwrap();
    let entries = bool_entries([[2, 3], [4, 5], [4, 6]]);
    small.insert(entries).unwrap();

    let guard = big.read().unwrap();
    let SliceResult::Trie(sub) = guard.view().slice(&[Some(1), None, None]).unwrap() else {
        panic!("two free positions must give a sub-hypertrie");
    };
    assert_eq!(sub.hash(), small.hash());
}

fn keys_and_slice() -> impl Strategy<Value = (BTreeSet<Vec<KeyPart>>, Vec<Option<KeyPart>>)> {
    (1usize..=5).prop_flat_map(|depth| {
        (
            btree_set(vec(0u64..3, depth), 0..50),
            vec(option::of(0u64..3), depth),
        )
    })
}

proptest! {
    #[test]
    fn proptest_iteration_yields_every_entry_once(keys in btree_set(vec(any::<u64>(), 4), 0..200)) {
        let context = context::<bool>(4);
        let mut trie = Hypertrie::new(&context, 4).unwrap();
        trie.insert(bool_entries(&keys)).unwrap();

        let guard = trie.read().unwrap();
        let view = guard.view();
        let mut seen = BTreeSet::new();
        for entry in &view {
            prop_assert!(entry.value);
            prop_assert!(seen.insert(entry.key.to_vec()));
        }
        prop_assert_eq!(seen, keys);
    }

    #[test]
    fn proptest_slice_matches_brute_force((keys, slice_key) in keys_and_slice()) {
        let depth = slice_key.len();
        let context = context::<bool>(depth);
        let mut trie = Hypertrie::new(&context, depth).unwrap();
        trie.insert(bool_entries(&keys)).unwrap();

        let mut expected: BTreeMap<Vec<KeyPart>, bool> = BTreeMap::new();
        for key in &keys {
            let matches = key
                .iter()
                .zip(&slice_key)
                .all(|(key_part, fixed)| fixed.is_none_or(|fixed| fixed == *key_part));
            if matches {
                let rest = key
                    .iter()
                    .zip(&slice_key)
                    .filter(|(_, fixed)| fixed.is_none())
                    .map(|(key_part, _)| *key_part)
                    .collect();
                expected.insert(rest, true);
            }
        }

        let guard = trie.read().unwrap();
        match guard.view().slice(&slice_key).unwrap() {
            SliceResult::Value(value) => {
                prop_assert!(slice_key.iter().all(Option::is_some));
                prop_assert_eq!(value, !expected.is_empty());
            }
            SliceResult::Trie(sub) => {
                let free = slice_key.iter().filter(|fixed| fixed.is_none()).count();
                prop_assert_eq!(sub.depth(), free);
                prop_assert_eq!(sub.size(), expected.len());
                let found: BTreeMap<Vec<KeyPart>, bool> = sub
                    .iter()
                    .map(|entry| (entry.key.to_vec(), entry.value))
                    .collect();
                prop_assert_eq!(found, expected);
            }
        }
    }
}
