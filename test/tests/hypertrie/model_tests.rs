use std::collections::BTreeMap;

use hypertrie::{Entry, Hypertrie, Identifier, KeyPart, UpdateSummary};
use hypertrie_test::{content, context, counting_context, init_tracing, random_keys, seeded};
use rand::Rng;
use rand::rngs::StdRng;

type Model = BTreeMap<Vec<KeyPart>, u32>;

/// A batch of changes: zero removes the key, anything else sets it.
fn random_changes(rng: &mut StdRng, depth: usize, count: usize) -> Vec<Entry<u32>> {
    random_keys(rng, count, depth, 6)
        .into_iter()
        .map(|key| {
            let value = if rng.gen_bool(0.3) { 0 } else { rng.gen_range(1..4) };
            Entry::new(&key, value)
        })
        .collect()
}

/// Applies `changes` to the model and returns what the update should report.
fn apply_to_model(model: &mut Model, changes: &[Entry<u32>]) -> UpdateSummary {
    let mut latest: BTreeMap<Vec<KeyPart>, u32> = BTreeMap::new();
    for change in changes {
        latest.insert(change.key.to_vec(), change.value);
    }
    let mut summary = UpdateSummary::default();
    for (key, value) in latest {
        let old = model.get(&key).copied().unwrap_or(0);
        match (old, value) {
            (0, 0) => {}
            (0, _) => summary.inserted += 1,
            (_, 0) => summary.removed += 1,
            (old, value) if old == value => {}
            _ => summary.changed += 1,
        }
        if value == 0 {
            model.remove(&key);
        } else {
            model.insert(key, value);
        }
    }
    summary
}

fn model_hash(model: &Model) -> Identifier {
    model
        .iter()
        .fold(Identifier::EMPTY, |id, (key, &value)| id.add(key, value))
}

#[test]
fn random_updates_agree_with_ordered_map() {
    init_tracing();
    for depth in 1..=4 {
        let context = context::<u32>(depth);
        let mut trie = Hypertrie::new(&context, depth).unwrap();
        let mut model = Model::new();
        let mut rng = seeded(depth as u64);

        for round in 0..40 {
            let count = rng.gen_range(1..60);
            let changes = random_changes(&mut rng, depth, count);
            let expected = apply_to_model(&mut model, &changes);
            let summary = trie.update(changes).unwrap();

            assert_eq!(summary, expected, "depth {depth}, round {round}");
            assert_eq!(trie.size().unwrap(), model.len());
            assert_eq!(trie.hash(), model_hash(&model));
            assert_eq!(content(&trie), model);
            context.verify().unwrap();
        }
        for (key, &value) in &model {
            assert_eq!(trie.get(key).unwrap(), value);
        }
    }
}

#[test]
fn snapshots_keep_their_contents_while_the_original_changes() {
    let (context, allocator) = counting_context::<u32>(3);
    let mut trie = Hypertrie::new(&context, 3).unwrap();
    let mut model = Model::new();
    let mut rng = seeded(99);
    let mut snapshots = Vec::new();

    for _ in 0..15 {
        let changes = random_changes(&mut rng, 3, 40);
        apply_to_model(&mut model, &changes);
        trie.update(changes).unwrap();
        snapshots.push((trie.clone(), model.clone()));
    }
    context.verify().unwrap();
    for (snapshot, expected) in &snapshots {
        assert_eq!(&content(snapshot), expected);
        assert_eq!(snapshot.hash(), model_hash(expected));
    }

    drop(snapshots);
    assert_eq!(content(&trie), model);
    drop(trie);
    assert_eq!(allocator.live_nodes(), 0);
}

#[test]
fn set_reports_previous_values() {
    let context = context::<u32>(2);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    assert_eq!(trie.set(&[1, 2], 5).unwrap(), 0);
    assert_eq!(trie.set(&[1, 2], 6).unwrap(), 5);
    assert_eq!(trie.set(&[1, 2], 6).unwrap(), 6);
    assert_eq!(trie.set(&[1, 2], 0).unwrap(), 6);
    assert!(trie.is_empty());
}

#[test]
fn handles_reject_keys_of_the_wrong_length() {
    let context = context::<u32>(3);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    trie.set(&[1, 1], 1).unwrap();
    let before = trie.hash();

    assert!(trie.get(&[1]).is_err());
    let mixed = vec![Entry::new(&[2, 2], 2), Entry::new(&[1, 1, 1], 3)];
    assert!(trie.update(mixed).is_err());
    assert_eq!(trie.hash(), before);
    assert!(Hypertrie::new(&context, 4).is_err());
}
