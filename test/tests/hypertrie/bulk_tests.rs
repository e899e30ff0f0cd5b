use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use hypertrie::{
    AsyncBulkInserter, BulkCallback, BulkConfig, BulkMode, Entry, Hypertrie, HypertrieError,
    SyncBulkInserter,
};
use hypertrie_test::{bool_entries, content, context, init_tracing, random_keys, seeded};

const KEYS: usize = 10_000;
const BULK_SIZE: usize = 1_000;

/// Totals over every callback invocation: processed, committed and the
/// last reported size.
type Totals = Arc<Mutex<(usize, usize, usize)>>;

fn recording_callback() -> (Totals, BulkCallback) {
    let totals = Totals::default();
    let recorded = Arc::clone(&totals);
    let callback: BulkCallback = Box::new(move |processed, committed, size| {
        let mut totals = recorded.lock().unwrap();
        totals.0 += processed;
        totals.1 += committed;
        totals.2 = size;
    });
    (totals, callback)
}

fn duplicate_heavy_keys(seed: u64) -> (Vec<Vec<u64>>, BTreeSet<Vec<u64>>) {
    let keys = random_keys(&mut seeded(seed), KEYS, 3, 12);
    let distinct = keys.iter().cloned().collect();
    (keys, distinct)
}

#[test]
fn sync_bulk_insert_counts_distinct_keys() {
    init_tracing();
    let context = context::<bool>(3);
    let mut trie = Hypertrie::new(&context, 3).unwrap();
    let (keys, distinct) = duplicate_heavy_keys(1);
    assert!(distinct.len() < KEYS);

    let (totals, callback) = recording_callback();
    {
        let config = BulkConfig::new(BULK_SIZE, BulkMode::Insert);
        let mut inserter = SyncBulkInserter::with_callback(&mut trie, config, callback);
        for key in &keys {
            inserter.add(Entry::new(key, true)).unwrap();
            assert!(inserter.size() < BULK_SIZE);
        }
    }

    let expected = (KEYS, distinct.len(), distinct.len());
    assert_eq!(*totals.lock().unwrap(), expected);
    let stored: BTreeSet<_> = content(&trie).into_keys().collect();
    assert_eq!(stored, distinct);
    context.verify().unwrap();
}

#[test]
fn async_bulk_insert_counts_distinct_keys() {
    init_tracing();
    let context = context::<bool>(3);
    let trie = Hypertrie::new(&context, 3).unwrap();
    let (keys, distinct) = duplicate_heavy_keys(2);

    let (totals, callback) = recording_callback();
    let config = BulkConfig::new(BULK_SIZE, BulkMode::Insert);
    let mut inserter = AsyncBulkInserter::with_callback(trie, config, callback).unwrap();
    for key in &keys {
        inserter.add(Entry::new(key, true)).unwrap();
    }
    inserter.flush().unwrap();
    assert_eq!(inserter.size(), 0);
    let trie = inserter.finish().unwrap();

    let expected = (KEYS, distinct.len(), distinct.len());
    assert_eq!(*totals.lock().unwrap(), expected);
    let stored: BTreeSet<_> = content(&trie).into_keys().collect();
    assert_eq!(stored, distinct);
    context.verify().unwrap();
}

#[test]
fn bulk_insert_skips_keys_already_stored() {
    let context = context::<bool>(2);
    let mut trie = Hypertrie::new(&context, 2).unwrap();
    trie.insert(bool_entries([[1, 1], [2, 2]])).unwrap();

    let (totals, callback) = recording_callback();
    {
        let config = BulkConfig::new(10, BulkMode::Insert);
        let mut inserter = SyncBulkInserter::with_callback(&mut trie, config, callback);
        for key in [[1u64, 1], [2, 2], [3, 3]] {
            inserter.add(Entry::new(&key, true)).unwrap();
        }
        inserter.flush().unwrap();
    }
    assert_eq!(*totals.lock().unwrap(), (3, 1, 3));
}

#[test]
fn async_bulk_remove_empties_the_hypertrie() {
    let context = context::<bool>(3);
    let mut trie = Hypertrie::new(&context, 3).unwrap();
    let (keys, distinct) = duplicate_heavy_keys(3);
    trie.insert(bool_entries(&distinct)).unwrap();

    let (totals, callback) = recording_callback();
    let config = BulkConfig::new(BULK_SIZE, BulkMode::Remove);
    let mut remover = AsyncBulkInserter::with_callback(trie, config, callback).unwrap();
    for key in &keys {
        remover.add(Entry::new(key, true)).unwrap();
    }
    let trie = remover.finish().unwrap();

    assert_eq!(*totals.lock().unwrap(), (KEYS, distinct.len(), 0));
    assert!(trie.is_empty());
    assert_eq!(context.node_count().unwrap(), 0);
}

#[test]
fn async_inserter_hands_back_its_hypertrie_on_finish() {
    let context = context::<u32>(2);
    let trie = Hypertrie::new(&context, 2).unwrap();
    let inserter = AsyncBulkInserter::new(trie, BulkConfig::new(4, BulkMode::Insert)).unwrap();
    let trie = inserter.finish().unwrap();
    assert!(trie.is_empty());
}

#[test]
fn async_inserter_validates_keys() {
    let context = context::<bool>(3);
    let trie = Hypertrie::new(&context, 3).unwrap();
    let mut inserter = AsyncBulkInserter::new(trie, BulkConfig::new(4, BulkMode::Insert)).unwrap();
    assert_eq!(
        inserter.add(Entry::new(&[1, 2, 3, 4], true)),
        Err(HypertrieError::WrongKeyLength {
            expected: 3,
            actual: 4,
        })
    );
}

#[test]
fn bulk_config_reads_from_json() {
    let json = r#"{"bulk_size": 500, "mode": "remove"}"#;
    let config: BulkConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config, BulkConfig::new(500, BulkMode::Remove));
    let defaulted: BulkConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(defaulted, BulkConfig::default());
}
