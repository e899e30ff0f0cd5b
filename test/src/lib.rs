//! Helpers shared by the hypertrie integration tests.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use hypertrie::{
    ContextConfig, CountingAllocator, Entry, Hypertrie, HypertrieContext, KeyPart, NodeAllocator,
    Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn context<V: Value>(max_depth: usize) -> HypertrieContext<V> {
    HypertrieContext::new(ContextConfig::with_max_depth(max_depth))
        .unwrap_or_else(|err| panic!("creating context: {err}"))
}

pub fn counting_context<V: Value>(
    max_depth: usize,
) -> (HypertrieContext<V, CountingAllocator>, CountingAllocator) {
    let allocator = CountingAllocator::new();
    let config = ContextConfig::with_max_depth(max_depth);
    let context = HypertrieContext::with_allocator(config, allocator.clone())
        .unwrap_or_else(|err| panic!("creating context: {err}"));
    (context, allocator)
}

pub fn bool_entries<K: AsRef<[KeyPart]>>(keys: impl IntoIterator<Item = K>) -> Vec<Entry<bool>> {
    keys.into_iter()
        .map(|key| Entry::new(key.as_ref(), true))
        .collect()
}

/// `count` keys with key parts below `max_key_part`, duplicates included.
pub fn random_keys(
    rng: &mut StdRng,
    count: usize,
    depth: usize,
    max_key_part: KeyPart,
) -> Vec<Vec<KeyPart>> {
    (0..count)
        .map(|_| (0..depth).map(|_| rng.gen_range(0..max_key_part)).collect())
        .collect()
}

pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Entries of `hypertrie` as an ordered map, for comparison with a model.
pub fn content<V: Value, A: NodeAllocator>(
    hypertrie: &Hypertrie<V, A>,
) -> BTreeMap<Vec<KeyPart>, V> {
    hypertrie
        .to_entries()
        .unwrap_or_else(|err| panic!("reading hypertrie: {err}"))
        .into_iter()
        .map(|entry| (entry.key.to_vec(), entry.value))
        .collect()
}
