use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ContextConfig;
use crate::context::HypertrieContext;
use crate::key::{Entry, KeyPart};

pub fn context(max_depth: usize) -> HypertrieContext<bool> {
    HypertrieContext::new(ContextConfig::with_max_depth(max_depth)).unwrap()
}

pub fn bool_entries<const DEPTH: usize>(keys: &[[KeyPart; DEPTH]]) -> Vec<Entry<bool>> {
    keys.iter().map(|key| Entry::new(key, true)).collect()
}

/// `count` keys of `DEPTH` key parts below `max_key_part`, duplicates included.
pub fn random_keys<const DEPTH: usize>(
    seed: u64,
    count: usize,
    max_key_part: KeyPart,
) -> Vec<[KeyPart; DEPTH]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| std::array::from_fn(|_| rng.gen_range(0..max_key_part)))
        .collect()
}
