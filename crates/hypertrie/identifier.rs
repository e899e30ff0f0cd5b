use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::key::{Entry, KeyPart};
use crate::value::Value;

/// Content hash of a node.
///
/// The identifier of a set of entries is the wrapping sum of the entry
/// hashes, so it does not depend on insertion order and a single entry can be
/// added or removed without looking at the others. The empty set hashes to
/// [`Identifier::EMPTY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Identifier(u64);

impl Identifier {
    pub const EMPTY: Identifier = Identifier(0);

    pub fn of<V: Value>(entries: &[Entry<V>]) -> Self {
        entries
            .iter()
            .fold(Self::EMPTY, |id, entry| id.add(&entry.key, entry.value))
    }

    pub fn of_entry<V: Value>(key: &[KeyPart], value: V) -> Self {
        Self(entry_hash(key, value))
    }

    pub fn add<V: Value>(self, key: &[KeyPart], value: V) -> Self {
        self.combine(Self::of_entry(key, value))
    }

    pub fn remove<V: Value>(self, key: &[KeyPart], value: V) -> Self {
        self.uncombine(Self::of_entry(key, value))
    }

    pub fn change_value<V: Value>(self, key: &[KeyPart], old_value: V, new_value: V) -> Self {
        self.remove(key, old_value).add(key, new_value)
    }

    /// Identifier of the union of two disjoint entry sets.
    pub fn combine(self, other: Identifier) -> Self {
        Self(self.0.wrapping_add(other.0))
    }

    /// Identifier of `self` without the entries of `other`, which must be a
    /// subset.
    pub fn uncombine(self, other: Identifier) -> Self {
        Self(self.0.wrapping_sub(other.0))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn entry_hash<V: Value>(key: &[KeyPart], value: V) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    value.hash(&mut hasher);
    // 0 is reserved for the empty set
    match finalize(hasher.finish()) {
        0 => 1,
        hash => hash,
    }
}

// murmur3 finalizer, spreads the weak fx output over all bits
fn finalize(mut hash: u64) -> u64 {
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash ^ (hash >> 33)
}
