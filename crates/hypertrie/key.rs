use smallvec::SmallVec;

use crate::config::MAX_DEPTH;
use crate::error::HypertrieError;

/// Coordinate of a cell along one axis.
pub type KeyPart = u64;

/// Full coordinate of a cell, one key part per axis.
pub type RawKey = SmallVec<[KeyPart; MAX_DEPTH]>;

/// One `Option<KeyPart>` per axis: `Some` fixes the axis, `None` leaves it free.
pub type SliceKey = SmallVec<[Option<KeyPart>; MAX_DEPTH]>;

/// A key together with its non-empty value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry<V> {
    pub key: RawKey,
    pub value: V,
}

impl<V: Copy> Entry<V> {
    pub fn new(key: &[KeyPart], value: V) -> Self {
        Self {
            key: RawKey::from_slice(key),
            value,
        }
    }

    pub fn depth(&self) -> usize {
        self.key.len()
    }

    /// The entry with the key part at `pos` dropped.
    pub fn subentry(&self, pos: usize) -> Entry<V> {
        let mut key = self.key.clone();
        key.remove(pos);
        Entry {
            key,
            value: self.value,
        }
    }

    /// Inverse of [`Entry::subentry`]: reinserts `key_part` at `pos`.
    pub fn with_key_part(mut self, pos: usize, key_part: KeyPart) -> Entry<V> {
        self.key.insert(pos, key_part);
        self
    }
}

/// Checks that `key` addresses a cell of a hypertrie of `depth`.
pub(crate) fn check_key_length(key: &[KeyPart], depth: usize) -> Result<(), HypertrieError> {
    if key.len() != depth {
        return Err(HypertrieError::WrongKeyLength {
            expected: depth,
            actual: key.len(),
        });
    }
    Ok(())
}

/// A set of axis positions of a node, stored as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct KeyPositions(u32);

impl KeyPositions {
    /// Validates `positions` against a node of `depth`: non-empty, pairwise
    /// distinct and each smaller than `depth`.
    pub fn new(positions: &[usize], depth: usize) -> Result<Self, HypertrieError> {
        let invalid = || HypertrieError::InvalidDiagonalPositions {
            positions: positions.to_vec(),
            depth,
        };
        if positions.is_empty() {
            return Err(invalid());
        }
        let mut mask = 0u32;
        for &pos in positions {
            if pos >= depth || mask & (1 << pos) != 0 {
                return Err(invalid());
            }
            mask |= 1 << pos;
        }
        Ok(Self(mask))
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.0 & (1 << pos) != 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_DEPTH).filter(move |pos| self.contains(*pos))
    }

    /// Positions of the child reached by consuming `removed`: `removed` is
    /// dropped and every position above it moves down by one.
    pub fn without(&self, removed: usize) -> Self {
        let below = self.0 & ((1 << removed) - 1);
        let above = (self.0 >> (removed + 1)) << removed;
        Self(below | above)
    }

    /// The common key part of `key` at all positions, if they agree.
    pub fn common_key_part(&self, key: &[KeyPart]) -> Option<KeyPart> {
        let mut positions = self.iter();
        let first = key[positions.next()?];
        positions.all(|pos| key[pos] == first).then_some(first)
    }

    /// `key` with all positions of the set removed.
    pub fn project_out(&self, key: &[KeyPart]) -> RawKey {
        key.iter()
            .enumerate()
            .filter(|(pos, _)| !self.contains(*pos))
            .map(|(_, key_part)| *key_part)
            .collect()
    }
}
