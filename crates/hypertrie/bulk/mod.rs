//! Bulk loading: entries are collected into batches and each batch is
//! committed through a single update.

mod sync;
mod worker;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::Hypertrie;
use crate::allocator::NodeAllocator;
use crate::config::BulkMode;
use crate::error::HypertrieError;
use crate::key::{Entry, RawKey};
use crate::value::Value;

pub use sync::SyncBulkInserter;
pub use worker::AsyncBulkInserter;

/// Called once per committed batch with the number of entries handed to the
/// pipeline since the previous commit, the number of entries committed and
/// the size of the hypertrie afterwards.
pub type BulkCallback = Box<dyn FnMut(usize, usize, usize) + Send>;

pub(crate) fn noop_callback() -> BulkCallback {
    Box::new(|_, _, _| {})
}

/// Entries waiting to be committed, with the keys seen so far.
pub(crate) struct Batch<V: Value> {
    mode: BulkMode,
    entries: Vec<Entry<V>>,
    /// Keys already queued or known to need no change. Cleared when it
    /// reaches `deduplication_limit`, except for the keys in `entries`.
    seen: FxHashSet<RawKey>,
    deduplication_limit: usize,
    /// Entries offered since the last commit.
    processed: usize,
}

impl<V: Value> Batch<V> {
    pub fn new(mode: BulkMode, bulk_size: usize, deduplication_limit: usize) -> Self {
        Self {
            mode,
            entries: Vec::with_capacity(bulk_size),
            seen: FxHashSet::default(),
            deduplication_limit,
            processed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Queues `entry` unless its key was seen before or committing it would
    /// not change `hypertrie`. In remove mode the stored value is queued.
    pub fn offer<A: NodeAllocator>(
        &mut self,
        hypertrie: &Hypertrie<V, A>,
        mut entry: Entry<V>,
    ) -> Result<(), HypertrieError> {
        self.processed += 1;
        if self.seen.len() >= self.deduplication_limit {
            self.seen.clear();
            self.seen
                .extend(self.entries.iter().map(|queued| queued.key.clone()));
        }
        if !self.seen.insert(entry.key.clone()) {
            return Ok(());
        }
        let stored = hypertrie.get(&entry.key)?;
        match self.mode {
            BulkMode::Insert => {
                if !stored.is_empty() || entry.value.is_empty() {
                    return Ok(());
                }
            }
            BulkMode::Remove => {
                if stored.is_empty() {
                    return Ok(());
                }
                entry.value = stored;
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Commits the queued entries and reports them to `callback`. Does
    /// nothing when no entry was offered since the last commit.
    pub fn commit<A: NodeAllocator>(
        &mut self,
        hypertrie: &mut Hypertrie<V, A>,
        callback: &mut BulkCallback,
    ) -> Result<(), HypertrieError> {
        if self.processed == 0 {
            return Ok(());
        }
        let entries = std::mem::take(&mut self.entries);
        let committed = entries.len();
        let size_after = hypertrie.commit_batch(self.mode, entries)?;
        debug!(
            mode = ?self.mode,
            processed = self.processed,
            committed,
            size_after,
            "committed bulk batch"
        );
        callback(self.processed, committed, size_after);
        self.processed = 0;
        Ok(())
    }
}
