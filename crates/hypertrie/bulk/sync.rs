use tracing::warn;

use crate::Hypertrie;
use crate::allocator::NodeAllocator;
use crate::config::BulkConfig;
use crate::error::HypertrieError;
use crate::key::{Entry, check_key_length};
use crate::value::Value;

use super::{Batch, BulkCallback, noop_callback};

/// Collects entries and commits them to a borrowed [`Hypertrie`] on the
/// calling thread whenever `bulk_size` entries are queued.
///
/// Whatever is still queued is committed on drop.
pub struct SyncBulkInserter<'h, V: Value, A: NodeAllocator> {
    hypertrie: &'h mut Hypertrie<V, A>,
    bulk_size: usize,
    batch: Batch<V>,
    callback: BulkCallback,
}

impl<'h, V: Value, A: NodeAllocator> SyncBulkInserter<'h, V, A> {
    pub fn new(hypertrie: &'h mut Hypertrie<V, A>, config: BulkConfig) -> Self {
        Self::with_callback(hypertrie, config, noop_callback())
    }

    pub fn with_callback(
        hypertrie: &'h mut Hypertrie<V, A>,
        config: BulkConfig,
        callback: BulkCallback,
    ) -> Self {
        let bulk_size = config.effective_bulk_size(1);
        Self {
            hypertrie,
            bulk_size,
            batch: Batch::new(config.mode, bulk_size, config.deduplication_limit(1)),
            callback,
        }
    }

    pub fn add(&mut self, entry: Entry<V>) -> Result<(), HypertrieError> {
        check_key_length(&entry.key, self.hypertrie.depth())?;
        self.batch.offer(self.hypertrie, entry)?;
        if self.batch.len() >= self.bulk_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Entries queued and not committed yet.
    pub fn size(&self) -> usize {
        self.batch.len()
    }

    pub fn flush(&mut self) -> Result<(), HypertrieError> {
        self.batch.commit(self.hypertrie, &mut self.callback)
    }
}

impl<V: Value, A: NodeAllocator> Drop for SyncBulkInserter<'_, V, A> {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(%err, "dropping bulk inserter with uncommitted entries");
        }
    }
}
