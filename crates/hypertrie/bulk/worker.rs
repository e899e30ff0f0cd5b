use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, Builder, JoinHandle};

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use tracing::{debug, warn};

use crate::Hypertrie;
use crate::allocator::NodeAllocator;
use crate::config::BulkConfig;
use crate::error::HypertrieError;
use crate::key::{Entry, check_key_length};
use crate::value::Value;

use super::{Batch, BulkCallback, noop_callback};

/// Flags shared between the handle and its worker.
#[derive(Default)]
struct Signals {
    please_flush: AtomicBool,
    stop: AtomicBool,
    /// Entries sent to the worker and not committed yet.
    pending: AtomicUsize,
}

type WorkerResult<V, A> = (Hypertrie<V, A>, Result<(), HypertrieError>);

/// Collects entries on the calling thread and commits them to an owned
/// [`Hypertrie`] on a dedicated worker thread.
///
/// The worker commits whenever `bulk_size` entries are queued, when
/// [`AsyncBulkInserter::flush`] is called and when the pipeline is finished.
/// [`AsyncBulkInserter::finish`] hands the hypertrie back.
pub struct AsyncBulkInserter<V: Value, A: NodeAllocator> {
    depth: usize,
    sender: Option<Sender<Entry<V>>>,
    signals: Arc<Signals>,
    worker: Option<JoinHandle<WorkerResult<V, A>>>,
}

impl<V: Value, A: NodeAllocator> AsyncBulkInserter<V, A> {
    pub fn new(hypertrie: Hypertrie<V, A>, config: BulkConfig) -> Result<Self, HypertrieError> {
        Self::with_callback(hypertrie, config, noop_callback())
    }

    pub fn with_callback(
        hypertrie: Hypertrie<V, A>,
        config: BulkConfig,
        callback: BulkCallback,
    ) -> Result<Self, HypertrieError> {
        let bulk_size = config.effective_bulk_size(2);
        let depth = hypertrie.depth();
        let (sender, receiver) = bounded(bulk_size);
        let signals = Arc::new(Signals::default());
        let worker_signals = Arc::clone(&signals);
        let worker = Builder::new()
            .name(format!("hypertrie bulk {depth}"))
            .spawn(move || run(hypertrie, receiver, worker_signals, config, callback))
            .map_err(|_| HypertrieError::BulkWorkerStopped)?;
        Ok(Self {
            depth,
            sender: Some(sender),
            signals,
            worker: Some(worker),
        })
    }

    /// Hands `entry` to the worker, waiting while its queue is full.
    pub fn add(&mut self, entry: Entry<V>) -> Result<(), HypertrieError> {
        check_key_length(&entry.key, self.depth)?;
        let Some(sender) = &self.sender else {
            return Err(HypertrieError::BulkWorkerStopped);
        };
        self.signals.pending.fetch_add(1, Ordering::AcqRel);
        let mut entry = entry;
        loop {
            match sender.try_send(entry) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.worker_finished() {
                        self.signals.pending.fetch_sub(1, Ordering::AcqRel);
                        return Err(HypertrieError::BulkWorkerStopped);
                    }
                    entry = rejected;
                    hint::spin_loop();
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.signals.pending.fetch_sub(1, Ordering::AcqRel);
                    return Err(HypertrieError::BulkWorkerStopped);
                }
            }
        }
    }

    /// Entries handed to the worker and not committed yet.
    pub fn size(&self) -> usize {
        self.signals.pending.load(Ordering::Acquire)
    }

    /// Waits until every entry added so far has been committed.
    pub fn flush(&self) -> Result<(), HypertrieError> {
        self.signals.please_flush.store(true, Ordering::Release);
        while self.signals.please_flush.load(Ordering::Acquire) {
            if self.worker_finished() {
                return Err(HypertrieError::BulkWorkerStopped);
            }
            thread::yield_now();
        }
        Ok(())
    }

    /// Commits everything still queued, stops the worker and returns the
    /// hypertrie.
    pub fn finish(mut self) -> Result<Hypertrie<V, A>, HypertrieError> {
        self.shutdown()
            .unwrap_or(Err(HypertrieError::BulkWorkerStopped))
    }

    fn worker_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn shutdown(&mut self) -> Option<Result<Hypertrie<V, A>, HypertrieError>> {
        let worker = self.worker.take()?;
        self.signals.stop.store(true, Ordering::Release);
        self.sender = None;
        let result = match worker.join() {
            Ok((hypertrie, Ok(()))) => Ok(hypertrie),
            Ok((_, Err(err))) => Err(err),
            Err(_) => Err(HypertrieError::BulkWorkerPanicked),
        };
        Some(result)
    }
}

impl<V: Value, A: NodeAllocator> Drop for AsyncBulkInserter<V, A> {
    fn drop(&mut self) {
        if let Some(Err(err)) = self.shutdown() {
            warn!(%err, "bulk worker failed while shutting down");
        }
    }
}

fn run<V: Value, A: NodeAllocator>(
    mut hypertrie: Hypertrie<V, A>,
    receiver: Receiver<Entry<V>>,
    signals: Arc<Signals>,
    config: BulkConfig,
    mut callback: BulkCallback,
) -> WorkerResult<V, A> {
    let bulk_size = config.effective_bulk_size(2);
    let mut batch = Batch::new(config.mode, bulk_size, config.deduplication_limit(2));
    debug!(depth = hypertrie.depth(), bulk_size, mode = ?config.mode, "bulk worker started");

    let mut done = false;
    while !done {
        let mut flushing = false;
        while batch.len() < bulk_size {
            // flags are read before polling: a request raised after every
            // add it covers is only acted upon once the queue was seen empty
            let flush_requested = signals.please_flush.load(Ordering::Acquire);
            let stop_requested = signals.stop.load(Ordering::Acquire);
            match receiver.try_recv() {
                Ok(entry) => {
                    if let Err(err) = batch.offer(&hypertrie, entry) {
                        return (hypertrie, Err(err));
                    }
                }
                Err(TryRecvError::Empty) if flush_requested => {
                    flushing = true;
                    break;
                }
                Err(TryRecvError::Empty) if stop_requested => {
                    done = true;
                    break;
                }
                Err(TryRecvError::Empty) => thread::yield_now(),
                Err(TryRecvError::Disconnected) => {
                    done = true;
                    break;
                }
            }
        }
        let processed = batch.processed();
        if let Err(err) = batch.commit(&mut hypertrie, &mut callback) {
            return (hypertrie, Err(err));
        }
        signals.pending.fetch_sub(processed, Ordering::AcqRel);
        if flushing {
            signals.please_flush.store(false, Ordering::Release);
        }
    }
    debug!(depth = hypertrie.depth(), "bulk worker stopped");
    (hypertrie, Ok(()))
}
