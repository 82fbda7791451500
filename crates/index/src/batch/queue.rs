//! Bulk write queue with count, size and time bounded batching.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::BatchPolicy;
use crate::error::{BatchError, IndexError, IndexResult};

use super::item::{BatchOutcome, FailedWrite, FailureSink, WriteItem};

/// Flushed batches waiting for a worker, as a multiple of the worker count,
/// above which the backlog is logged.
const BACKLOG_WARN_FACTOR: usize = 4;

/// Submits a batch of writes as one network operation.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    /// Submits `batch`, returning per-item results.
    ///
    /// An `Err` means the batch as a whole was not accepted.
    async fn submit(&self, batch: &[WriteItem]) -> IndexResult<BatchOutcome>;
}

/// Counters describing the work a queue has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Batches handed to the submitter.
    pub batches_submitted: u64,
    /// Items contained in those batches.
    pub items_submitted: u64,
    /// Items reported to the failure sink.
    pub items_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batches_submitted: AtomicU64,
    items_submitted: AtomicU64,
    items_failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BatchStats {
        BatchStats {
            batches_submitted: self.batches_submitted.load(Ordering::Relaxed),
            items_submitted: self.items_submitted.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
        }
    }
}

/// Items waiting for the next flush.
struct Buffer {
    items: Vec<WriteItem>,
    bytes: usize,
    emptied_at: Instant,
    /// `None` once the queue is closed.
    flush_tx: Option<mpsc::UnboundedSender<Vec<WriteItem>>>,
}

impl Buffer {
    fn take(&mut self) -> Vec<WriteItem> {
        self.bytes = 0;
        self.emptied_at = Instant::now();
        std::mem::take(&mut self.items)
    }
}

struct Shared {
    policy: BatchPolicy,
    buffer: Mutex<Buffer>,
    sink: Arc<dyn FailureSink>,
    counters: Counters,
    /// Flushed batches not yet handed to a worker.
    waiting: AtomicUsize,
    /// Last whole-batch error, stored by the dispatcher when it exits.
    drain_error: Mutex<Option<IndexError>>,
}

impl Shared {
    /// Sends a flushed batch to the dispatcher.
    fn dispatch(&self, flush_tx: &mpsc::UnboundedSender<Vec<WriteItem>>, batch: Vec<WriteItem>) {
        let waiting = self.waiting.fetch_add(1, Ordering::Relaxed) + 1;
        let threshold = self.policy.workers * BACKLOG_WARN_FACTOR;
        if waiting % threshold == 0 {
            warn!(
                waiting,
                workers = self.policy.workers,
                "Bulk backlog growing, batches are waiting for a free worker"
            );
        }

        if let Err(e) = flush_tx.send(batch) {
            self.waiting.fetch_sub(1, Ordering::Relaxed);
            self.report_all(e.0, "bulk dispatcher stopped");
        }
    }

    fn report_all(&self, batch: Vec<WriteItem>, reason: &str) {
        self.counters
            .items_failed
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        for item in batch {
            self.sink.report(FailedWrite {
                item,
                reason: reason.to_string(),
            });
        }
    }
}

/// Accumulates writes and submits them in batches on a bounded worker pool.
///
/// A batch is flushed when it reaches [`BatchPolicy::max_items`] items or
/// [`BatchPolicy::max_bytes`] bytes, or when [`BatchPolicy::flush_interval`]
/// has passed since the buffer was last emptied. At most
/// [`BatchPolicy::workers`] batches are submitting at once; the buffer keeps
/// filling while they do.
///
/// Must be created inside a Tokio runtime.
pub struct BatchQueue {
    shared: Arc<Shared>,
    /// Becomes true once the dispatcher has drained every submission.
    drained: watch::Receiver<bool>,
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue")
            .field("policy", &self.shared.policy)
            .field("buffered", &self.buffered())
            .finish_non_exhaustive()
    }
}

impl BatchQueue {
    /// Creates a queue and starts its dispatcher.
    pub fn new(
        policy: BatchPolicy,
        submitter: Arc<dyn BatchSubmitter>,
        sink: Arc<dyn FailureSink>,
    ) -> IndexResult<Self> {
        policy.ensure_valid()?;

        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            policy,
            buffer: Mutex::new(Buffer {
                items: Vec::new(),
                bytes: 0,
                emptied_at: Instant::now(),
                flush_tx: Some(flush_tx),
            }),
            sink,
            counters: Counters::default(),
            waiting: AtomicUsize::new(0),
            drain_error: Mutex::new(None),
        });

        let (drained_tx, drained) = watch::channel(false);
        let dispatcher = Dispatcher {
            shared: shared.clone(),
            submitter,
            in_flight: JoinSet::new(),
            last_error: None,
        };
        tokio::spawn(dispatcher.run(flush_rx, drained_tx));

        Ok(Self { shared, drained })
    }

    /// Adds an item to the buffer, flushing it if a size bound is reached.
    ///
    /// Never waits on the network. Fails with [`BatchError::QueueClosed`]
    /// once [`close`](Self::close) has started.
    pub fn enqueue(&self, item: WriteItem) -> IndexResult<()> {
        let size = item.encoded_len();
        let policy = &self.shared.policy;

        let mut buffer = self.shared.buffer.lock();
        if buffer.flush_tx.is_none() {
            return Err(BatchError::QueueClosed.into());
        }

        buffer.items.push(item);
        buffer.bytes += size;

        if buffer.items.len() >= policy.max_items || buffer.bytes >= policy.max_bytes {
            let batch = buffer.take();
            debug!(items = batch.len(), "Batch size bound reached, flushing");
            if let Some(flush_tx) = &buffer.flush_tx {
                self.shared.dispatch(flush_tx, batch);
            }
        }

        Ok(())
    }

    /// Number of items waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.shared.buffer.lock().items.len()
    }

    /// Returns the queue's counters.
    pub fn stats(&self) -> BatchStats {
        self.shared.counters.snapshot()
    }

    /// Number of flushed batches waiting for a free worker.
    pub fn waiting_batches(&self) -> usize {
        self.shared.waiting.load(Ordering::Relaxed)
    }

    /// Returns true once [`close`](Self::close) has started.
    pub fn is_closed(&self) -> bool {
        self.shared.buffer.lock().flush_tx.is_none()
    }

    /// Stops accepting items, flushes the buffer and waits for every
    /// in-flight submission.
    ///
    /// Every caller waits for the drain to finish. The last whole-batch
    /// submission error, if any, is returned to the first caller to observe
    /// it; later calls return `Ok(())`.
    pub async fn close(&self) -> IndexResult<()> {
        {
            let mut buffer = self.shared.buffer.lock();
            if let Some(flush_tx) = buffer.flush_tx.take() {
                let remaining = buffer.take();
                if !remaining.is_empty() {
                    debug!(items = remaining.len(), "Flushing partial batch on close");
                    self.shared.dispatch(&flush_tx, remaining);
                }
            }
        }

        let mut drained = self.drained.clone();
        if drained.wait_for(|done| *done).await.is_err() {
            // The sender only goes away without signalling if the dispatcher panicked.
            return Err(BatchError::Worker {
                message: "bulk dispatcher stopped unexpectedly".to_string(),
            }
            .into());
        }

        match self.shared.drain_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for BatchQueue {
    fn drop(&mut self) {
        // Closing the channel lets the detached dispatcher drain and exit.
        let mut buffer = self.shared.buffer.lock();
        if let Some(flush_tx) = buffer.flush_tx.take() {
            let remaining = buffer.take();
            if !remaining.is_empty() {
                warn!(
                    items = remaining.len(),
                    "Batch queue dropped without close, flushing in background"
                );
                self.shared.dispatch(&flush_tx, remaining);
            }
        }
    }
}

/// Background task that times flushes and runs submissions.
struct Dispatcher {
    shared: Arc<Shared>,
    submitter: Arc<dyn BatchSubmitter>,
    in_flight: JoinSet<Result<(), IndexError>>,
    last_error: Option<IndexError>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut flush_rx: mpsc::UnboundedReceiver<Vec<WriteItem>>,
        drained: watch::Sender<bool>,
    ) {
        let interval = self.shared.policy.flush_interval;

        loop {
            let deadline = self.shared.buffer.lock().emptied_at + interval;

            tokio::select! {
                batch = flush_rx.recv() => match batch {
                    Some(batch) => self.start(batch).await,
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    if let Some(batch) = self.take_due(interval) {
                        debug!(items = batch.len(), "Flush interval elapsed, flushing");
                        self.shared.waiting.fetch_add(1, Ordering::Relaxed);
                        self.start(batch).await;
                    }
                }
                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.record(result);
                }
            }
        }

        while let Some(result) = self.in_flight.join_next().await {
            self.record(result);
        }

        let stats = self.shared.counters.snapshot();
        info!(
            batches = stats.batches_submitted,
            items = stats.items_submitted,
            failed = stats.items_failed,
            "Batch queue drained"
        );

        *self.shared.drain_error.lock() = self.last_error.take();
        drained.send_replace(true);
    }

    /// Takes the buffer if the flush interval has passed since it was emptied.
    fn take_due(&self, interval: std::time::Duration) -> Option<Vec<WriteItem>> {
        let mut buffer = self.shared.buffer.lock();
        if buffer.flush_tx.is_none() {
            return None;
        }
        if buffer.items.is_empty() {
            buffer.emptied_at = Instant::now();
            return None;
        }
        if buffer.emptied_at + interval <= Instant::now() {
            Some(buffer.take())
        } else {
            None
        }
    }

    /// Hands a counted batch to a worker, waiting for a free one first.
    async fn start(&mut self, batch: Vec<WriteItem>) {
        if batch.is_empty() {
            self.shared.waiting.fetch_sub(1, Ordering::Relaxed);
            return;
        }

        while self.in_flight.len() >= self.shared.policy.workers {
            match self.in_flight.join_next().await {
                Some(result) => self.record(result),
                None => break,
            }
        }

        self.shared.waiting.fetch_sub(1, Ordering::Relaxed);
        let shared = self.shared.clone();
        let submitter = self.submitter.clone();
        self.in_flight
            .spawn(async move { submit_batch(&shared, submitter.as_ref(), batch).await });
    }

    fn record(&mut self, result: Result<Result<(), IndexError>, tokio::task::JoinError>) {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.last_error = Some(e),
            Err(e) => {
                warn!(error = %e, "Bulk worker task failed");
                self.last_error = Some(
                    BatchError::Worker {
                        message: e.to_string(),
                    }
                    .into(),
                );
            }
        }
    }
}

async fn submit_batch(
    shared: &Shared,
    submitter: &dyn BatchSubmitter,
    batch: Vec<WriteItem>,
) -> Result<(), IndexError> {
    let count = batch.len();
    shared
        .counters
        .batches_submitted
        .fetch_add(1, Ordering::Relaxed);
    shared
        .counters
        .items_submitted
        .fetch_add(count as u64, Ordering::Relaxed);

    match submitter.submit(&batch).await {
        Ok(outcome) => {
            if !outcome.is_success() {
                warn!(
                    items = count,
                    failed = outcome.failed_items.len(),
                    "Bulk request partially failed"
                );
            }
            shared
                .counters
                .items_failed
                .fetch_add(outcome.failed_items.len() as u64, Ordering::Relaxed);
            for (item, reason) in outcome.failed_items {
                shared.sink.report(FailedWrite { item, reason });
            }
            Ok(())
        }
        Err(e) => {
            let reason = e.to_string();
            warn!(items = count, error = %reason, "Bulk request failed");
            shared.report_all(batch, &reason);
            Err(BatchError::Submission {
                items: count,
                message: reason,
            }
            .into())
        }
    }
}
