//! Asynchronous bulk-write batching.
//!
//! Writes handed to a [`BatchQueue`] are buffered and flushed as one bulk
//! request when any bound of the [`BatchPolicy`](crate::config::BatchPolicy)
//! is reached:
//!
//! | Trigger | Bound |
//! |---------|-------|
//! | Count | `max_items` buffered items |
//! | Size | `max_bytes` buffered bytes |
//! | Time | `flush_interval` since the buffer was last emptied |
//!
//! Flushed batches run on up to `workers` concurrent submissions. Items the
//! backing store rejects, and every item of a batch that could not be
//! submitted at all, are handed to a [`FailureSink`]. Nothing is retried.
//!
//! # Example
//!
//! ```ignore
//! let (sink, _logger) = LoggingFailureSink::spawn();
//! let queue = BatchQueue::new(BatchPolicy::default(), submitter, Arc::new(sink))?;
//! queue.enqueue(WriteItem::new("people", id, payload))?;
//! queue.close().await?;
//! ```

mod item;
mod queue;

pub use item::{BatchOutcome, FailedWrite, FailureSink, LoggingFailureSink, WriteItem, document_id};
pub use queue::{BatchQueue, BatchStats, BatchSubmitter};
