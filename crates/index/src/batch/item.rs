//! Items, outcomes and failure reporting for bulk writes.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// Bytes added per item for the bulk action line (`{"index":{"_id":...}}`).
const ACTION_OVERHEAD_BYTES: usize = 32;

/// A single concept write waiting for batched delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteItem {
    /// Concept type (e.g. `"organisations"`, `"people"`).
    pub concept_type: String,
    /// Concept identifier, unique within its type.
    pub id: String,
    /// Document body to index.
    pub payload: Value,
}

impl WriteItem {
    /// Creates a new write item.
    pub fn new(concept_type: impl Into<String>, id: impl Into<String>, payload: Value) -> Self {
        Self {
            concept_type: concept_type.into(),
            id: id.into(),
            payload,
        }
    }

    /// Returns the document ID used in the backing store.
    pub fn document_id(&self) -> String {
        document_id(&self.concept_type, &self.id)
    }

    /// Approximate size of this item in a bulk request body.
    pub fn encoded_len(&self) -> usize {
        let payload = serde_json::to_vec(&self.payload)
            .map(|v| v.len())
            .unwrap_or_default();
        payload + self.document_id().len() + ACTION_OVERHEAD_BYTES
    }
}

/// Returns the store document ID for a concept.
///
/// Concepts of every type share one index, so the type is part of the ID.
pub fn document_id(concept_type: &str, id: &str) -> String {
    format!("{}_{}", concept_type, id)
}

/// Result of submitting one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// IDs of the items the store accepted.
    pub succeeded_ids: Vec<String>,
    /// Items the store rejected, in batch order, with the store's reason.
    pub failed_items: Vec<(WriteItem, String)>,
}

impl BatchOutcome {
    /// Builds an outcome from per-item results given in batch order.
    ///
    /// Items without a matching result are counted as failed.
    pub fn from_item_results<I>(batch: &[WriteItem], results: I) -> Self
    where
        I: IntoIterator<Item = Result<(), String>>,
    {
        let mut outcome = Self::default();
        let mut results = results.into_iter();

        for item in batch {
            match results.next() {
                Some(Ok(())) => outcome.succeeded_ids.push(item.id.clone()),
                Some(Err(reason)) => outcome.failed_items.push((item.clone(), reason)),
                None => outcome
                    .failed_items
                    .push((item.clone(), "missing from bulk response".to_string())),
            }
        }

        outcome
    }

    /// Returns true if every item succeeded.
    pub fn is_success(&self) -> bool {
        self.failed_items.is_empty()
    }
}

/// A bulk write that reached a failed terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedWrite {
    /// The rejected item.
    pub item: WriteItem,
    /// Why it was rejected.
    pub reason: String,
}

/// Receives failed bulk writes.
///
/// Called concurrently from every submission worker.
pub trait FailureSink: Send + Sync {
    /// Reports one failed write.
    fn report(&self, failure: FailedWrite);
}

impl<F> FailureSink for F
where
    F: Fn(FailedWrite) + Send + Sync,
{
    fn report(&self, failure: FailedWrite) {
        self(failure)
    }
}

/// Failure sink that funnels reports through a channel to a single logging task.
#[derive(Debug, Clone)]
pub struct LoggingFailureSink {
    sender: mpsc::UnboundedSender<FailedWrite>,
}

impl LoggingFailureSink {
    /// Creates the sink and spawns its consumer.
    ///
    /// The consumer exits once every clone of the sink has been dropped.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<FailedWrite>();

        let handle = tokio::spawn(async move {
            while let Some(failure) = receiver.recv().await {
                error!(
                    concept_type = %failure.item.concept_type,
                    id = %failure.item.id,
                    reason = %failure.reason,
                    "Bulk write failed"
                );
            }
        });

        (Self { sender }, handle)
    }
}

impl FailureSink for LoggingFailureSink {
    fn report(&self, failure: FailedWrite) {
        if let Err(e) = self.sender.send(failure) {
            let failure = e.0;
            error!(
                concept_type = %failure.item.concept_type,
                id = %failure.item.id,
                reason = %failure.reason,
                "Bulk write failed (failure log consumer stopped)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_document_id() {
        let item = WriteItem::new("people", "abc", json!({}));
        assert_eq!(item.document_id(), "people_abc");
    }

    #[test]
    fn test_encoded_len_grows_with_payload() {
        let small = WriteItem::new("people", "1", json!({"a": 1}));
        let large = WriteItem::new("people", "1", json!({"a": "x".repeat(100)}));
        assert!(large.encoded_len() > small.encoded_len() + 90);
    }

    #[test]
    fn test_outcome_from_item_results() {
        let batch = vec![
            WriteItem::new("people", "1", json!({})),
            WriteItem::new("people", "2", json!({})),
            WriteItem::new("people", "3", json!({})),
        ];
        let outcome =
            BatchOutcome::from_item_results(&batch, vec![Ok(()), Err("bad".to_string())]);

        assert_eq!(outcome.succeeded_ids, vec!["1"]);
        assert_eq!(outcome.failed_items.len(), 2);
        assert_eq!(outcome.failed_items[0].0.id, "2");
        assert_eq!(outcome.failed_items[0].1, "bad");
        assert_eq!(outcome.failed_items[1].1, "missing from bulk response");
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_closure_is_a_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |failure: FailedWrite| seen.lock().push(failure.item.id)
        };
        sink.report(FailedWrite {
            item: WriteItem::new("genres", "g1", json!({})),
            reason: "nope".to_string(),
        });
        assert_eq!(*seen.lock(), vec!["g1"]);
    }

    #[tokio::test]
    async fn test_logging_sink_consumer_exits_when_dropped() {
        let (sink, handle) = LoggingFailureSink::spawn();
        sink.report(FailedWrite {
            item: WriteItem::new("people", "p1", json!({})),
            reason: "rejected".to_string(),
        });
        drop(sink);
        handle.await.unwrap();
    }
}
