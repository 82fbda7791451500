//! Test infrastructure for the index client.
//!
//! [`MockConceptStore`] is an in-memory [`ConceptStore`] with switches for
//! failing or holding bulk requests; [`CollectingSink`] records every failed
//! write reported by a batch queue.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use concept_rw_index::batch::{BatchOutcome, BatchSubmitter, FailedWrite, FailureSink, WriteItem};
use concept_rw_index::config::{BatchPolicy, IndexConfig};
use concept_rw_index::error::{BackendError, IndexResult};
use concept_rw_index::store::{ClusterHealth, ClusterStatus, ConceptStore, WriteResult};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;

#[derive(Default)]
struct MockState {
    documents: HashMap<(String, String), Value>,
    bulk_batches: Vec<Vec<String>>,
    fail_bulk: Option<String>,
    fail_requests: bool,
    reject_ids: HashSet<String>,
    status: Option<ClusterStatus>,
}

/// In-memory concept store.
pub struct MockConceptStore {
    name: &'static str,
    state: Mutex<MockState>,
    /// When set, every bulk call waits for one permit.
    gate: Option<Semaphore>,
    bulk_in_flight: AtomicUsize,
    max_bulk_in_flight: AtomicUsize,
}

impl MockConceptStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build("mock", None))
    }

    pub fn named(name: &'static str) -> Arc<Self> {
        Arc::new(Self::build(name, None))
    }

    /// A store whose bulk calls block until [`release`](Self::release) is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build("mock", Some(Semaphore::new(0))))
    }

    fn build(name: &'static str, gate: Option<Semaphore>) -> Self {
        Self {
            name,
            state: Mutex::new(MockState::default()),
            gate,
            bulk_in_flight: AtomicUsize::new(0),
            max_bulk_in_flight: AtomicUsize::new(0),
        }
    }

    /// Lets `n` held bulk calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Fails every later bulk call as a whole.
    pub fn set_fail_bulk(&self, message: &str) {
        self.state.lock().fail_bulk = Some(message.to_string());
    }

    /// Fails every later single-document call with a transport error.
    pub fn set_fail_requests(&self, fail: bool) {
        self.state.lock().fail_requests = fail;
    }

    /// Rejects the item with `id` inside otherwise successful bulk calls.
    pub fn reject_id(&self, id: &str) {
        self.state.lock().reject_ids.insert(id.to_string());
    }

    pub fn set_status(&self, status: ClusterStatus) {
        self.state.lock().status = Some(status);
    }

    /// Concept IDs of each bulk call, in arrival order.
    pub fn bulk_batches(&self) -> Vec<Vec<String>> {
        self.state.lock().bulk_batches.clone()
    }

    pub fn bulk_calls(&self) -> usize {
        self.state.lock().bulk_batches.len()
    }

    pub fn document(&self, index: &str, doc_id: &str) -> Option<Value> {
        self.state
            .lock()
            .documents
            .get(&(index.to_string(), doc_id.to_string()))
            .cloned()
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().documents.len()
    }

    pub fn bulk_in_flight(&self) -> usize {
        self.bulk_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_bulk_in_flight(&self) -> usize {
        self.max_bulk_in_flight.load(Ordering::SeqCst)
    }

    fn check_requests(&self) -> IndexResult<()> {
        if self.state.lock().fail_requests {
            return Err(BackendError::Transport {
                backend_name: self.name.to_string(),
                message: "connection reset".to_string(),
                source: None,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ConceptStore for MockConceptStore {
    fn backend_name(&self) -> &'static str {
        self.name
    }

    async fn upsert(&self, index: &str, doc_id: &str, payload: &Value) -> IndexResult<WriteResult> {
        self.check_requests()?;
        let previous = self
            .state
            .lock()
            .documents
            .insert((index.to_string(), doc_id.to_string()), payload.clone());
        Ok(match previous {
            Some(_) => WriteResult::Updated,
            None => WriteResult::Created,
        })
    }

    async fn get(&self, index: &str, doc_id: &str) -> IndexResult<Option<Value>> {
        self.check_requests()?;
        Ok(self.document(index, doc_id))
    }

    async fn delete(&self, index: &str, doc_id: &str) -> IndexResult<bool> {
        self.check_requests()?;
        Ok(self
            .state
            .lock()
            .documents
            .remove(&(index.to_string(), doc_id.to_string()))
            .is_some())
    }

    async fn bulk(&self, index: &str, items: &[WriteItem]) -> IndexResult<BatchOutcome> {
        let now = self.bulk_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_bulk_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let result = {
            let mut state = self.state.lock();
            state
                .bulk_batches
                .push(items.iter().map(|item| item.id.clone()).collect());

            match state.fail_bulk.clone() {
                Some(message) => Err(BackendError::Status {
                    status: 503,
                    message,
                }
                .into()),
                None => {
                    let mut results = Vec::with_capacity(items.len());
                    for item in items {
                        if state.reject_ids.contains(&item.id) {
                            results.push(Err("mapper_parsing_exception".to_string()));
                        } else {
                            state.documents.insert(
                                (index.to_string(), item.document_id()),
                                item.payload.clone(),
                            );
                            results.push(Ok(()));
                        }
                    }
                    Ok(BatchOutcome::from_item_results(items, results))
                }
            }
        };

        self.bulk_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn cluster_health(&self) -> IndexResult<ClusterHealth> {
        self.check_requests()?;
        let status = self.state.lock().status.unwrap_or(ClusterStatus::Green);
        Ok(ClusterHealth {
            cluster_name: "mock-cluster".to_string(),
            status,
            timed_out: false,
            number_of_nodes: 1,
            number_of_data_nodes: 1,
            active_primary_shards: 1,
            active_shards: 1,
            relocating_shards: 0,
            initializing_shards: 0,
            unassigned_shards: 0,
        })
    }
}

/// Submits batches straight to a mock store.
pub struct MockSubmitter {
    pub store: Arc<MockConceptStore>,
}

#[async_trait]
impl BatchSubmitter for MockSubmitter {
    async fn submit(&self, batch: &[WriteItem]) -> IndexResult<BatchOutcome> {
        self.store.bulk("concepts", batch).await
    }
}

/// Failure sink that keeps every report.
#[derive(Default)]
pub struct CollectingSink {
    failures: Mutex<Vec<FailedWrite>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failures(&self) -> Vec<FailedWrite> {
        self.failures.lock().clone()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failures
            .lock()
            .iter()
            .map(|f| f.item.id.clone())
            .collect()
    }
}

impl FailureSink for CollectingSink {
    fn report(&self, failure: FailedWrite) {
        self.failures.lock().push(failure);
    }
}

pub fn item(id: &str) -> WriteItem {
    WriteItem::new("people", id, serde_json::json!({ "uuid": id, "prefLabel": format!("Person {}", id) }))
}

pub fn policy(workers: usize, max_items: usize, flush_secs: u64) -> BatchPolicy {
    BatchPolicy {
        workers,
        max_items,
        max_bytes: 1024 * 1024,
        flush_interval: std::time::Duration::from_secs(flush_secs),
    }
}

pub fn config(batch: BatchPolicy) -> IndexConfig {
    IndexConfig {
        index_name: "concepts".to_string(),
        batch,
        ..Default::default()
    }
}

/// Lets spawned tasks run without advancing paused time.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
