//! The index client facade.
//!
//! [`IndexClient`] owns the active backing-store connection together with the
//! [`BatchQueue`] bound to it. Both live in one record behind a single
//! reader/writer lock:
//!
//! - reads, writes, deletes and enqueues hold the shared lock, so they run in
//!   parallel against the same connection;
//! - installing a new connection takes the exclusive lock, drains the old
//!   queue, and installs the new connection and its new queue together.
//!
//! Until the first connection is installed every operation fails with
//! [`BackendError::NoConnection`].
//!
//! # Example
//!
//! ```ignore
//! use concept_rw_index::backends::elasticsearch::ElasticsearchStore;
//! use concept_rw_index::client::IndexClient;
//! use concept_rw_index::supervisor::ConnectionSupervisor;
//!
//! let (sink, _logger) = LoggingFailureSink::spawn();
//! let client = IndexClient::new(&config, Arc::new(sink))?;
//!
//! let supervisor = ConnectionSupervisor::new(config.retry_interval, shutdown.clone());
//! client.connect_in_background(supervisor, move || {
//!     let config = config.clone();
//!     async move {
//!         let store = ElasticsearchStore::connect(&config).await?;
//!         Ok(Arc::new(store) as Arc<dyn ConceptStore>)
//!     }
//! });
//!
//! let created = client.load_data("people", id, payload).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{BatchOutcome, BatchQueue, BatchStats, BatchSubmitter, FailureSink, WriteItem, document_id};
use crate::config::{BatchPolicy, IndexConfig};
use crate::error::{BackendError, IndexResult};
use crate::store::{ClusterHealth, ConceptStore};
use crate::supervisor::ConnectionSupervisor;

/// A connection and the batch queue bound to it.
///
/// Always replaced as a unit.
struct ActiveConnection {
    store: Arc<dyn ConceptStore>,
    queue: BatchQueue,
}

/// Submits batches through one store connection into one index.
struct StoreSubmitter {
    store: Arc<dyn ConceptStore>,
    index: String,
}

#[async_trait]
impl BatchSubmitter for StoreSubmitter {
    async fn submit(&self, batch: &[WriteItem]) -> IndexResult<BatchOutcome> {
        self.store.bulk(&self.index, batch).await
    }
}

struct ClientInner {
    state: RwLock<Option<ActiveConnection>>,
    index_name: String,
    policy: BatchPolicy,
    failure_sink: Arc<dyn FailureSink>,
}

/// Read/write/delete gateway to the concept index.
///
/// Cheap to clone; clones share the same connection state.
#[derive(Clone)]
pub struct IndexClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for IndexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexClient")
            .field("index_name", &self.inner.index_name)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl IndexClient {
    /// Creates a client with no connection.
    ///
    /// Failed bulk writes are reported to `failure_sink`.
    pub fn new(config: &IndexConfig, failure_sink: Arc<dyn FailureSink>) -> IndexResult<Self> {
        config.batch.ensure_valid()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                state: RwLock::new(None),
                index_name: config.index_name.clone(),
                policy: config.batch.clone(),
                failure_sink,
            }),
        })
    }

    /// Returns the name of the index concepts are written to.
    pub fn index_name(&self) -> &str {
        &self.inner.index_name
    }

    /// Returns true once a connection has been installed.
    pub async fn is_connected(&self) -> bool {
        self.inner.state.read().await.is_some()
    }

    /// Installs a new connection, replacing the current one.
    ///
    /// The previous batch queue is closed and drained before the new
    /// connection becomes visible. Callers block for the duration.
    pub async fn install_connection(&self, store: Arc<dyn ConceptStore>) -> IndexResult<()> {
        let mut state = self.inner.state.write().await;

        if let Some(previous) = state.take() {
            info!(
                backend = previous.store.backend_name(),
                "Replacing backing store connection, draining bulk queue"
            );
            if let Err(e) = previous.queue.close().await {
                warn!(error = %e, "Bulk queue drained with errors during connection swap");
            }
        }

        let submitter = Arc::new(StoreSubmitter {
            store: store.clone(),
            index: self.inner.index_name.clone(),
        });
        let queue = BatchQueue::new(
            self.inner.policy.clone(),
            submitter,
            self.inner.failure_sink.clone(),
        )?;

        info!(
            backend = store.backend_name(),
            index = %self.inner.index_name,
            "Backing store connection installed"
        );
        *state = Some(ActiveConnection { store, queue });
        Ok(())
    }

    /// Obtains a connection in the background and installs it when ready.
    ///
    /// May be called again later to re-establish the connection; the new
    /// connection replaces the old one through [`install_connection`].
    ///
    /// [`install_connection`]: Self::install_connection
    pub fn connect_in_background<F, Fut>(
        &self,
        supervisor: ConnectionSupervisor,
        connect: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = IndexResult<Arc<dyn ConceptStore>>> + Send,
    {
        let handle = supervisor.spawn(connect);
        let client = self.clone();

        tokio::spawn(async move {
            match handle.await {
                Ok(store) => {
                    if let Err(e) = client.install_connection(store).await {
                        warn!(error = %e, "Failed to install backing store connection");
                    }
                }
                Err(_) => debug!("Connection supervisor stopped before connecting"),
            }
        })
    }

    /// Creates or replaces a concept document.
    ///
    /// Returns true if the document was created, false if it was replaced.
    pub async fn load_data(&self, concept_type: &str, id: &str, payload: &Value) -> IndexResult<bool> {
        let state = self.inner.state.read().await;
        let active = state.as_ref().ok_or(BackendError::NoConnection)?;

        let result = active
            .store
            .upsert(&self.inner.index_name, &document_id(concept_type, id), payload)
            .await?;
        debug!(concept_type, id, created = result.is_created(), "Concept written");
        Ok(result.is_created())
    }

    /// Reads a concept document, or `None` if it does not exist.
    pub async fn read_data(&self, concept_type: &str, id: &str) -> IndexResult<Option<Value>> {
        let state = self.inner.state.read().await;
        let active = state.as_ref().ok_or(BackendError::NoConnection)?;

        active
            .store
            .get(&self.inner.index_name, &document_id(concept_type, id))
            .await
    }

    /// Deletes a concept document, returning whether it existed.
    pub async fn delete_data(&self, concept_type: &str, id: &str) -> IndexResult<bool> {
        let state = self.inner.state.read().await;
        let active = state.as_ref().ok_or(BackendError::NoConnection)?;

        let found = active
            .store
            .delete(&self.inner.index_name, &document_id(concept_type, id))
            .await?;
        debug!(concept_type, id, found, "Concept deleted");
        Ok(found)
    }

    /// Queues a concept document for batched delivery.
    ///
    /// Returns once the item is buffered; delivery failures go to the
    /// failure sink. Fails with [`BackendError::NoConnection`] before the
    /// first connection is installed.
    pub async fn load_bulk_data(&self, concept_type: &str, id: &str, payload: Value) -> IndexResult<()> {
        let state = self.inner.state.read().await;
        let Some(active) = state.as_ref() else {
            warn!(concept_type, id, "Bulk write rejected, no backing store connection yet");
            return Err(BackendError::NoConnection.into());
        };

        active.queue.enqueue(WriteItem::new(concept_type, id, payload))
    }

    /// Deletes several concepts, logging failures instead of returning them.
    pub async fn cleanup_data(&self, concept_type: &str, ids: &[String]) {
        for id in ids {
            match self.delete_data(concept_type, id).await {
                Ok(true) => {}
                Ok(false) => debug!(concept_type, id = %id, "Concept to clean up was not found"),
                Err(e) => warn!(concept_type, id = %id, error = %e, "Failed to clean up concept"),
            }
        }
    }

    /// Fetches cluster health over the active connection.
    pub async fn get_cluster_health(&self) -> IndexResult<ClusterHealth> {
        self.backend_health().await.map(|(_, health)| health)
    }

    /// Returns the active store's backend name, if connected.
    pub async fn backend_name(&self) -> Option<&'static str> {
        self.inner
            .state
            .read()
            .await
            .as_ref()
            .map(|active| active.store.backend_name())
    }

    /// Fetches cluster health together with the name of the store that
    /// answered it.
    pub(crate) async fn backend_health(&self) -> IndexResult<(&'static str, ClusterHealth)> {
        let state = self.inner.state.read().await;
        let active = state.as_ref().ok_or(BackendError::NoConnection)?;
        let health = active.store.cluster_health().await?;
        Ok((active.store.backend_name(), health))
    }

    /// Returns the active batch queue's counters, if connected.
    pub async fn bulk_stats(&self) -> Option<BatchStats> {
        self.inner
            .state
            .read()
            .await
            .as_ref()
            .map(|active| active.queue.stats())
    }

    /// Drains and closes the active batch queue.
    ///
    /// Later bulk writes are rejected; single-document operations keep
    /// working.
    pub async fn close(&self) -> IndexResult<()> {
        let state = self.inner.state.write().await;
        match state.as_ref() {
            Some(active) => active.queue.close().await,
            None => Ok(()),
        }
    }
}

/// Runs `fut`, giving up with [`BackendError::Cancelled`] if `token` fires first.
pub async fn with_cancellation<T, Fut>(token: &CancellationToken, fut: Fut) -> IndexResult<T>
where
    Fut: Future<Output = IndexResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(BackendError::Cancelled.into()),
        result = fut => result,
    }
}
