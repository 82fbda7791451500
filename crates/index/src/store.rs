//! The operations the index client needs from a backing store.
//!
//! [`ConceptStore`] is implemented by
//! [`ElasticsearchStore`](crate::backends::elasticsearch::ElasticsearchStore);
//! tests provide in-memory implementations.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::{BatchOutcome, WriteItem};
use crate::error::IndexResult;

/// Whether an upsert created a new document or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// The document did not exist before.
    Created,
    /// An existing document was replaced.
    Updated,
}

impl WriteResult {
    /// Returns true for [`WriteResult::Created`].
    pub fn is_created(self) -> bool {
        matches!(self, WriteResult::Created)
    }
}

/// A connection to a concept document store.
///
/// Implementations must be safe to use from many tasks at once.
#[async_trait]
pub trait ConceptStore: Send + Sync {
    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str;

    /// Creates or replaces a document.
    async fn upsert(&self, index: &str, doc_id: &str, payload: &Value) -> IndexResult<WriteResult>;

    /// Fetches a document's source, or `None` if it does not exist.
    async fn get(&self, index: &str, doc_id: &str) -> IndexResult<Option<Value>>;

    /// Deletes a document, returning whether it existed.
    async fn delete(&self, index: &str, doc_id: &str) -> IndexResult<bool>;

    /// Writes `items` in a single bulk request.
    ///
    /// Returns `Err` only if the request as a whole failed; per-item
    /// rejections are reported in the outcome.
    async fn bulk(&self, index: &str, items: &[WriteItem]) -> IndexResult<BatchOutcome>;

    /// Fetches the cluster health document.
    async fn cluster_health(&self) -> IndexResult<ClusterHealth>;
}

/// Cluster health status colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// All shards allocated.
    Green,
    /// All primaries allocated, some replicas missing.
    Yellow,
    /// Some primaries unallocated.
    Red,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterStatus::Green => write!(f, "green"),
            ClusterStatus::Yellow => write!(f, "yellow"),
            ClusterStatus::Red => write!(f, "red"),
        }
    }
}

/// Cluster health as reported by `GET _cluster/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
// Field meanings follow the Elasticsearch cluster health API
#[allow(missing_docs)]
pub struct ClusterHealth {
    pub cluster_name: String,
    pub status: ClusterStatus,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub number_of_nodes: u32,
    #[serde(default)]
    pub number_of_data_nodes: u32,
    #[serde(default)]
    pub active_primary_shards: u32,
    #[serde(default)]
    pub active_shards: u32,
    #[serde(default)]
    pub relocating_shards: u32,
    #[serde(default)]
    pub initializing_shards: u32,
    #[serde(default)]
    pub unassigned_shards: u32,
}

impl ClusterHealth {
    /// Returns true if the cluster status is green.
    pub fn is_green(&self) -> bool {
        self.status == ClusterStatus::Green
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cluster_health_parse() {
        let body = json!({
            "cluster_name": "concepts",
            "status": "yellow",
            "timed_out": false,
            "number_of_nodes": 3,
            "number_of_data_nodes": 3,
            "active_primary_shards": 5,
            "active_shards": 9,
            "relocating_shards": 0,
            "initializing_shards": 0,
            "unassigned_shards": 1,
            "delayed_unassigned_shards": 0
        });
        let health: ClusterHealth = serde_json::from_value(body).unwrap();
        assert_eq!(health.status, ClusterStatus::Yellow);
        assert_eq!(health.number_of_nodes, 3);
        assert!(!health.is_green());
        assert_eq!(health.status.to_string(), "yellow");
    }

    #[test]
    fn test_write_result() {
        assert!(WriteResult::Created.is_created());
        assert!(!WriteResult::Updated.is_created());
    }
}
