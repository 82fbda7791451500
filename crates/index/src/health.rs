//! Connectivity and cluster-health checks over the index client.

use tracing::debug;

use crate::client::IndexClient;
use crate::error::{BackendError, IndexResult};

/// Message returned by a successful connectivity check.
pub const CONNECTED_MESSAGE: &str = "Successfully connected to the cluster";

/// Health checks evaluated against the client's active connection.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: IndexClient,
}

impl HealthProbe {
    /// Creates a probe for `client`.
    pub fn new(client: IndexClient) -> Self {
        Self { client }
    }

    /// Succeeds if the cluster answers a health request.
    pub async fn check_connectivity(&self) -> IndexResult<String> {
        self.client.get_cluster_health().await?;
        Ok(CONNECTED_MESSAGE.to_string())
    }

    /// Succeeds if the cluster reports green.
    pub async fn check_cluster_health(&self) -> IndexResult<String> {
        let (backend, health) = self.client.backend_health().await?;
        debug!(backend, cluster = %health.cluster_name, status = %health.status, "Cluster health checked");

        if !health.is_green() {
            return Err(BackendError::Unavailable {
                backend_name: backend.to_string(),
                message: format!("Cluster health is {}", health.status),
            }
            .into());
        }
        Ok(format!("Cluster is {}", health.status))
    }
}
