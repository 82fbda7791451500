//! Elasticsearch connection construction.

use std::fmt::Debug;

use elasticsearch::Elasticsearch;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use tracing::{debug, info};

use crate::config::{ElasticsearchAuth, IndexConfig};
use crate::error::{BackendError, IndexResult};

pub(super) const BACKEND_NAME: &str = "elasticsearch";

/// A connection to an Elasticsearch cluster.
///
/// The underlying client manages HTTP connections internally and is safe to
/// share between tasks.
pub struct ElasticsearchStore {
    /// The Elasticsearch client.
    client: Elasticsearch,
    /// Node the client talks to.
    node: String,
}

impl Debug for ElasticsearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchStore")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchStore {
    /// Creates a client from configuration without contacting the cluster.
    pub fn new(config: &IndexConfig) -> IndexResult<Self> {
        let node = config
            .nodes
            .iter()
            .find(|n| !n.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());
        let client = Self::build_client(&node, config)?;

        Ok(Self { client, node })
    }

    /// Creates a client and checks that the cluster answers.
    ///
    /// This is the connect operation handed to the
    /// [`ConnectionSupervisor`](crate::supervisor::ConnectionSupervisor).
    pub async fn connect(config: &IndexConfig) -> IndexResult<Self> {
        let store = Self::new(config)?;
        store.ping().await?;
        info!(node = %store.node, "Connected to Elasticsearch");
        Ok(store)
    }

    /// Builds the Elasticsearch client from configuration.
    fn build_client(node: &str, config: &IndexConfig) -> IndexResult<Elasticsearch> {
        let parsed_url: elasticsearch::http::Url =
            node.parse().map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Invalid URL {}: {}", node, e),
            })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);

        let mut builder = TransportBuilder::new(conn_pool).timeout(config.request_timeout());

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                ElasticsearchAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                ElasticsearchAuth::Bearer { token } => {
                    builder.auth(Credentials::Bearer(token.clone()))
                }
            };
        }

        let transport = builder.build().map_err(|e| BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("Failed to build transport: {}", e),
        })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Checks that the cluster answers requests.
    pub async fn ping(&self) -> IndexResult<()> {
        debug!(node = %self.node, "Pinging Elasticsearch");
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Ping failed: {}", e),
            })?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Ping returned status {}", status),
            }
            .into());
        }
        Ok(())
    }

    /// Returns the Elasticsearch client.
    pub(crate) fn client(&self) -> &Elasticsearch {
        &self.client
    }

    /// Returns the node URL this store talks to.
    pub fn node(&self) -> &str {
        &self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_connect() {
        let config = IndexConfig {
            nodes: vec!["http://es.invalid:9200".to_string()],
            ..Default::default()
        };
        let store = ElasticsearchStore::new(&config).unwrap();
        assert_eq!(store.node(), "http://es.invalid:9200");
    }

    #[test]
    fn test_skips_blank_nodes() {
        let config = IndexConfig {
            nodes: vec!["".to_string(), "http://es2:9200".to_string()],
            ..Default::default()
        };
        let store = ElasticsearchStore::new(&config).unwrap();
        assert_eq!(store.node(), "http://es2:9200");
    }

    #[test]
    fn test_invalid_url() {
        let config = IndexConfig {
            nodes: vec!["not a url".to_string()],
            ..Default::default()
        };
        let err = ElasticsearchStore::new(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_with_credentials() {
        let config = IndexConfig {
            auth: Some(ElasticsearchAuth::Bearer {
                token: "secret".to_string(),
            }),
            ..Default::default()
        };
        assert!(ElasticsearchStore::new(&config).is_ok());
    }
}
