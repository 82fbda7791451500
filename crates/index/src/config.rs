//! Configuration for the index client.
//!
//! Both [`IndexConfig`] and [`BatchPolicy`] deserialize from any serde format.
//! Durations use humantime notation (`"10s"`, `"1m"`).
//!
//! # Example
//!
//! ```
//! use concept_rw_index::config::{BatchPolicy, IndexConfig};
//!
//! let config: IndexConfig = serde_json::from_str(
//!     r#"{ "nodes": ["http://es:9200"], "batch": { "flush_interval": "5s" } }"#,
//! ).unwrap();
//! assert_eq!(config.index_name, "concepts");
//! assert_eq!(config.batch.flush_interval, std::time::Duration::from_secs(5));
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IndexResult};

/// Credentials attached to every request sent to the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the index client and its Elasticsearch connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Elasticsearch node URLs (e.g., `["http://localhost:9200"]`).
    /// Currently uses the first node (single-node connection pool).
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// Name of the index all concepts are written to (default: `"concepts"`).
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// Delay between connection attempts (default: 1m).
    #[serde(with = "humantime_serde", default = "default_retry_interval")]
    pub retry_interval: Duration,

    /// Bulk batching policy.
    #[serde(default)]
    pub batch: BatchPolicy,
}

fn default_nodes() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_index_name() -> String {
    "concepts".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            index_name: default_index_name(),
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
            retry_interval: default_retry_interval(),
            batch: BatchPolicy::default(),
        }
    }
}

impl IndexConfig {
    /// Returns the request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.nodes.iter().all(|n| n.trim().is_empty()) {
            errors.push("At least one Elasticsearch node is required".to_string());
        }

        if self.index_name.trim().is_empty() {
            errors.push("Index name cannot be empty".to_string());
        }

        if self.request_timeout_ms == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.retry_interval.is_zero() {
            errors.push("Connection retry interval cannot be 0".to_string());
        }

        if let Err(batch_errors) = self.batch.validate() {
            errors.extend(batch_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Size, count and time bounds for bulk batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// Number of batches that may be submitting concurrently (default: 2).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Flush once this many items are buffered (default: 1000).
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Flush once the buffered items reach this many bytes (default: 2MiB).
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Flush whatever is buffered after this long without a flush (default: 10s).
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,
}

fn default_workers() -> usize {
    2
}

fn default_max_items() -> usize {
    1000
}

fn default_max_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_items: default_max_items(),
            max_bytes: default_max_bytes(),
            flush_interval: default_flush_interval(),
        }
    }
}

impl BatchPolicy {
    /// Validates the policy and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.workers == 0 {
            errors.push("Bulk worker count must be at least 1".to_string());
        }
        if self.max_items == 0 {
            errors.push("Max items per batch must be at least 1".to_string());
        }
        if self.max_bytes == 0 {
            errors.push("Max bytes per batch must be at least 1".to_string());
        }
        if self.flush_interval.is_zero() {
            errors.push("Flush interval must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Like [`validate`](Self::validate), folded into an [`IndexResult`].
    pub fn ensure_valid(&self) -> IndexResult<()> {
        self.validate()
            .map_err(|problems| ConfigError::Invalid { problems }.into())
    }
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
