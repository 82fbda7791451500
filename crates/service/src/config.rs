//! Service configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ELASTICSEARCH_ENDPOINT` | http://localhost:9200 | Comma-separated node URLs |
//! | `ELASTICSEARCH_INDEX` | concepts | Index all concepts are written to |
//! | `ELASTICSEARCH_USERNAME` | | Basic auth user |
//! | `ELASTICSEARCH_PASSWORD` | | Basic auth password |
//! | `ELASTICSEARCH_REQUEST_TIMEOUT` | 30s | Per-request timeout |
//! | `BULK_WORKERS` | 2 | Concurrent bulk submissions |
//! | `BULK_REQUESTS` | 1000 | Items per bulk request |
//! | `BULK_SIZE` | 2097152 | Bytes per bulk request |
//! | `FLUSH_INTERVAL` | 10s | Max wait before a partial batch is sent |
//! | `CONNECT_RETRY_INTERVAL` | 1m | Delay between connection attempts |
//! | `AUTHOR_API_URL` | | Author service base URL; unset disables the directory |
//! | `AUTHOR_API_USERNAME` | | Author service Basic auth user |
//! | `AUTHOR_API_PASSWORD` | | Author service Basic auth password |
//! | `AUTHOR_REFRESH_INTERVAL` | 5m | Author identifier refresh period |
//! | `LOG_LEVEL` | info | Log level |

use std::time::Duration;

use clap::Parser;
use concept_rw_index::authors::AuthorSourceConfig;
use concept_rw_index::config::{BatchPolicy, ElasticsearchAuth, IndexConfig};

/// Concept read/write service configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "concept-rw")]
#[command(about = "Concept read/write service backed by Elasticsearch")]
pub struct ServiceConfig {
    /// Elasticsearch node URLs (comma-separated).
    #[arg(long, env = "ELASTICSEARCH_ENDPOINT", default_value = "http://localhost:9200")]
    pub elasticsearch_endpoint: String,

    /// Index all concepts are written to.
    #[arg(long, env = "ELASTICSEARCH_INDEX", default_value = "concepts")]
    pub elasticsearch_index: String,

    /// Elasticsearch username for basic auth.
    #[arg(long, env = "ELASTICSEARCH_USERNAME")]
    pub elasticsearch_username: Option<String>,

    /// Elasticsearch password for basic auth.
    #[arg(long, env = "ELASTICSEARCH_PASSWORD")]
    pub elasticsearch_password: Option<String>,

    /// Elasticsearch request timeout (e.g. "30s").
    #[arg(
        long,
        env = "ELASTICSEARCH_REQUEST_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub request_timeout: Duration,

    /// Number of bulk requests that may be in flight at once.
    #[arg(long, env = "BULK_WORKERS", default_value = "2")]
    pub bulk_workers: usize,

    /// Flush a bulk request once it holds this many items.
    #[arg(long, env = "BULK_REQUESTS", default_value = "1000")]
    pub bulk_requests: usize,

    /// Flush a bulk request once it holds this many bytes.
    #[arg(long, env = "BULK_SIZE", default_value = "2097152")]
    pub bulk_size: usize,

    /// Flush a partial bulk request after this long.
    #[arg(
        long,
        env = "FLUSH_INTERVAL",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub flush_interval: Duration,

    /// Delay between attempts to connect to Elasticsearch.
    #[arg(
        long,
        env = "CONNECT_RETRY_INTERVAL",
        default_value = "1m",
        value_parser = humantime::parse_duration
    )]
    pub connect_retry_interval: Duration,

    /// Author service base URL.
    #[arg(long, env = "AUTHOR_API_URL")]
    pub author_api_url: Option<String>,

    /// Author service username.
    #[arg(long, env = "AUTHOR_API_USERNAME")]
    pub author_api_username: Option<String>,

    /// Author service password.
    #[arg(long, env = "AUTHOR_API_PASSWORD")]
    pub author_api_password: Option<String>,

    /// How often to refresh author identifiers.
    #[arg(
        long,
        env = "AUTHOR_REFRESH_INTERVAL",
        default_value = "5m",
        value_parser = humantime::parse_duration
    )]
    pub author_refresh_interval: Duration,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            elasticsearch_endpoint: "http://localhost:9200".to_string(),
            elasticsearch_index: "concepts".to_string(),
            elasticsearch_username: None,
            elasticsearch_password: None,
            request_timeout: Duration::from_secs(30),
            bulk_workers: 2,
            bulk_requests: 1000,
            bulk_size: 2 * 1024 * 1024,
            flush_interval: Duration::from_secs(10),
            connect_retry_interval: Duration::from_secs(60),
            author_api_url: None,
            author_api_username: None,
            author_api_password: None,
            author_refresh_interval: Duration::from_secs(300),
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Builds the index client configuration.
    pub fn index_config(&self) -> IndexConfig {
        let nodes = self
            .elasticsearch_endpoint
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let auth = match (&self.elasticsearch_username, &self.elasticsearch_password) {
            (Some(username), Some(password)) => Some(ElasticsearchAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        IndexConfig {
            nodes,
            index_name: self.elasticsearch_index.clone(),
            request_timeout_ms: self.request_timeout.as_millis() as u64,
            auth,
            retry_interval: self.connect_retry_interval,
            batch: BatchPolicy {
                workers: self.bulk_workers,
                max_items: self.bulk_requests,
                max_bytes: self.bulk_size,
                flush_interval: self.flush_interval,
            },
            ..Default::default()
        }
    }

    /// Builds the author source configuration, if an author service is set.
    pub fn author_source_config(&self) -> Option<AuthorSourceConfig> {
        let base_url = self.author_api_url.as_deref()?.trim();
        if base_url.is_empty() {
            return None;
        }

        let mut config = AuthorSourceConfig::new(base_url);
        config.username = self.author_api_username.clone();
        config.password = self.author_api_password.clone();
        config.request_timeout_ms = self.request_timeout.as_millis() as u64;
        Some(config)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.index_config().validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if self.elasticsearch_username.is_some() != self.elasticsearch_password.is_some() {
            errors.push("Elasticsearch username and password must be set together".to_string());
        }

        if self.author_source_config().is_some() && self.author_refresh_interval.is_zero() {
            errors.push("Author refresh interval cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.elasticsearch_index, "concepts");
        assert_eq!(config.bulk_workers, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_matches_default() {
        let parsed = ServiceConfig::try_parse_from(["concept-rw"]).unwrap();
        let default = ServiceConfig::default();
        assert_eq!(parsed.index_config().batch, default.index_config().batch);
        assert_eq!(parsed.connect_retry_interval, default.connect_retry_interval);
        assert_eq!(parsed.author_refresh_interval, default.author_refresh_interval);
    }

    #[test]
    fn test_parse_durations() {
        let config = ServiceConfig::try_parse_from([
            "concept-rw",
            "--flush-interval",
            "250ms",
            "--connect-retry-interval",
            "30s",
        ])
        .unwrap();
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.index_config().retry_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_index_config_splits_nodes() {
        let config = ServiceConfig {
            elasticsearch_endpoint: "http://es1:9200, http://es2:9200,".to_string(),
            elasticsearch_username: Some("elastic".to_string()),
            elasticsearch_password: Some("changeme".to_string()),
            bulk_requests: 500,
            ..Default::default()
        };
        let index = config.index_config();
        assert_eq!(index.nodes, vec!["http://es1:9200", "http://es2:9200"]);
        assert_eq!(index.batch.max_items, 500);
        assert_eq!(index.request_timeout_ms, 30000);
        assert!(matches!(index.auth, Some(ElasticsearchAuth::Basic { .. })));
    }

    #[test]
    fn test_author_source_optional() {
        assert!(ServiceConfig::default().author_source_config().is_none());

        let config = ServiceConfig {
            author_api_url: Some("http://authors:8080".to_string()),
            author_api_username: Some("user".to_string()),
            ..Default::default()
        };
        let source = config.author_source_config().unwrap();
        assert_eq!(source.base_url, "http://authors:8080");
        assert_eq!(source.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_validate_reports_problems() {
        let config = ServiceConfig {
            elasticsearch_endpoint: " ".to_string(),
            bulk_workers: 0,
            elasticsearch_username: Some("elastic".to_string()),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("node")));
        assert!(errors.iter().any(|e| e.contains("worker")));
        assert!(errors.iter().any(|e| e.contains("password")));
    }
}
