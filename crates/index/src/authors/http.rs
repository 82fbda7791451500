//! HTTP author source.
//!
//! | Request | Purpose |
//! |---------|---------|
//! | `GET {base}/__ids` | Newline-delimited JSON, one `{"uuid": ...}` (or `{"id": ...}`) per line |
//! | `GET {base}/__gtg` | Liveness; any 2xx status means available |

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{DirectoryError, IndexResult};

use super::AuthorSource;

fn default_request_timeout_ms() -> u64 {
    30000
}

/// Where to fetch author identifiers from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorSourceConfig {
    /// Base URL of the author service.
    pub base_url: String,

    /// Basic auth user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password; ignored without a user name.
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl AuthorSourceConfig {
    /// Creates a configuration without credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Fetches author identifiers from a remote HTTP service.
#[derive(Debug, Clone)]
pub struct HttpAuthorSource {
    http: Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpAuthorSource {
    /// Creates a source from configuration.
    pub fn new(config: &AuthorSourceConfig) -> IndexResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| DirectoryError::Unavailable {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(format!("{}/{}", self.base_url, path));
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        }
    }
}

#[async_trait]
impl AuthorSource for HttpAuthorSource {
    async fn fetch_ids(&self) -> IndexResult<HashSet<String>> {
        let response = self
            .get("__ids")
            .send()
            .await
            .map_err(|e| refresh_error(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(refresh_error(format!("author service returned status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| refresh_error(format!("failed to read response: {}", e)))?;
        let ids = parse_id_lines(&body)?;
        debug!(count = ids.len(), "Fetched author identifiers");
        Ok(ids)
    }

    async fn check_available(&self) -> IndexResult<()> {
        let response = self
            .get("__gtg")
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DirectoryError::Unavailable {
                message: format!("good-to-go returned status {}", response.status()),
            }
            .into());
        }
        Ok(())
    }
}

fn refresh_error(message: String) -> crate::error::IndexError {
    DirectoryError::Refresh { message }.into()
}

/// Parses newline-delimited `{"uuid": ...}` objects. Blank lines are skipped;
/// any other malformed line fails the whole parse.
pub(crate) fn parse_id_lines(body: &str) -> IndexResult<HashSet<String>> {
    let mut ids = HashSet::new();

    for (number, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line)
            .map_err(|e| refresh_error(format!("line {}: {}", number + 1, e)))?;
        let id = value
            .get("uuid")
            .or_else(|| value.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| refresh_error(format!("line {}: no uuid field", number + 1)))?;
        ids.insert(id.to_string());
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_lines() {
        let body = "{\"uuid\":\"a1\"}\n\n{\"id\":\"b2\"}\n{\"uuid\":\"a1\"}\n";
        let ids = parse_id_lines(body).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a1"));
        assert!(ids.contains("b2"));
    }

    #[test]
    fn test_parse_id_lines_rejects_malformed() {
        let err = parse_id_lines("{\"uuid\":\"a1\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = parse_id_lines("{\"name\":\"x\"}").unwrap_err();
        assert!(err.to_string().contains("no uuid"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let source = HttpAuthorSource::new(&AuthorSourceConfig::new("http://authors:8080/")).unwrap();
        assert_eq!(source.base_url, "http://authors:8080");
        assert!(source.credentials.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_source_is_unavailable() {
        let mut config = AuthorSourceConfig::new("http://127.0.0.1:1");
        config.request_timeout_ms = 500;
        let source = HttpAuthorSource::new(&config).unwrap();

        assert!(source.check_available().await.is_err());
        assert!(source.fetch_ids().await.is_err());
    }
}
