//! ConceptStore implementation for Elasticsearch.

use async_trait::async_trait;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::response::Response;
use elasticsearch::{BulkOperation, BulkParts, DeleteParts, GetParts, IndexParts};
use serde_json::Value;

use crate::batch::{BatchOutcome, WriteItem};
use crate::error::{BackendError, IndexError, IndexResult};
use crate::store::{ClusterHealth, ConceptStore, WriteResult};

use super::backend::{BACKEND_NAME, ElasticsearchStore};

fn transport_error(action: &str, err: elasticsearch::Error) -> IndexError {
    BackendError::Transport {
        backend_name: BACKEND_NAME.to_string(),
        message: format!("Failed to {}: {}", action, err),
        source: Some(Box::new(err)),
    }
    .into()
}

/// Turns a non-success response into a status error carrying the body.
async fn status_error(response: Response) -> IndexError {
    let status = response.status_code().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::Status {
        status,
        message: body,
    }
    .into()
}

async fn read_json(response: Response) -> IndexResult<Value> {
    response.json::<Value>().await.map_err(|e| {
        BackendError::Serialization {
            message: format!("Failed to parse Elasticsearch response: {}", e),
        }
        .into()
    })
}

#[async_trait]
impl ConceptStore for ElasticsearchStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn upsert(&self, index: &str, doc_id: &str, payload: &Value) -> IndexResult<WriteResult> {
        let response = self
            .client()
            .index(IndexParts::IndexId(index, doc_id))
            .body(payload)
            .send()
            .await
            .map_err(|e| transport_error("index document", e))?;

        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }

        let body = read_json(response).await?;
        Ok(parse_write_result(&body))
    }

    async fn get(&self, index: &str, doc_id: &str) -> IndexResult<Option<Value>> {
        let response = self
            .client()
            .get(GetParts::IndexId(index, doc_id))
            .send()
            .await
            .map_err(|e| transport_error("get document", e))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let body = read_json(response).await?;
        if !body.get("found").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn delete(&self, index: &str, doc_id: &str) -> IndexResult<bool> {
        let response = self
            .client()
            .delete(DeleteParts::IndexId(index, doc_id))
            .send()
            .await
            .map_err(|e| transport_error("delete document", e))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        Ok(true)
    }

    async fn bulk(&self, index: &str, items: &[WriteItem]) -> IndexResult<BatchOutcome> {
        if items.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let operations: Vec<BulkOperation<Value>> = items
            .iter()
            .map(|item| -> BulkOperation<Value> {
                BulkOperation::index(item.payload.clone())
                    .id(item.document_id())
                    .into()
            })
            .collect();

        let response = self
            .client()
            .bulk(BulkParts::Index(index))
            .body(operations)
            .send()
            .await
            .map_err(|e| transport_error("submit bulk request", e))?;

        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }

        let body = read_json(response).await?;
        let results = parse_bulk_items(&body)?;
        Ok(BatchOutcome::from_item_results(items, results))
    }

    async fn cluster_health(&self) -> IndexResult<ClusterHealth> {
        let response = self
            .client()
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| transport_error("fetch cluster health", e))?;

        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }

        let body = read_json(response).await?;
        Ok(serde_json::from_value(body)?)
    }
}

/// Reads `result` from an index response.
fn parse_write_result(body: &Value) -> WriteResult {
    match body.get("result").and_then(Value::as_str) {
        Some("created") => WriteResult::Created,
        _ => WriteResult::Updated,
    }
}

/// Extracts per-item results, in request order, from a bulk response.
pub(crate) fn parse_bulk_items(body: &Value) -> IndexResult<Vec<Result<(), String>>> {
    let items = body.get("items").and_then(Value::as_array).ok_or_else(|| {
        IndexError::from(BackendError::Serialization {
            message: "Bulk response has no items".to_string(),
        })
    })?;

    Ok(items
        .iter()
        .map(|entry| {
            // Each entry is keyed by its action name, e.g. {"index": {...}}.
            let result = entry
                .as_object()
                .and_then(|obj| obj.values().next())
                .cloned()
                .unwrap_or(Value::Null);

            if let Some(error) = result.get("error") {
                return Err(describe_item_error(error));
            }

            match result.get("status").and_then(Value::as_u64) {
                Some(status) if (200..300).contains(&status) => Ok(()),
                Some(status) => Err(format!("status {}", status)),
                None => Err("bulk item has no status".to_string()),
            }
        })
        .collect())
}

fn describe_item_error(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (Some(kind), None) => kind.to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => error.to_string(),
    }
}
