//! Elasticsearch backend implementation.
//!
//! All concepts share a single index (see
//! [`IndexConfig::index_name`](crate::config::IndexConfig::index_name)).
//! A concept's document ID is `{concept_type}_{id}`.
//!
//! | Operation | Elasticsearch API |
//! |-----------|-------------------|
//! | upsert | `PUT {index}/_doc/{id}` |
//! | get | `GET {index}/_doc/{id}` |
//! | delete | `DELETE {index}/_doc/{id}` |
//! | bulk | `POST {index}/_bulk` (index actions) |
//! | cluster health | `GET _cluster/health` |
//!
//! # Example
//!
//! ```ignore
//! use concept_rw_index::backends::elasticsearch::ElasticsearchStore;
//! use concept_rw_index::config::IndexConfig;
//!
//! let config = IndexConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! };
//! let store = ElasticsearchStore::connect(&config).await?;
//! ```

mod backend;
mod storage;

pub use backend::ElasticsearchStore;
