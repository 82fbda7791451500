//! Concept read/write index client
//!
//! This crate is the persistence core of a concept read/write service. It
//! stores, retrieves and deletes JSON concept documents in an Elasticsearch
//! index, batches high-volume writes, and keeps working while the cluster is
//! unreachable at startup.
//!
//! # Features
//!
//! - **Resilient connection**: the first connection is obtained in the
//!   background with fixed-interval retries; until then every operation fails
//!   fast with [`BackendError::NoConnection`]
//! - **Atomic connection swap**: a new connection and its batch queue are
//!   installed together after the old queue is drained
//! - **Bulk batching**: writes are flushed by count, byte size or time, on a
//!   bounded pool of concurrent submissions
//! - **Author directory**: membership queries over a periodically refreshed,
//!   atomically replaced identifier snapshot
//!
//! # Architecture
//!
//! - [`client`] - The [`IndexClient`] facade and the connection swap protocol
//! - [`supervisor`] - Background connection establishment with retries
//! - [`batch`] - Bulk-write batching queue and failure reporting
//! - [`store`] - The [`ConceptStore`] trait over a backing store
//! - [`backends`] - Backing store implementations (Elasticsearch)
//! - [`authors`] - Cached author identifiers
//! - [`health`] - Connectivity and cluster-health checks
//! - [`config`] - Configuration types
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use concept_rw_index::config::{BatchPolicy, IndexConfig};
//! use concept_rw_index::batch::document_id;
//!
//! let config = IndexConfig {
//!     index_name: "concepts".to_string(),
//!     batch: BatchPolicy {
//!         workers: 4,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//!
//! // Documents of different concept types share one index.
//! assert_eq!(document_id("people", "42"), "people_42");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod authors;
pub mod backends;
pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod store;
pub mod supervisor;

// Re-export commonly used types at crate root
pub use client::{IndexClient, with_cancellation};
pub use config::{BatchPolicy, ElasticsearchAuth, IndexConfig};
pub use error::{BackendError, BatchError, ConfigError, DirectoryError, IndexError, IndexResult};
pub use store::{ClusterHealth, ClusterStatus, ConceptStore, WriteResult};

pub use authors::{AuthorDirectory, AuthorSnapshot, AuthorSource, HttpAuthorSource};
pub use batch::{FailedWrite, FailureSink, LoggingFailureSink};
pub use health::HealthProbe;
pub use supervisor::ConnectionSupervisor;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
