//! Error types for the index client.
//!
//! Errors are grouped by the component that raises them: the backing store
//! connection, the bulk batching pipeline, the author directory and
//! configuration. [`IndexError`] wraps all of them.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all index client operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Backing store errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Bulk batching errors
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Author directory errors
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IndexError {
    /// Returns true if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexError::Backend(
                BackendError::NoConnection
                    | BackendError::ConnectionFailed { .. }
                    | BackendError::Transport { .. }
                    | BackendError::Unavailable { .. }
            )
        )
    }

    /// Returns true if no connection to the backing store is installed yet.
    pub fn is_no_connection(&self) -> bool {
        matches!(self, IndexError::Backend(BackendError::NoConnection))
    }

    /// Returns the HTTP status reported by the backing store, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            IndexError::Backend(BackendError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Errors originating from the backing store or the connection to it.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No connection has been established yet.
    #[error("no connection to the backing store")]
    NoConnection,

    /// A connection attempt failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The request could not be sent or its response could not be read.
    #[error("transport error talking to {backend_name}: {message}")]
    Transport {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backing store answered with a non-success status.
    #[error("backing store returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The backing store is reachable but not healthy.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by the bulk batching pipeline.
#[derive(Error, Debug)]
pub enum BatchError {
    /// A whole batch could not be submitted.
    #[error("bulk submission of {items} items failed: {message}")]
    Submission { items: usize, message: String },

    /// The queue no longer accepts items.
    #[error("batch queue is closed")]
    QueueClosed,

    /// A submission worker stopped without reporting its outcome.
    #[error("bulk worker failed: {message}")]
    Worker { message: String },
}

/// Errors raised by the author directory.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Fetching the identifier set failed; the previous snapshot is kept.
    #[error("author refresh failed: {message}")]
    Refresh { message: String },

    /// The remote source did not answer its liveness probe.
    #[error("author source unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors in user-supplied configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more configuration values are invalid.
    #[error("invalid configuration: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },
}

/// Result type alias for index client operations.
pub type IndexResult<T> = Result<T, IndexError>;

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Backend(BackendError::Serialization {
            message: err.to_string(),
        })
    }
}

impl From<elasticsearch::Error> for BackendError {
    fn from(err: elasticsearch::Error) -> Self {
        BackendError::Transport {
            backend_name: "elasticsearch".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<elasticsearch::Error> for IndexError {
    fn from(err: elasticsearch::Error) -> Self {
        IndexError::Backend(err.into())
    }
}
