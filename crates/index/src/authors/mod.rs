//! Cached author identifiers.
//!
//! The [`AuthorDirectory`] keeps the full set of known author identifiers as
//! an immutable [`AuthorSnapshot`]. A refresh builds a complete new snapshot
//! and swaps it in atomically, so membership queries never block on a refresh
//! and never see a partially built set. A failed refresh keeps the previous
//! snapshot.

mod http;

pub use http::{AuthorSourceConfig, HttpAuthorSource};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::IndexResult;

/// An immutable set of author identifiers fetched at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorSnapshot {
    /// When the identifiers were fetched.
    pub as_of: DateTime<Utc>,
    /// The identifiers.
    pub ids: HashSet<String>,
}

impl AuthorSnapshot {
    /// Creates a snapshot taken now.
    pub fn new(ids: HashSet<String>) -> Self {
        Self {
            as_of: Utc::now(),
            ids,
        }
    }

    /// The snapshot in place before the first successful refresh.
    pub fn empty() -> Self {
        Self {
            as_of: DateTime::<Utc>::UNIX_EPOCH,
            ids: HashSet::new(),
        }
    }

    /// Returns true if `id` is in this snapshot.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the snapshot holds no identifiers.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Where author identifiers come from.
#[async_trait]
pub trait AuthorSource: Send + Sync {
    /// Fetches the complete identifier set.
    async fn fetch_ids(&self) -> IndexResult<HashSet<String>>;

    /// Checks that the source answers, regardless of any cached data.
    async fn check_available(&self) -> IndexResult<()>;
}

/// Membership queries over a periodically refreshed author snapshot.
pub struct AuthorDirectory {
    source: Arc<dyn AuthorSource>,
    current: ArcSwap<AuthorSnapshot>,
}

impl std::fmt::Debug for AuthorDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("AuthorDirectory")
            .field("as_of", &snapshot.as_of)
            .field("ids", &snapshot.len())
            .finish_non_exhaustive()
    }
}

impl AuthorDirectory {
    /// Creates a directory with an empty snapshot; call [`refresh`](Self::refresh)
    /// to populate it.
    pub fn new(source: Arc<dyn AuthorSource>) -> Self {
        Self {
            source,
            current: ArcSwap::from_pointee(AuthorSnapshot::empty()),
        }
    }

    /// Fetches the identifier set and replaces the current snapshot.
    ///
    /// On error the current snapshot is left untouched.
    pub async fn refresh(&self) -> IndexResult<()> {
        let ids = self.source.fetch_ids().await?;
        let snapshot = AuthorSnapshot::new(ids);
        info!(count = snapshot.len(), "Author identifiers refreshed");
        self.current.store(Arc::new(snapshot));
        Ok(())
    }

    /// Returns true if `id` is a known author in the current snapshot.
    pub fn is_member(&self, id: &str) -> bool {
        self.current.load().contains(id)
    }

    /// Checks the remote source's liveness.
    pub async fn is_available(&self) -> IndexResult<()> {
        self.source.check_available().await
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<AuthorSnapshot> {
        self.current.load_full()
    }

    /// Refreshes every `period` until `shutdown` is cancelled.
    ///
    /// The first refresh runs immediately. Failures are logged and the old
    /// snapshot is kept.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let directory = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let refresh = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = directory.refresh() => result,
                };
                if let Err(e) = refresh {
                    warn!(
                        error = %e,
                        as_of = %directory.snapshot().as_of,
                        "Author refresh failed, keeping previous snapshot"
                    );
                }
            }

            debug!("Author refresher stopped");
        })
    }
}
