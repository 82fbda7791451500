//! Concept read/write service.
//!
//! Connects to Elasticsearch in the background, keeps the author directory
//! fresh, and drains pending bulk writes on shutdown.

mod config;

use std::sync::Arc;

use clap::Parser;
use concept_rw_index::authors::{AuthorDirectory, HttpAuthorSource};
use concept_rw_index::backends::elasticsearch::ElasticsearchStore;
use concept_rw_index::batch::LoggingFailureSink;
use concept_rw_index::client::IndexClient;
use concept_rw_index::error::IndexError;
use concept_rw_index::store::ConceptStore;
use concept_rw_index::supervisor::ConnectionSupervisor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServiceConfig;

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("concept_rw_index={},concept_rw={}", level, level))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let index_config = config.index_config();
    info!(
        nodes = ?index_config.nodes,
        index = %index_config.index_name,
        workers = index_config.batch.workers,
        max_items = index_config.batch.max_items,
        flush_interval = %humantime::format_duration(index_config.batch.flush_interval),
        "Starting concept read/write service"
    );

    let shutdown = CancellationToken::new();
    let (failure_sink, failure_logger) = LoggingFailureSink::spawn();
    let client = IndexClient::new(&index_config, Arc::new(failure_sink))?;

    let supervisor = ConnectionSupervisor::new(index_config.retry_interval, shutdown.clone());
    let connector = {
        let index_config = index_config.clone();
        client.connect_in_background(supervisor, move || {
            let index_config = index_config.clone();
            async move {
                let store = ElasticsearchStore::connect(&index_config).await?;
                Ok::<Arc<dyn ConceptStore>, IndexError>(Arc::new(store))
            }
        })
    };

    let refresher = match config.author_source_config() {
        Some(source_config) => {
            let source = HttpAuthorSource::new(&source_config)?;
            let directory = Arc::new(AuthorDirectory::new(Arc::new(source)));
            info!(
                url = %source_config.base_url,
                period = %humantime::format_duration(config.author_refresh_interval),
                "Author directory enabled"
            );
            Some(directory.spawn_refresher(config.author_refresh_interval, shutdown.clone()))
        }
        None => {
            info!("No author service configured, author directory disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();

    // No connection can be installed once the connector has stopped.
    connector.await?;
    if let Some(refresher) = refresher {
        refresher.await?;
    }

    if let Err(e) = client.close().await {
        warn!(error = %e, "Bulk queue closed with errors");
    }
    if let Some(stats) = client.bulk_stats().await {
        info!(
            batches = stats.batches_submitted,
            items = stats.items_submitted,
            failed = stats.items_failed,
            "Bulk writes flushed"
        );
    }

    // The failure logger exits once the client's sink is gone.
    drop(client);
    failure_logger.await?;

    info!("Concept read/write service stopped");
    Ok(())
}
