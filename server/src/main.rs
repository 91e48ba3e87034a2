//! # NAS Indexer Server
//!
//! Binary entry point for the NAS content indexing pipeline.
//!
//! The default subcommand runs the full pipeline in one process (watcher,
//! extractor pool, thumbnail pool, and query API, each as its own task set) -
//! the intended deployment shape for a single-node NAS. Individual
//! components can also be run standalone for split deployment or debugging,
//! and two maintenance subcommands (`cleanup`, `reset`) operate on the state
//! store and index directly.

mod maintenance;
mod query_api;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nas_indexer_core::config::Config;
use nas_indexer_core::index_client::IndexClient;
use nas_indexer_core::state_store::StateStore;
use nas_indexer_core::{extractor, thumbnail, watcher::Watcher};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nas-indexer-server", about = "NAS content indexing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: watcher, extractor pool, thumbnail pool, and query API (default)
    Run,
    /// Run only the filesystem watcher and scanner
    Watch,
    /// Run only the extractor worker pool
    Extract,
    /// Run only the thumbnail worker pool
    Thumbnail,
    /// Run only the read-only query API
    QueryApi,
    /// Find and report (or remove) duplicate index documents sharing a file_path
    Cleanup {
        /// Actually delete duplicates instead of only reporting them
        #[arg(long)]
        execute: bool,
        /// Use the index's own facet counts instead of paging every document
        #[arg(long)]
        fast: bool,
    },
    /// Clear state-store bookkeeping keys (processed/queued sets, locks, hashes)
    Reset {
        /// Actually delete the keys instead of only reporting what would be removed
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nas_indexer_server=info,nas_indexer_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    info!(volumes = config.volumes.len(), "configuration loaded");

    let store = StateStore::connect(&config.redis_url)
        .await
        .context("failed to connect to state store")?;
    let index = IndexClient::new(&config.solr_url, config.operation_timeout)
        .context("failed to build index client")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_pipeline(store, index, config).await,
        Command::Watch => run_watch_only(store, config).await,
        Command::Extract => run_extract_only(store, index, config).await,
        Command::Thumbnail => run_thumbnail_only(store, config).await,
        Command::QueryApi => run_query_api_only(store, index, config).await,
        Command::Cleanup { execute, fast } => {
            let report = maintenance::cleanup::run(&index, execute, fast).await?;
            maintenance::cleanup::print_report(&report, execute);
            Ok(())
        }
        Command::Reset { execute } => {
            let report = maintenance::reset::run(&store, execute).await?;
            maintenance::reset::print_report(&report, execute);
            Ok(())
        }
    }
}

/// Runs every component as its own task set under one shutdown signal,
/// triggered by Ctrl+C (SIGINT) or SIGTERM.
async fn run_pipeline(store: StateStore, index: IndexClient, config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = Watcher::new(store.clone(), &config);
    let watcher_handle = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = watcher.run(shutdown_rx).await {
                warn!(error = %err, "watcher exited with error");
            }
        })
    };

    let extractor_handle = {
        let store = store.clone();
        let index = index.clone();
        let config = config.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(extractor::run_workers(store, index, config, shutdown_rx))
    };

    let thumbnail_handle = {
        let store = store.clone();
        let config = config.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(thumbnail::run_workers(store, config, shutdown_rx))
    };

    let query_api_handle = {
        let store = store.clone();
        let index = index.clone();
        let config = config.clone();
        tokio::spawn(async move { serve_query_api(store, index, config, shutdown_rx).await })
    };

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping all components");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(watcher_handle, extractor_handle, thumbnail_handle, query_api_handle);
    info!("pipeline stopped");
    Ok(())
}

async fn run_watch_only(store: StateStore, config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = Watcher::new(store, &config);
    let handle = tokio::spawn(async move { watcher.run(shutdown_rx).await });
    wait_for_shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    handle.await??;
    Ok(())
}

async fn run_extract_only(store: StateStore, index: IndexClient, config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(extractor::run_workers(store, index, config, shutdown_rx));
    wait_for_shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

async fn run_thumbnail_only(store: StateStore, config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(thumbnail::run_workers(store, config, shutdown_rx));
    wait_for_shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

async fn run_query_api_only(store: StateStore, index: IndexClient, config: Config) -> Result<()> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    serve_query_api(store, index, config, shutdown_rx).await
}

async fn serve_query_api(
    store: StateStore,
    index: IndexClient,
    config: Config,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let state = query_api::AppState {
        index,
        store,
        thumbnail_dir: config.thumbnail_dir.clone(),
    };
    let app = query_api::router(state);

    let addr: SocketAddr = config
        .query_api_bind
        .parse()
        .with_context(|| format!("invalid query_api_bind address {:?}", config.query_api_bind))?;
    info!(%addr, "query API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
