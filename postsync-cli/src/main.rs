//! postsync: offline-first sync for posts, comments and users.
//!
//! Usage:
//!   postsync status
//!   postsync sync
//!   postsync posts --start 0 --limit 20
//!   postsync watch
//!
//! Local changes live in a SQLite database (`--db`) and are replayed
//! against the remote API whenever it is reachable.

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use postsync_cli::{
    load_config, posts_json, render_posts, render_refresh, render_report, render_status,
};
use postsync_storage::SqliteStore;
use postsync_sync::{ConnectivityProbe, HttpProbe, Severity, SyncEngine};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "postsync")]
#[command(about = "Offline-first sync for posts, comments and users")]
struct Args {
    /// Path to the local database
    #[arg(long, default_value = "postsync.db")]
    db: PathBuf,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the remote API (overrides the config file)
    #[arg(long)]
    api_url: Option<String>,

    /// Start offline without probing the remote
    #[arg(long)]
    offline: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay local changes against the remote once
    Sync,
    /// Pull every collection from the remote
    Refresh,
    /// Show record counts by sync status
    Status,
    /// List posts with author names and comment counts
    Posts {
        #[arg(long, default_value = "0")]
        start: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Probe connectivity and sync automatically until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(args.config.as_deref(), args.api_url.as_deref())?;
    let store = Arc::new(
        SqliteStore::open(&args.db)
            .with_context(|| format!("Failed to open database {}", args.db.display()))?,
    );

    let probe: Arc<dyn ConnectivityProbe> =
        Arc::new(HttpProbe::new(&config.remote).context("Failed to build connectivity probe")?);
    let online = !args.offline && probe.probe().await;
    if !online {
        warn!("Remote unreachable, working offline");
    }

    let engine = SyncEngine::with_http(config, store, online)
        .context("Failed to start sync engine")?;

    match args.command {
        Command::Sync => {
            let report = engine.sync_now().await.context("Sync failed")?;
            print!("{}", render_report(&report));
        }
        Command::Refresh => {
            let report = engine.refresh().await;
            print!("{}", render_refresh(&report));
        }
        Command::Status => {
            let summary = engine.status().await.context("Failed to read status")?;
            println!("{}", if online { "Online" } else { "Offline" });
            print!("{}", render_status(&summary));
        }
        Command::Posts { start, limit, json } => {
            let posts = engine
                .enhanced_posts(start, limit)
                .await
                .context("Failed to list posts")?;
            if json {
                println!("{}", posts_json(&posts)?);
            } else {
                print!("{}", render_posts(&posts));
            }
        }
        Command::Watch => watch(&engine, probe, online).await?,
    }

    Ok(())
}

async fn watch(engine: &SyncEngine, probe: Arc<dyn ConnectivityProbe>, online: bool) -> Result<()> {
    let mut notifications = engine.notifications();
    engine.start_auto_sync();
    engine.start_probe(probe);

    if online {
        let report = engine.sync_now().await.context("Initial sync failed")?;
        print!("{}", render_report(&report));
    }
    info!("Watching connectivity, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            received = notifications.recv() => match received {
                Ok(notification) => match notification.severity() {
                    Severity::Info => info!("{}", notification),
                    Severity::Error => warn!("{}", notification),
                },
                Err(RecvError::Lagged(missed)) => warn!("Missed {} notifications", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.shutdown();
    Ok(())
}
