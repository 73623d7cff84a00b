mod api;
mod archive;
mod models;
mod utils;

use actix_web::{web, App, HttpServer};
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::api::routes;
use crate::archive::engine::ArchiveEngine;
use crate::models::config::AppConfig;
use crate::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "A selective telemetry packet archiver with REST API")]
struct Args {
    /// Port for the REST API server
    #[clap(short, long, default_value = "3000")]
    port: u16,

    /// Location of the persisted-state file
    #[clap(long, default_value = "pktarchive_state.json")]
    state_file: PathBuf,

    /// Filter table image (JSON) to load at startup
    #[clap(long)]
    filter_table: Option<PathBuf>,

    /// Destination table image (JSON) to load at startup
    #[clap(long)]
    dest_table: Option<PathBuf>,

    /// Start with archiving disabled when no persisted state exists
    #[clap(long)]
    start_disabled: bool,

    /// Seconds between file management passes
    #[clap(long, default_value = "1")]
    tick_secs: u64,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,
}

/// Read and parse a whole-table JSON image
fn load_table_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read table file {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse table file {}", path.display()))
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger with specified level
    logging::init_logger(logging::get_log_level(&args.log_level));

    info!("Starting pktarchive v{}", env!("CARGO_PKG_VERSION"));

    // Create application config
    let config = AppConfig {
        port: args.port,
        state_file: args.state_file,
        filter_table: args.filter_table,
        dest_table: args.dest_table,
        enable_default: !args.start_disabled,
    };

    // Initialize the archive engine, restoring persisted state
    let mut engine = ArchiveEngine::new(&config);

    // Load startup table images; a rejected table is a startup error here,
    // while tables loaded over the API leave the prior image authoritative
    if let Some(path) = &config.dest_table {
        let summary = engine.load_dest_table(load_table_file(path)?);
        if !summary.is_ok() {
            bail!(
                "destination table {} rejected: {}",
                path.display(),
                summary.first_error.unwrap_or_default()
            );
        }
    }
    if let Some(path) = &config.filter_table {
        let summary = engine.load_filter_table(load_table_file(path)?);
        if !summary.is_ok() {
            bail!(
                "filter table {} rejected: {}",
                path.display(),
                summary.first_error.unwrap_or_default()
            );
        }
    }

    let engine = Arc::new(RwLock::new(engine));

    // Create a shared state for our application
    let app_state = web::Data::new(engine.clone());

    // Periodic management pass: ages files, snapshots rates, rotates on age
    let tick_engine = engine.clone();
    let tick_secs = args.tick_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
        // The first interval tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            tick_engine.write().await.management_tick(tick_secs as u32);
        }
    });

    info!("Starting pktarchive API server on port {}", config.port);

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind(format!("127.0.0.1:{}", config.port))?
    .run()
    .await?;

    // Server stopped (ctrl-c): finalize open files and save state
    info!("Shutting down, closing archive files");
    engine.write().await.shutdown();

    Ok(())
}
