//! Thing Registry RPC Server - JSON-RPC and WebSocket front end.
//!
//! This binary wraps the thing-registry library: registry operations are
//! served as JSON-RPC 2.0 over HTTP, device adapters report into the local
//! discovery subsystem, and new devices are pushed to WebSocket subscribers.

mod handler;
mod server;
mod ws;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use thing_registry::{AddressConfig, LocalDiscovery, PathsConfig, ThingsApi};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "thing-rpc")]
#[command(about = "JSON-RPC server for the Thing Registry")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// SQLite database file (defaults to the user data directory)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Address prefix for things
    #[arg(long, default_value = PathsConfig::THINGS_PATH)]
    things_path: String,

    /// Address segment for properties
    #[arg(long, default_value = PathsConfig::PROPERTIES_PATH)]
    properties_path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Thing Registry RPC Server");

    let discovery = Arc::new(LocalDiscovery::new());
    let mut builder = ThingsApi::builder()
        .discovery(discovery.clone())
        .addresses(AddressConfig::new(args.things_path, args.properties_path));
    if let Some(db_path) = args.db_path {
        info!("Database: {}", db_path.display());
        builder = builder.db_path(db_path);
    }
    let api = builder.build()?;

    // Start the server
    let addr = server::start_server(api, discovery, &args.host, args.port).await?;

    // Print port for the parent process to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
