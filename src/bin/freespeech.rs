//! Free Speech daemon binary
//!
//! Loads configuration, starts the node and runs until interrupted.

use clap::Parser;
use freespeech::{Config, MemoryStore, Node};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Free Speech peer-to-peer node
#[derive(Parser, Debug)]
#[command(name = "freespeech", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Additional public endpoint port
    #[arg(short, long, value_name = "PORT")]
    port: Vec<u16>,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("Free Speech starting");

    let (mut config, loaded_paths) = match Config::load_or_search(args.config.as_deref()) {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    config.endpoints.extend(args.port);

    if !config.has_identity() {
        warn!("No key file configured, the identity lives only in memory");
    }

    let node = match Node::start(config, MemoryStore::new()).await {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to start node: {}", e);
            std::process::exit(1);
        }
    };

    info!("  thumbprint: {}", node.thumbprint());
    info!("  client: {}", node.client().local_addr());
    for port in node.list_public_endpoints() {
        info!("  public endpoint: {}", port);
    }

    for (hop, result) in node.connect_first_hops().await {
        if result.is_err() {
            warn!(address = %hop.address, "Continuing without first hop");
        }
    }

    info!("Free Speech running, press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    node.stop().await;

    info!("Free Speech shutdown complete");
}
