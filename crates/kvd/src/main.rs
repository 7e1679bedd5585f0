//! kvd - RESP server in front of the kvcache LRU store

mod error;
mod handler;
mod resp;
mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use kvcache::{Guarded, LruStore, SharedStorage, DEFAULT_MAX_SIZE};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    bind: String,

    /// Cache size limit in bytes (keys plus values)
    #[arg(short, long, default_value_t = DEFAULT_MAX_SIZE)]
    max_size: usize,

    /// Maximum number of connections served at once
    #[arg(short = 'c', long, default_value_t = 100)]
    max_connections: usize,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting kvd v{}", env!("CARGO_PKG_VERSION"));
    info!("Cache size limit: {} bytes", args.max_size);
    info!("Connection limit: {}", args.max_connections);

    let storage: Arc<dyn SharedStorage> = Arc::new(Guarded::new(LruStore::new(args.max_size)));

    let listener = TcpListener::bind(&args.bind).await?;
    info!("Server listening on {}", args.bind);

    server::serve(listener, storage, args.max_connections, shutdown_signal()).await
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
