//! kvlink Server Binary
//!
//! Serves an in-memory store over TCP or a Unix-domain socket.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kvlink::{Address, Config, MemoryStore, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// kvlink Server
#[derive(Parser, Debug)]
#[command(name = "kvlink-server")]
#[command(about = "Serve a key-value store over a socket")]
#[command(version)]
struct Args {
    /// Unix-domain socket path (takes precedence over host/port)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Listen host
    #[arg(long, default_value = kvlink::config::DEFAULT_HOST)]
    host: String,

    /// Listen port
    #[arg(short, long, default_value_t = kvlink::config::DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Close connections idle for this long (milliseconds, 0 = never)
    #[arg(long, default_value = "0")]
    idle_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvlink=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("kvlink Server v{}", kvlink::VERSION);

    // Build config from args
    let address = Address::from_parts(args.file, Some(args.host), Some(args.port));
    let config = Config::builder()
        .address(address)
        .max_connections(args.max_connections)
        .idle_timeout_ms(args.idle_timeout_ms)
        .build();

    let store = Arc::new(MemoryStore::new());

    let mut server = match Server::bind(config, store) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
