//! kvlink CLI Client
//!
//! Command-line interface for one-shot operations against a kvlink server.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kvlink::{Address, Channel, Config, Options};
use tracing_subscriber::{fmt, EnvFilter};

/// kvlink CLI
#[derive(Parser, Debug)]
#[command(name = "kvlink-cli")]
#[command(about = "CLI for a kvlink key-value server")]
struct Args {
    /// Unix-domain socket path (takes precedence over host/port)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// How long to wait for a reply (milliseconds, 0 = forever)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a key exists
    Exists {
        /// The key to check
        key: String,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Remove every key
    Clear,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> kvlink::Result<()> {
    let config = Config::builder()
        .address(Address::from_parts(args.file, args.host, args.port))
        .read_timeout_ms(args.timeout_ms)
        .build();

    let mut channel = Channel::open(&config)?;
    let options = Options::new();

    match args.command {
        Commands::Exists { key } => println!("{}", channel.key_exists(&key, &options)?),
        Commands::Get { key } => match channel.load(&key, &options)? {
            Some(value) => println!("{}", value),
            None => println!("(absent)"),
        },
        Commands::Set { key, value } => {
            channel.store(&key, value, &options)?;
            println!("OK");
        }
        Commands::Del { key } => println!("{}", channel.delete(&key, &options)?),
        Commands::Clear => {
            channel.clear(&options)?;
            println!("OK");
        }
    }

    channel.close()
}
