//! Risa CLI
//!
//! Runs the analytics collector and provides request-signing helpers.
//!
//! # Commands
//!
//! - `serve` - Run the collector against PostgreSQL
//! - `sign` - Print the signature for a set of query parameters
//! - `canonical` - Print the canonical signing string
//! - `version` - Show version information

use clap::{Parser, Subcommand};
use risa_collector::{
    sign, CollectorConfig, CollectorServer, PgStore, QueryParams, ServerError, ENV_SECRET,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Risa analytics collector.
#[derive(Parser)]
#[command(name = "risa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collector (configuration from RISA_* environment variables)
    Serve {
        /// Port to listen on (overrides RISA_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// PostgreSQL connection string (overrides RISA_PG_URL)
        #[arg(short, long)]
        database_url: Option<String>,

        /// Allowed CORS origin (overrides RISA_ALLOW_ORIGIN)
        #[arg(short, long)]
        allow_origin: Option<String>,
    },

    /// Print the signature for key=value query parameters
    Sign {
        /// Shared secret (defaults to RISA_SECRET)
        #[arg(short, long)]
        secret: Option<String>,

        /// Parameters as key=value
        #[arg(value_parser = parse_param, required = true)]
        params: Vec<(String, String)>,
    },

    /// Print the canonical signing string for key=value query parameters
    Canonical {
        /// Parameters as key=value
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Show version information
    Version,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins when set.
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            port,
            database_url,
            allow_origin,
        } => {
            serve(port, database_url, allow_origin).await?;
        }
        Commands::Sign { secret, params } => {
            let secret = secret
                .or_else(|| std::env::var(ENV_SECRET).ok())
                .filter(|s| !s.is_empty())
                .ok_or("Shared secret required: pass --secret or set RISA_SECRET")?;
            let params: QueryParams = params.into_iter().collect();
            println!("{}", sign(&params, secret.as_bytes()));
        }
        Commands::Canonical { params } => {
            let params: QueryParams = params.into_iter().collect();
            println!("{}", params.canonical());
        }
        Commands::Version => {
            println!("Risa CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn serve(
    port: Option<u16>,
    database_url: Option<String>,
    allow_origin: Option<String>,
) -> Result<(), ServerError> {
    let mut config = CollectorConfig::from_env()?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(url) = database_url {
        config = config.with_database_url(url);
    }
    if let Some(origin) = allow_origin {
        config = config.with_allow_origin(origin);
    }

    let url = config
        .database_url
        .clone()
        .ok_or_else(|| ServerError::config("database url required: set RISA_PG_URL"))?;
    let store = PgStore::connect(&url, config.max_connections).await?;
    info!(max_connections = config.max_connections, "connected to postgres");

    CollectorServer::new(config, Arc::new(store))?.serve().await
}
