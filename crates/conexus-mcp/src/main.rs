//! Conexus MCP Server.
//!
//! Exposes search/retrieval/index-control/connector-management tools to
//! AI coding agents over line-delimited JSON-RPC 2.0 on stdio
//! (`spec.md` §4.8).

use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use conexus_core::config::Config;
use conexus_core::indexer::Indexer;
use conexus_mcp::server;

/// Conexus MCP server: indexes a repository and serves context lookups
/// over stdio.
#[derive(Parser, Debug)]
#[command(name = "conexus-mcp", version, about)]
struct Args {
    /// Path to the repository to index.
    #[arg(long, default_value = ".")]
    repo: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.repo).context("loading configuration")?;
    init_tracing(&config.logging);

    tracing::info!(repo = %config.repo_path.display(), provider = %config.embedding.provider, "conexus MCP server starting");

    let indexer = Indexer::new(config).context("initializing indexer")?;
    tracing::info!("conexus MCP server ready, awaiting requests on stdin");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let server = server::Server::new(indexer);
    server.run(BufReader::new(stdin.lock()), stdout.lock())?;

    tracing::info!("conexus MCP server terminated (input closed)");
    Ok(())
}

fn init_tracing(logging: &conexus_core::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logging.level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Logs must never share stdout with the JSON-RPC stream.
    let writer = std::io::stderr;
    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
    }
}
