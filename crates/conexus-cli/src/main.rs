//! Conexus CLI.
//!
//! Command-line front end for the indexing pipeline and hybrid retrieval
//! engine (`spec.md` §6's black-box-testable surface): `index`, `search`,
//! `serve`, and `status`. Everything here is a thin shell around
//! `conexus-core`/`conexus-mcp` -- no engine logic lives in this crate.

use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use conexus_core::config::Config;
use conexus_core::error::{ConexusError, ConexusResult};
use conexus_core::indexer::Indexer;
use tokio_util::sync::CancellationToken;

/// Conexus -- project-local hybrid retrieval engine for AI coding agents.
#[derive(Parser, Debug)]
#[command(name = "conexus", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root to operate on.
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk, chunk, embed, and persist the repository into the local index.
    Index {
        /// Ignore the committed Merkle state and reindex every file.
        #[arg(long)]
        full: bool,
    },

    /// Query the hybrid (BM25 + vector) index.
    Search {
        /// Natural-language or keyword query.
        query: String,

        /// Maximum number of results to return.
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,

        /// Restrict results to a language tag (e.g. "rust", "python").
        #[arg(long)]
        language: Option<String>,

        /// Restrict results to files whose path starts with this prefix.
        #[arg(long)]
        path_prefix: Option<String>,
    },

    /// Run the MCP server: line-delimited JSON-RPC 2.0 over stdio.
    Serve,

    /// Report document counts, tracked files, and run state.
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.repo) {
        Ok(config) => config,
        Err(err) => return fail(&err),
    };
    init_tracing(&config.logging);

    let outcome = match cli.command {
        Commands::Index { full } => run_index(config, full),
        Commands::Search { query, top_k, language, path_prefix } => run_search(config, &query, top_k, language, path_prefix),
        Commands::Serve => run_serve(config),
        Commands::Status => run_status(config),
    };

    match outcome {
        Ok(()) => ExitCode::from(0),
        Err(err) => fail(&err),
    }
}

fn run_index(config: Config, full: bool) -> ConexusResult<()> {
    let indexer = Indexer::new(config)?;
    let cancel = CancellationToken::new();

    if full {
        // `index()` diffs against whatever Merkle state is on disk; dropping
        // it first makes every file look "added", forcing a full reindex
        // without duplicating the walk/diff/commit logic here.
        let state_file = indexer.config().merkle_state_file();
        if state_file.exists() {
            std::fs::remove_file(&state_file)?;
        }
    }
    let report = indexer.index(&cancel)?;

    println!("{}", serde_json::to_string_pretty(&report).map_err(ConexusError::from)?);
    tracing::info!(
        added = report.files_added,
        modified = report.files_modified,
        deleted = report.files_deleted,
        failed = report.files_failed,
        chunks = report.chunks_indexed,
        duration_ms = report.duration_ms,
        "index run complete"
    );
    Ok(())
}

fn run_search(config: Config, query: &str, top_k: usize, language: Option<String>, path_prefix: Option<String>) -> ConexusResult<()> {
    if query.trim().is_empty() {
        return Err(ConexusError::InvalidParams { message: "query must not be empty".into() });
    }
    if top_k == 0 {
        return Err(ConexusError::InvalidParams { message: "top_k must be >= 1".into() });
    }

    let indexer = Indexer::new(config)?;
    let query_vec = indexer.embed_query(query)?;

    let mut filters = std::collections::HashMap::new();
    if let Some(language) = &language {
        filters.insert("language".to_string(), serde_json::Value::String(language.clone()));
    }

    let search_config = indexer.config().search.clone();
    let limit = top_k.min(search_config.max_limit);
    let opts = conexus_core::types::SearchOptions { limit, filters, score_threshold: None };

    let mut results = indexer.store().search_hybrid(
        query,
        &query_vec,
        &opts,
        search_config.rrf_k,
        search_config.k_over,
        search_config.enable_rerank,
    )?;

    if let Some(prefix) = &path_prefix {
        results.retain(|r| r.document.file_path().is_some_and(|p| p.starts_with(prefix.as_str())));
    }

    for result in &results {
        let path = result.document.file_path().unwrap_or("<unknown>");
        let preview: String = result.document.content.lines().next().unwrap_or("").chars().take(100).collect();
        println!("{:>8.4}  {path}  {preview}", result.score);
    }
    if results.is_empty() {
        println!("no results");
    }
    Ok(())
}

fn run_serve(config: Config) -> ConexusResult<()> {
    tracing::info!(repo = %config.repo_path.display(), provider = %config.embedding.provider, "conexus MCP server starting");
    let indexer = Indexer::new(config)?;
    tracing::info!("conexus MCP server ready, awaiting requests on stdin");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let server = conexus_mcp::server::Server::new(indexer);
    server.run(BufReader::new(stdin.lock()), stdout.lock())?;

    tracing::info!("conexus MCP server terminated (input closed)");
    Ok(())
}

fn run_status(config: Config) -> ConexusResult<()> {
    let indexer = Indexer::new(config)?;
    let status = indexer.status()?;
    println!("{}", serde_json::to_string_pretty(&status).map_err(ConexusError::from)?);
    Ok(())
}

fn init_tracing(logging: &conexus_core::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logging.level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // CLI commands print machine-readable results to stdout; logs must
    // never share that stream (most visibly true for `serve`, whose stdout
    // is the JSON-RPC wire).
    let writer = std::io::stderr;
    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
    }
}

/// Exit code mapping (`spec.md` §6): `0` success, `1` user error (bad
/// input, bad path, not found), `2` internal error (storage, provider,
/// corrupt state, cancellation, or anything unclassified).
fn fail(err: &ConexusError) -> ExitCode {
    eprintln!("error: {err} (kind={})", err.kind());
    ExitCode::from(exit_code_for(err))
}

fn exit_code_for(err: &ConexusError) -> u8 {
    match err {
        ConexusError::InvalidParams { .. } | ConexusError::InvalidPath { .. } | ConexusError::PathTraversal { .. } | ConexusError::NotFound { .. } => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_exit_one() {
        assert_eq!(exit_code_for(&ConexusError::InvalidParams { message: "bad".into() }), 1);
        assert_eq!(exit_code_for(&ConexusError::PathTraversal { path: "../x".into() }), 1);
        assert_eq!(exit_code_for(&ConexusError::NotFound { entity: "x".into() }), 1);
    }

    #[test]
    fn internal_errors_exit_two() {
        assert_eq!(exit_code_for(&ConexusError::internal("boom")), 2);
        assert_eq!(exit_code_for(&ConexusError::Cancelled), 2);
    }

    #[test]
    fn index_then_status_reports_indexed_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.rs"), "fn add(a: i32, b: i32) -> i32 { a + b }").expect("write");
        let config = Config::defaults(dir.path());

        run_index(config.clone(), false).expect("index");
        run_status(config).expect("status");
    }

    #[test]
    fn search_rejects_empty_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::defaults(dir.path());
        let err = run_search(config, "   ", 10, None, None).unwrap_err();
        assert!(matches!(err, ConexusError::InvalidParams { .. }));
    }

    #[test]
    fn search_rejects_zero_top_k() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::defaults(dir.path());
        let err = run_search(config, "add", 0, None, None).unwrap_err();
        assert!(matches!(err, ConexusError::InvalidParams { .. }));
    }

    #[test]
    fn search_on_empty_index_succeeds_with_no_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::defaults(dir.path());
        run_search(config, "anything", 5, None, None).expect("search");
    }

    #[test]
    fn full_reindex_drops_prior_merkle_state_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.rs"), "fn one() {}").expect("write");
        let config = Config::defaults(dir.path());

        run_index(config.clone(), false).expect("first index");
        let state_file = config.merkle_state_file();
        assert!(state_file.exists());

        run_index(config, true).expect("full reindex");
        assert!(state_file.exists());
    }
}
