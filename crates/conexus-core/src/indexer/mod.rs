//! Indexer (orchestrator).
//!
//! Wires together the walker, Merkle index, parser, chunker, embedder, and
//! store into the indexing pipeline (`spec.md` §4.7): walk → diff → chunk →
//! embed → upsert, with atomic per-file reindex and abort-leaves-state-
//! untouched semantics.
//!
//! ## Architecture
//!
//! ```text
//! walk(root) --> Merkle diff (added/modified/deleted)
//!                       |
//!                       v
//!            for each changed file, in walker order:
//!              read -> parse (code family) -> chunk -> embed -> upsert
//!                       |
//!                       v
//!              delete_by_file_path() for every deleted file
//!                       |
//!                       v
//!              commit new Merkle state (only on a clean run)
//! ```
//!
//! Parallelism is confined to the embedding/upsert stage of each file, via a
//! `rayon` pool bounded by `IndexingConfig::parse_concurrency` -- the walk
//! and the per-run Merkle diff stay single-threaded and walker-ordered.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::chunker;
use crate::config::Config;
use crate::embedder::{self, EmbeddingProvider};
use crate::error::{ConexusError, ConexusResult};
use crate::merkle::{self, MerkleIndex};
use crate::parser;
use crate::store::Store;
use crate::types::{Chunk, Document, Language};
use crate::walker::{self, WalkOptions};

/// Summary of a completed (or aborted) indexing run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexReport {
    /// Files newly seen since the prior committed Merkle state.
    pub files_added: usize,
    /// Files whose content hash changed since the prior state.
    pub files_modified: usize,
    /// Files present in the prior state but missing from this walk.
    pub files_deleted: usize,
    /// Files that failed to process; the run continues past these.
    pub files_failed: usize,
    /// Total chunks written across all added/modified files.
    pub chunks_indexed: usize,
    /// Wall-clock duration of the run, in milliseconds.
    pub duration_ms: u64,
    /// Non-fatal warnings (walker warnings, per-file failures).
    pub warnings: Vec<String>,
}

/// Liveness/readiness snapshot (`spec.md` §4.7's `health()`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Health {
    /// Whether the store responded to a trivial query.
    pub store_ok: bool,
    /// Whether the configured embedding provider answered a probe embed.
    pub embedder_ok: bool,
    /// Registry key of the configured embedding provider.
    pub embedder_provider: String,
}

/// Non-blocking status snapshot (`spec.md` §4.7's `status()`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Status {
    /// Repository root being indexed.
    pub repo_path: String,
    /// Data directory holding the DB and Merkle state.
    pub data_dir: String,
    /// Current document count in the store.
    pub documents_indexed: i64,
    /// Number of entries in the last-committed Merkle state.
    pub files_tracked: usize,
    /// Registry key of the configured embedding provider.
    pub embedding_provider: String,
    /// Whether a run is currently in progress.
    pub running: bool,
}

/// Drives the walker, Merkle index, chunker, embedder, and store through a
/// complete indexing pipeline.
pub struct Indexer {
    config: Config,
    store: Store,
    embedder: Box<dyn EmbeddingProvider>,
    running: std::sync::atomic::AtomicBool,
}

impl Indexer {
    /// Open (or create) the store and embedding provider for `config`.
    pub fn new(config: Config) -> ConexusResult<Self> {
        config.ensure_data_dir()?;
        let store = Store::open(&config.db_file())?;
        let embedder = embedder::create_provider(&config.embedding)?;
        Ok(Self { config, store, embedder, running: std::sync::atomic::AtomicBool::new(false) })
    }

    /// Construct an indexer from already-open parts (used by tests and by
    /// callers sharing a store across an indexer and a search handler).
    pub fn with_parts(config: Config, store: Store, embedder: Box<dyn EmbeddingProvider>) -> Self {
        Self { config, store, embedder, running: std::sync::atomic::AtomicBool::new(false) }
    }

    /// Access the underlying store (e.g. for search handlers sharing the
    /// same index).
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Registry key of the configured embedding provider.
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Access the effective configuration (search defaults, embedding
    /// provider settings, repo path).
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Embed a query string for hybrid search. Exposed so callers (the MCP
    /// `context.search` handler) can reuse the same provider instance.
    pub fn embed_query(&self, text: &str) -> ConexusResult<Vec<f32>> {
        self.embedder.embed_single(text)
    }

    /// Full walk + re-chunk + re-embed + upsert, diffed against the
    /// last-committed Merkle state on disk. On success, commits a fresh
    /// Merkle state; on any error (including cancellation) the prior state
    /// file is left untouched, so the next run resumes from the same point.
    pub fn index(&self, cancel: &CancellationToken) -> ConexusResult<IndexReport> {
        let prior = MerkleIndex::load_or_empty(&self.config.merkle_state_file());
        self.run_against(&prior, cancel, true)
    }

    /// Incremental run against an explicit prior snapshot supplied by the
    /// caller, rather than the state file on disk. Returns the report plus
    /// the new `{path: content_hash}` snapshot for the caller to persist.
    pub fn index_incremental(
        &self,
        prior: &MerkleIndex,
        cancel: &CancellationToken,
    ) -> ConexusResult<(IndexReport, std::collections::HashMap<String, String>)> {
        let (report, new_entries) = self.process(prior, cancel)?;
        Ok((report, new_entries))
    }

    fn run_against(&self, prior: &MerkleIndex, cancel: &CancellationToken, persist: bool) -> ConexusResult<IndexReport> {
        let (report, new_entries) = self.process(prior, cancel)?;

        if persist {
            let now = iso8601_now();
            MerkleIndex::commit(&self.config.merkle_state_file(), new_entries, &now)?;
        }

        Ok(report)
    }

    /// Shared walk -> diff -> per-file reindex -> delete-deleted body used
    /// by both `index` and `index_incremental`. Never commits state itself.
    fn process(
        &self,
        prior: &MerkleIndex,
        cancel: &CancellationToken,
    ) -> ConexusResult<(IndexReport, std::collections::HashMap<String, String>)> {
        self.running.store(true, std::sync::atomic::Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        let started = std::time::Instant::now();
        let mut report = IndexReport::default();

        let options = WalkOptions::from(&self.config.indexing);
        let walk_report = walker::walk(&self.config.repo_path, &options)?;
        for warning in &walk_report.warnings {
            report.warnings.push(format!("{}: {}", warning.path, warning.message));
        }

        let mut new_entries = std::collections::HashMap::with_capacity(walk_report.files.len());
        let mut hashed_files = Vec::with_capacity(walk_report.files.len());
        for file in &walk_report.files {
            if cancel.is_cancelled() {
                return Err(ConexusError::Cancelled);
            }
            let bytes = match std::fs::read(&file.absolute_path) {
                Ok(b) => b,
                Err(e) => {
                    report.warnings.push(format!("{}: failed to read: {e}", file.path));
                    report.files_failed += 1;
                    continue;
                }
            };
            let hash = merkle::hash_bytes(&bytes);
            new_entries.insert(file.path.clone(), hash);
            hashed_files.push((file.path.clone(), bytes));
        }

        let diff = prior.diff(&new_entries);
        report.files_added = diff.added.len();
        report.files_modified = diff.modified.len();
        report.files_deleted = diff.deleted.len();

        let mut changed_paths = diff.added.clone();
        changed_paths.extend(diff.modified.iter().cloned());
        changed_paths.sort();

        let content_by_path: std::collections::HashMap<&str, &[u8]> =
            hashed_files.iter().map(|(p, b)| (p.as_str(), b.as_slice())).collect();

        let concurrency = self.config.indexing.parse_concurrency.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .build()
            .map_err(|e| ConexusError::internal(format!("failed to build worker pool: {e}")))?;

        let cancel_ref = cancel;
        let results: Vec<ConexusResult<usize>> = pool.install(|| {
            use rayon::prelude::*;
            changed_paths
                .par_iter()
                .map(|path| {
                    if cancel_ref.is_cancelled() {
                        return Err(ConexusError::Cancelled);
                    }
                    let Some(bytes) = content_by_path.get(path.as_str()) else {
                        return Ok(0);
                    };
                    self.reindex_file(path, bytes)
                })
                .collect()
        });

        for (path, result) in changed_paths.iter().zip(results) {
            match result {
                Ok(n) => report.chunks_indexed += n,
                Err(ConexusError::Cancelled) => return Err(ConexusError::Cancelled),
                Err(e) => {
                    report.warnings.push(format!("{path}: {e}"));
                    report.files_failed += 1;
                }
            }
        }

        for path in &diff.deleted {
            if cancel.is_cancelled() {
                return Err(ConexusError::Cancelled);
            }
            self.store.delete_by_file_path(path)?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok((report, new_entries))
    }

    /// Atomic per-file reindex: delete this file's prior chunks, then parse
    /// + chunk + embed + upsert its fresh ones. `spec.md` §4.7's "ALL prior
    /// chunks for that file are deleted before new chunks are inserted"
    /// invariant holds because the delete and the batched insert each
    /// happen inside the store's own transaction boundary, back to back,
    /// with no yield point in between for this path.
    fn reindex_file(&self, relative_path: &str, bytes: &[u8]) -> ConexusResult<usize> {
        let content = String::from_utf8_lossy(bytes).into_owned();
        let ext = Path::new(relative_path).extension().and_then(std::ffi::OsStr::to_str).unwrap_or("");
        let language = Language::from_extension(ext);

        let elements = if language.is_code() {
            parser::parse_file(Path::new(relative_path), bytes, language).unwrap_or_default()
        } else {
            Vec::new()
        };

        let chunks = chunker::chunk_file(relative_path, &content, language, &elements);

        self.store.delete_by_file_path(relative_path)?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let now = unix_now();
        let docs = self.embed_chunks(&chunks, now)?;
        self.store.upsert_batch(&docs)?;
        Ok(docs.len())
    }

    fn embed_chunks(&self, chunks: &[Chunk], now: i64) -> ConexusResult<Vec<Document>> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(ConexusError::internal("embedding provider returned a mismatched vector count"));
        }
        Ok(chunks.iter().zip(vectors).map(|(chunk, vector)| Document::from_chunk(chunk, vector, now)).collect())
    }

    /// Probe the store and embedding provider without mutating any state.
    pub fn health(&self) -> Health {
        let store_ok = self.store.count().is_ok();
        let embedder_ok = self.embedder.embed_single("conexus health probe").is_ok();
        Health { store_ok, embedder_ok, embedder_provider: self.embedder.name().to_string() }
    }

    /// Non-blocking snapshot of the current index state.
    pub fn status(&self) -> ConexusResult<Status> {
        let merkle = MerkleIndex::load_or_empty(&self.config.merkle_state_file());
        Ok(Status {
            repo_path: self.config.repo_path.display().to_string(),
            data_dir: self.config.data_dir().display().to_string(),
            documents_indexed: self.store.count()?,
            files_tracked: merkle.entries.len(),
            embedding_provider: self.embedder.name().to_string(),
            running: self.running.load(std::sync::atomic::Ordering::SeqCst),
        })
    }
}

/// Clears the running flag on drop, including on early `?` returns.
struct RunningGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn iso8601_now() -> String {
    let secs = unix_now();
    httpdate_from_unix(secs)
}

/// Minimal ISO-8601 UTC timestamp without pulling in a datetime crate the
/// teacher doesn't already depend on for this purpose.
fn httpdate_from_unix(secs: i64) -> String {
    let days = secs.div_euclid(86_400);
    let time_of_day = secs.rem_euclid(86_400);
    let (hour, min, sec) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);

    let (year, month, day) = civil_from_days(days);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Howard Hinnant's `civil_from_days` algorithm: days-since-epoch to a
/// proleptic Gregorian (year, month, day), valid over the full `i64` range.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_indexer(root: &Path) -> Indexer {
        let config = Config::defaults(root);
        Indexer::new(config).expect("create indexer")
    }

    #[test]
    fn index_empty_directory_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let report = indexer.index(&CancellationToken::new()).expect("index");
        assert_eq!(report.files_added, 0);
        assert_eq!(report.chunks_indexed, 0);
    }

    #[test]
    fn index_single_file_produces_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("hello.py"), "def greet(name):\n    return f'hi {name}'\n").expect("write");

        let indexer = test_indexer(dir.path());
        let report = indexer.index(&CancellationToken::new()).expect("index");

        assert_eq!(report.files_added, 1);
        assert!(report.chunks_indexed > 0);
        assert_eq!(indexer.store().count().expect("count"), report.chunks_indexed as i64);
    }

    #[test]
    fn second_run_with_no_changes_reports_nothing_added_or_modified() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("hello.py"), "def greet():\n    pass\n").expect("write");

        let indexer = test_indexer(dir.path());
        indexer.index(&CancellationToken::new()).expect("first index");
        let second = indexer.index(&CancellationToken::new()).expect("second index");

        assert_eq!(second.files_added, 0);
        assert_eq!(second.files_modified, 0);
    }

    #[test]
    fn modifying_a_file_is_reported_as_modified_and_replaces_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.py");
        std::fs::write(&path, "def greet():\n    pass\n").expect("write");

        let indexer = test_indexer(dir.path());
        indexer.index(&CancellationToken::new()).expect("first index");
        let before = indexer.store().count().expect("count");

        std::fs::write(&path, "def greet():\n    pass\n\ndef farewell():\n    pass\n").expect("rewrite");
        let report = indexer.index(&CancellationToken::new()).expect("second index");

        assert_eq!(report.files_modified, 1);
        assert_eq!(report.files_added, 0);
        let after = indexer.store().count().expect("count");
        assert!(after > before);
    }

    #[test]
    fn deleting_a_file_removes_its_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.py");
        std::fs::write(&path, "def greet():\n    pass\n").expect("write");

        let indexer = test_indexer(dir.path());
        indexer.index(&CancellationToken::new()).expect("first index");
        assert!(indexer.store().count().expect("count") > 0);

        std::fs::remove_file(&path).expect("remove");
        let report = indexer.index(&CancellationToken::new()).expect("second index");

        assert_eq!(report.files_deleted, 1);
        assert_eq!(indexer.store().count().expect("count"), 0);
    }

    #[test]
    fn aborted_run_leaves_merkle_state_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("hello.py"), "def greet():\n    pass\n").expect("write");

        let indexer = test_indexer(dir.path());
        indexer.index(&CancellationToken::new()).expect("first index");
        let state_before = std::fs::read_to_string(indexer.config.merkle_state_file()).expect("read state");

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        std::fs::write(dir.path().join("new.py"), "def x():\n    pass\n").expect("write new file");
        let result = indexer.index(&cancelled);

        assert!(matches!(result, Err(ConexusError::Cancelled)));
        let state_after = std::fs::read_to_string(indexer.config.merkle_state_file()).expect("read state");
        assert_eq!(state_before, state_after);
    }

    #[test]
    fn health_reports_mock_embedder_as_available() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let health = indexer.health();
        assert!(health.store_ok);
        assert!(health.embedder_ok);
        assert_eq!(health.embedder_provider, "mock");
    }

    #[test]
    fn status_reports_document_and_file_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.py"), "def a():\n    pass\n").expect("write");

        let indexer = test_indexer(dir.path());
        indexer.index(&CancellationToken::new()).expect("index");
        let status = indexer.status().expect("status");

        assert_eq!(status.files_tracked, 1);
        assert!(status.documents_indexed > 0);
        assert!(!status.running);
    }
}
