//! The document/vector/FTS/connector persistence layer (`spec.md` §4.5).
//!
//! `Store` owns every `Document` row and its lifecycle, the co-resident
//! connector table, and query planning for BM25, exact vector, and hybrid
//! (RRF-fused) search. It is backed by a single `rusqlite::Connection` in
//! WAL mode: writers serialize behind an internal mutex, matching the
//! concurrency contract in `spec.md` §4.5/§5 ("a single Store instance is
//! safe for concurrent callers; writers serialize inside the Store").
//!
//! Chunks exist only in transit from the chunker to this module; once a
//! `Document` is upserted the source `Chunk` is dropped.

mod connectors;

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{ConexusError, ConexusResult};
use crate::fusion;
use crate::types::{Document, ScoreBreakdown, SearchOptions, SearchResult};

pub use connectors::{ConnectorFilter, RemoveMode};

/// Default candidate over-fetch factor for hybrid search (`spec.md` §4.5).
const DEFAULT_K_OVER: usize = 3;

/// rusqlite's `bm25()` auxiliary function returns increasingly negative
/// scores for better matches; this flips the sign so "higher is better"
/// holds uniformly across BM25, vector, and fused scores.
fn bm25_to_positive_score(raw: f64) -> f64 {
    -raw
}

/// Persistent document + vector + FTS + connector store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a store at `db_path`, running schema setup.
    pub fn open(db_path: &Path) -> ConexusResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(include_str!("schema.sql"))?;

        crate::config::set_restrictive_file_permissions(db_path).ok();

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory store (used by tests).
    pub fn open_in_memory() -> ConexusResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn check_cancelled(cancel: &CancellationToken) -> ConexusResult<()> {
        if cancel.is_cancelled() {
            return Err(ConexusError::Cancelled);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Upsert / delete / get / count
    // -----------------------------------------------------------------

    /// Insert or update a single document. Idempotent on `id`; replaces
    /// content/metadata/vector but preserves `created_at` from the first
    /// insertion.
    pub fn upsert(&self, doc: &Document) -> ConexusResult<()> {
        self.upsert_batch(std::slice::from_ref(doc))
    }

    /// Insert or update a batch of documents inside a single transaction.
    /// A failure leaves the store in its pre-batch state (all or nothing).
    pub fn upsert_batch(&self, docs: &[Document]) -> ConexusResult<()> {
        self.upsert_batch_cancellable(docs, &CancellationToken::new())
    }

    /// `upsert_batch`, observing `cancel` before the transaction begins.
    pub fn upsert_batch_cancellable(&self, docs: &[Document], cancel: &CancellationToken) -> ConexusResult<()> {
        Self::check_cancelled(cancel)?;
        if docs.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for doc in docs {
            let vector_blob = encode_vector(&doc.vector);
            let metadata_json = serde_json::to_string(&doc.metadata)?;

            let existing_created_at: Option<i64> = tx
                .query_row("SELECT created_at FROM documents WHERE id = ?1", params![doc.id], |row| row.get(0))
                .optional()?;
            let created_at = existing_created_at.unwrap_or(doc.created_at);

            tx.execute(
                "INSERT INTO documents (id, content, vector, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    vector = excluded.vector,
                    metadata = excluded.metadata,
                    updated_at = excluded.updated_at",
                params![doc.id, doc.content, vector_blob, metadata_json, created_at, doc.updated_at],
            )?;

            tx.execute("DELETE FROM fts WHERE id = ?1", params![doc.id])?;
            tx.execute("INSERT INTO fts (id, content) VALUES (?1, ?2)", params![doc.id, doc.content])?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete a document by id. A no-op (not an error) if absent.
    pub fn delete(&self, id: &str) -> ConexusResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        conn.execute("DELETE FROM fts WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Delete every document whose metadata matches `filter` (equality or
    /// `IN` per key, the same shape `SearchOptions::filters` accepts).
    pub fn delete_where(&self, filter: &HashMap<String, Value>) -> ConexusResult<usize> {
        let conn = self.conn.lock();
        let (clause, sql_params) = filter_to_sql(filter);
        let where_sql = if clause.is_empty() { String::new() } else { format!("WHERE {clause}") };

        let ids: Vec<String> = {
            let mut stmt = conn.prepare(&format!("SELECT id FROM documents {where_sql}"))?;
            let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };

        for id in &ids {
            conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            conn.execute("DELETE FROM fts WHERE id = ?1", params![id])?;
        }

        Ok(ids.len())
    }

    /// Delete every document whose `file_path` metadata equals `file_path`
    /// exactly. Used by the indexer to clear a file's chunks before
    /// re-inserting fresh ones (atomic per-file reindex, `spec.md` §4.7).
    pub fn delete_by_file_path(&self, file_path: &str) -> ConexusResult<usize> {
        let mut filter = HashMap::new();
        filter.insert("file_path".to_string(), Value::String(file_path.to_string()));
        self.delete_where(&filter)
    }

    /// Fetch a single document by id.
    pub fn get(&self, id: &str) -> ConexusResult<Document> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, content, vector, metadata, created_at, updated_at FROM documents WHERE id = ?1",
                params![id],
                |row| row_to_raw(row),
            )
            .optional()?;

        match row {
            Some(raw) => decode_document(raw).map_err(|message| ConexusError::CorruptData { id: id.to_string(), message }),
            None => Err(ConexusError::NotFound { entity: format!("document {id}") }),
        }
    }

    /// Total number of documents currently stored.
    pub fn count(&self) -> ConexusResult<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------

    /// BM25 full-text search (`k1=1.2`, `b=0.75`, the FTS5 defaults).
    pub fn search_bm25(&self, query: &str, opts: &SearchOptions) -> ConexusResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let (filter_clause, filter_params) = filter_to_sql(&opts.filters);
        let filter_sql = if filter_clause.is_empty() { String::new() } else { format!("{filter_clause} AND ") };

        // Select the full document row in the same query (joined on
        // `fts.id = d.id`) rather than looking each id up afterwards via
        // `self.get()` -- that would re-lock `self.conn` while the guard
        // from above is still held, and `parking_lot::Mutex` is
        // non-reentrant, so it would deadlock.
        let sql = format!(
            "SELECT d.id, d.content, d.vector, d.metadata, d.created_at, d.updated_at, bm25(fts) AS rank
             FROM fts JOIN documents d ON d.id = fts.id
             WHERE {filter_sql}fts MATCH ?{match_idx}
             ORDER BY rank LIMIT ?{limit_idx}",
            match_idx = filter_params.len() + 1,
            limit_idx = filter_params.len() + 2,
        );

        let mut stmt = conn.prepare(&sql)?;
        let limit = effective_limit(opts.limit);
        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = filter_params;
        all_params.push(Box::new(query.to_string()));
        all_params.push(Box::new(limit as i64));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows: Vec<(RawRow, f64)> = stmt
            .query_map(param_refs.as_slice(), |row| Ok((row_to_raw(row)?, row.get::<_, f64>(6)?)))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        let mut results = Vec::with_capacity(rows.len());
        for (rank, (raw, raw_score)) in rows.into_iter().enumerate() {
            let id = raw.id.clone();
            let doc = match decode_document(raw) {
                Ok(d) => d,
                Err(message) => {
                    tracing::warn!(id = %id, message, "corrupt document excluded from bm25 search");
                    continue;
                }
            };
            let score = bm25_to_positive_score(raw_score);
            results.push(SearchResult {
                document: doc,
                score,
                debug_scores: ScoreBreakdown {
                    bm25_rank: Some(rank as u32 + 1),
                    bm25_score: Some(score),
                    rrf_score: 0.0,
                    ..Default::default()
                },
            });
        }

        apply_threshold(&mut results, opts.score_threshold);
        Ok(results)
    }

    /// Exact cosine-similarity vector search: materialize candidate
    /// vectors (subject to `opts.filters`), compute dot products (vectors
    /// are stored L2-normalized), select top-`limit` via a min-heap.
    pub fn search_vector(&self, query_vec: &[f32], opts: &SearchOptions) -> ConexusResult<Vec<SearchResult>> {
        use std::cmp::Ordering;

        let conn = self.conn.lock();
        let (filter_clause, filter_params) = filter_to_sql(&opts.filters);
        let where_sql = if filter_clause.is_empty() { String::new() } else { format!("WHERE {filter_clause}") };

        let sql = format!("SELECT id, content, vector, metadata, created_at, updated_at FROM documents {where_sql}");
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = filter_params.iter().map(|p| p.as_ref()).collect();
        let rows: Vec<RawRow> = stmt.query_map(param_refs.as_slice(), |row| row_to_raw(row))?.collect::<Result<_, _>>()?;

        struct Candidate {
            score: f64,
            doc: Document,
        }
        impl PartialEq for Candidate {
            fn eq(&self, other: &Self) -> bool {
                self.score == other.score
            }
        }
        impl Eq for Candidate {}
        impl PartialOrd for Candidate {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for Candidate {
            fn cmp(&self, other: &Self) -> Ordering {
                // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap:
                // the smallest-score candidate sits at the top, ready to be
                // evicted once the heap exceeds `limit`.
                other.score.partial_cmp(&self.score).unwrap_or(Ordering::Equal).then_with(|| other.doc.id.cmp(&self.doc.id))
            }
        }

        let limit = effective_limit(opts.limit);
        let mut heap: std::collections::BinaryHeap<Candidate> = std::collections::BinaryHeap::new();

        for raw in rows {
            let id = raw.id.clone();
            let doc = match decode_document(raw) {
                Ok(d) => d,
                Err(message) => {
                    tracing::warn!(id = %id, message, "corrupt document excluded from vector search");
                    continue;
                }
            };
            if doc.vector.len() != query_vec.len() {
                tracing::warn!(id = %doc.id, "vector dimension mismatch, excluded from search");
                continue;
            }

            let score = dot(&doc.vector, query_vec);
            heap.push(Candidate { score, doc });
            if heap.len() > limit {
                heap.pop();
            }
        }

        let mut candidates: Vec<Candidate> = heap.into_sorted_vec();
        candidates.reverse(); // `into_sorted_vec` is ascending; we want best-first.

        let mut results = Vec::with_capacity(candidates.len());
        for (rank, candidate) in candidates.into_iter().enumerate() {
            results.push(SearchResult {
                document: candidate.doc,
                score: candidate.score,
                debug_scores: ScoreBreakdown {
                    vector_rank: Some(rank as u32 + 1),
                    vector_score: Some(candidate.score),
                    rrf_score: 0.0,
                    ..Default::default()
                },
            });
        }

        apply_threshold(&mut results, opts.score_threshold);
        Ok(results)
    }

    /// Hybrid search: run BM25 and vector search in parallel (each
    /// over-fetching `limit * k_over` candidates), fuse via Reciprocal
    /// Rank Fusion, then apply the optional lexical reranker.
    pub fn search_hybrid(
        &self,
        query: &str,
        query_vec: &[f32],
        opts: &SearchOptions,
        rrf_k: u32,
        k_over: usize,
        rerank: bool,
    ) -> ConexusResult<Vec<SearchResult>> {
        let limit = effective_limit(opts.limit);
        let k_over = if k_over == 0 { DEFAULT_K_OVER } else { k_over };
        let fetch_opts = SearchOptions { limit: limit * k_over, filters: opts.filters.clone(), score_threshold: None };

        let bm25_results = self.search_bm25(query, &fetch_opts)?;
        let vector_results = self.search_vector(query_vec, &fetch_opts)?;

        let mut fused = fusion::fuse(&[&bm25_results, &vector_results], rrf_k);
        if rerank {
            fused = fusion::rerank(query, fused);
        }

        fused.truncate(limit);
        apply_threshold(&mut fused, opts.score_threshold);
        Ok(fused)
    }

    /// List every document whose `file_path` metadata starts with
    /// `prefix`, ordered by id. Used by `context.get_related_info` to find
    /// a file's own chunks plus path-adjacent siblings.
    pub fn list_by_file_path_prefix(&self, prefix: &str) -> ConexusResult<Vec<Document>> {
        let conn = self.conn.lock();
        let like_pattern = format!("{}%", prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn.prepare(
            "SELECT id, content, vector, metadata, created_at, updated_at FROM documents
             WHERE json_extract(metadata, '$.file_path') LIKE ?1 ESCAPE '\\'
             ORDER BY id",
        )?;
        let rows: Vec<RawRow> = stmt.query_map(params![like_pattern], |row| row_to_raw(row))?.collect::<Result<_, _>>()?;

        let mut docs = Vec::with_capacity(rows.len());
        for raw in rows {
            let id = raw.id.clone();
            match decode_document(raw) {
                Ok(doc) => docs.push(doc),
                Err(message) => tracing::warn!(id = %id, message, "corrupt document excluded from file lookup"),
            }
        }
        Ok(docs)
    }

    // -----------------------------------------------------------------
    // Connectors
    // -----------------------------------------------------------------

    /// Access the connector sub-store.
    pub fn connectors(&self) -> connectors::Connectors<'_> {
        connectors::Connectors::new(&self.conn)
    }
}

struct RawRow {
    id: String,
    content: String,
    vector: Option<Vec<u8>>,
    metadata: String,
    created_at: i64,
    updated_at: i64,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        content: row.get(1)?,
        vector: row.get(2)?,
        metadata: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn decode_document(raw: RawRow) -> Result<Document, String> {
    let metadata: HashMap<String, Value> = serde_json::from_str(&raw.metadata).map_err(|e| format!("invalid metadata JSON: {e}"))?;
    let vector = raw.vector.map(decode_vector).unwrap_or_default();
    Ok(Document {
        id: raw.id,
        content: raw.content,
        vector,
        metadata,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: Vec<u8>) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        20
    } else {
        limit
    }
}

fn apply_threshold(results: &mut Vec<SearchResult>, threshold: Option<f64>) {
    if let Some(t) = threshold {
        results.retain(|r| r.score >= t);
    }
}

/// Translate a `SearchOptions`-style metadata filter map into a SQL WHERE
/// fragment (against `json_extract(metadata, '$.key')`) plus bound
/// parameters. A `Value::Array` becomes an `IN (...)` clause; anything
/// else becomes an equality check.
fn filter_to_sql(filters: &HashMap<String, Value>) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut clauses = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    let mut keys: Vec<&String> = filters.keys().collect();
    keys.sort();

    for key in keys {
        let value = &filters[key];
        let column = format!("json_extract(metadata, '$.{key}')");
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    clauses.push("0".to_string());
                    continue;
                }
                let placeholders: Vec<String> = items.iter().map(|_| "?".to_string()).collect();
                clauses.push(format!("{column} IN ({})", placeholders.join(", ")));
                for item in items {
                    values.push(value_to_sql(item));
                }
            }
            other => {
                clauses.push(format!("{column} = ?"));
                values.push(value_to_sql(other));
            }
        }
    }

    (clauses.join(" AND "), values)
}

fn value_to_sql(value: &Value) -> Box<dyn rusqlite::ToSql> {
    match value {
        Value::String(s) => Box::new(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else {
                Box::new(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::Bool(b) => Box::new(*b),
        other => Box::new(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str, vector: Vec<f32>, file_path: &str) -> Document {
        let mut metadata = HashMap::new();
        metadata.insert("file_path".to_string(), Value::String(file_path.to_string()));
        Document { id: id.to_string(), content: content.to_string(), vector, metadata, created_at: 1, updated_at: 1 }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = Store::open_in_memory().expect("open");
        let d = doc("a", "fn add(a, b) { a + b }", vec![1.0, 0.0, 0.0], "a.rs");
        store.upsert(&d).expect("upsert");

        let fetched = store.get("a").expect("get");
        assert_eq!(fetched.content, d.content);
        assert_eq!(fetched.vector, d.vector);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn idempotent_upsert_does_not_duplicate() {
        let store = Store::open_in_memory().expect("open");
        let d = doc("a", "content", vec![1.0, 0.0], "a.rs");
        store.upsert(&d).expect("first upsert");
        store.upsert(&d).expect("second upsert");
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn upsert_preserves_created_at_on_update() {
        let store = Store::open_in_memory().expect("open");
        let mut d = doc("a", "v1", vec![1.0, 0.0], "a.rs");
        d.created_at = 100;
        store.upsert(&d).expect("first");

        d.content = "v2".to_string();
        d.created_at = 999; // caller's new stamp should be ignored on update
        d.updated_at = 200;
        store.upsert(&d).expect("second");

        let fetched = store.get("a").expect("get");
        assert_eq!(fetched.created_at, 100);
        assert_eq!(fetched.content, "v2");
        assert_eq!(fetched.updated_at, 200);
    }

    #[test]
    fn delete_removes_from_both_tables() {
        let store = Store::open_in_memory().expect("open");
        store.upsert(&doc("a", "hello world", vec![1.0, 0.0], "a.rs")).expect("upsert");
        store.delete("a").expect("delete");
        assert_eq!(store.count().expect("count"), 0);
        assert!(matches!(store.get("a"), Err(ConexusError::NotFound { .. })));
    }

    #[test]
    fn bm25_search_finds_matching_content() {
        let store = Store::open_in_memory().expect("open");
        store.upsert(&doc("a", "function to add two numbers together", vec![1.0, 0.0], "a.rs")).expect("upsert");
        store.upsert(&doc("b", "completely unrelated text about cats", vec![0.0, 1.0], "b.rs")).expect("upsert");

        let results = store.search_bm25("add numbers", &SearchOptions::with_limit(10)).expect("search");
        assert!(!results.is_empty());
        assert_eq!(results[0].document.id, "a");
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn vector_search_ranks_by_cosine_similarity() {
        let store = Store::open_in_memory().expect("open");
        store.upsert(&doc("close", "x", vec![1.0, 0.0, 0.0], "a.rs")).expect("upsert");
        store.upsert(&doc("far", "y", vec![0.0, 1.0, 0.0], "b.rs")).expect("upsert");

        let results = store.search_vector(&[1.0, 0.0, 0.0], &SearchOptions::with_limit(10)).expect("search");
        assert_eq!(results[0].document.id, "close");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn vector_search_excludes_mismatched_dimensions() {
        let store = Store::open_in_memory().expect("open");
        store.upsert(&doc("good", "x", vec![1.0, 0.0], "a.rs")).expect("upsert");
        store.upsert(&doc("bad", "y", vec![1.0, 0.0, 0.0], "b.rs")).expect("upsert");

        let results = store.search_vector(&[1.0, 0.0], &SearchOptions::with_limit(10)).expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "good");
    }

    #[test]
    fn hybrid_search_fuses_bm25_and_vector() {
        let store = Store::open_in_memory().expect("open");
        store.upsert(&doc("a", "addition function for integers", vec![1.0, 0.0], "a.go")).expect("upsert");
        store.upsert(&doc("b", "# Add\nDocumentation of addition", vec![0.9, 0.1], "b.md")).expect("upsert");

        let results = store
            .search_hybrid("addition", &[1.0, 0.0], &SearchOptions::with_limit(5), 60, 3, false)
            .expect("search");
        assert!(!results.is_empty());
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn filter_restricts_results_to_matching_metadata() {
        let store = Store::open_in_memory().expect("open");
        store.upsert(&doc("a", "shared keyword", vec![1.0, 0.0], "src/a.rs")).expect("upsert");
        store.upsert(&doc("b", "shared keyword", vec![1.0, 0.0], "src/b.py")).expect("upsert");

        let mut opts = SearchOptions::with_limit(10);
        opts.filters.insert("file_path".to_string(), Value::String("src/a.rs".to_string()));

        let results = store.search_bm25("shared keyword", &opts).expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "a");
    }

    #[test]
    fn delete_by_file_path_removes_owning_chunks() {
        let store = Store::open_in_memory().expect("open");
        store.upsert(&doc("a1", "chunk one", vec![1.0, 0.0], "a.rs")).expect("upsert");
        store.upsert(&doc("a2", "chunk two", vec![1.0, 0.0], "a.rs")).expect("upsert");
        store.upsert(&doc("b1", "other file", vec![1.0, 0.0], "b.rs")).expect("upsert");

        let removed = store.delete_by_file_path("a.rs").expect("delete");
        assert_eq!(removed, 2);
        assert_eq!(store.count().expect("count"), 1);
    }
}
