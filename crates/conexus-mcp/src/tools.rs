//! Tool and resource handlers for the four MCP tools (`spec.md` §4.8):
//! `context.search`, `context.get_related_info`, `context.index_control`,
//! and `context.connector_management`.
//!
//! Every handler returns `ConexusResult<Value>`; the server translates a
//! caught `ConexusError` to a JSON-RPC error via `ConexusError::rpc_code`
//! and `ConexusError::kind`, which is how `PathTraversal` ends up at
//! `-32602` with `data.kind == "PathTraversal"` for the path-escape case.

use std::path::{Component, Path};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use conexus_core::error::{ConexusError, ConexusResult};
use conexus_core::indexer::Indexer;
use conexus_core::store::{ConnectorFilter, RemoveMode};
use conexus_core::types::{ConnectorConfig, SearchOptions};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// `initialize` result (`spec.md` §4.8, scenario S1).
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": { "name": "conexus", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": {
            "tools": {},
            "resources": { "listChanged": true, "subscribe": false },
        },
    })
}

/// `tools/list` result: exactly the four tools, each with a schema
/// (`spec.md` §4.8, scenario S2).
pub fn list_tools() -> Value {
    json!({
        "tools": [
            {
                "name": "context.search",
                "description": "Hybrid lexical (BM25) and semantic (vector) search over the indexed repository.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Natural-language or keyword query." },
                        "top_k": { "type": "integer", "minimum": 1, "description": "Maximum results to return." },
                        "filters": {
                            "type": "object",
                            "properties": {
                                "source_types": { "type": "array", "items": { "type": "string" } },
                                "language": { "type": "string" },
                                "path_prefix": { "type": "string" },
                            },
                        },
                    },
                    "required": ["query"],
                },
            },
            {
                "name": "context.get_related_info",
                "description": "Find files/chunks related to a given file path (siblings, tests, docs) or to a ticket id (linked commits/PRs via a connector).",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string" },
                        "ticket_id": { "type": "string" },
                    },
                },
            },
            {
                "name": "context.index_control",
                "description": "Start, stop, or check the status of the indexing pipeline, or trigger a full reindex.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "action": { "type": "string", "enum": ["start", "stop", "status", "reindex"] },
                    },
                    "required": ["action"],
                },
            },
            {
                "name": "context.connector_management",
                "description": "List, add, update, or remove external connectors (e.g. GitHub, Jira) registered alongside the index.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "action": { "type": "string", "enum": ["list", "add", "update", "remove"] },
                        "id": { "type": "string" },
                        "type": { "type": "string" },
                        "name": { "type": "string" },
                        "config": { "type": "object" },
                    },
                    "required": ["action"],
                },
            },
        ],
    })
}

/// `resources/list` result. Conexus exposes one resource: the engine's
/// current status, as a machine-readable document an agent can read
/// without invoking a tool call.
pub fn list_resources() -> Value {
    json!({
        "resources": [
            {
                "uri": "conexus://status",
                "name": "Indexer status",
                "description": "Current repository path, document count, and embedding provider.",
                "mimeType": "application/json",
            },
        ],
    })
}

/// `resources/read` result for a given `{uri}`.
pub fn read_resource(indexer: &Indexer, params: &Value) -> ConexusResult<Value> {
    let uri = require_str(params, "uri")?;
    if uri != "conexus://status" {
        return Err(ConexusError::NotFound { entity: format!("resource {uri}") });
    }

    let status = indexer.status()?;
    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": serde_json::to_string(&status)?,
        }],
    }))
}

/// `tools/call` dispatch: `{name, arguments}` → the named tool's own
/// result value, returned directly as the JSON-RPC `result` (not wrapped
/// in an MCP content envelope -- scenario S3 expects `result.results`
/// directly on the response).
pub fn call(indexer: &Indexer, cancel: &mut CancellationToken, params: &Value) -> ConexusResult<Value> {
    let name = require_str(params, "name")?;
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match name {
        "context.search" => context_search(indexer, &arguments),
        "context.get_related_info" => context_get_related_info(indexer, &arguments),
        "context.index_control" => context_index_control(indexer, cancel, &arguments),
        "context.connector_management" => context_connector_management(indexer, &arguments),
        other => Err(ConexusError::InvalidParams { message: format!("unknown tool '{other}'") }),
    }
}

fn require_str<'a>(params: &'a Value, field: &str) -> ConexusResult<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ConexusError::InvalidParams { message: format!("missing required field '{field}'") })
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

// ---------------------------------------------------------------------
// context.search
// ---------------------------------------------------------------------

fn context_search(indexer: &Indexer, params: &Value) -> ConexusResult<Value> {
    let query = require_str(params, "query")?;
    if query.trim().is_empty() {
        return Err(ConexusError::InvalidParams { message: "'query' must not be empty".into() });
    }

    let top_k = match params.get("top_k") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let n = v.as_i64().ok_or_else(|| ConexusError::InvalidParams { message: "'top_k' must be an integer".into() })?;
            if n < 1 {
                return Err(ConexusError::InvalidParams { message: "'top_k' must be >= 1".into() });
            }
            Some(n as usize)
        }
    };

    let filters_obj = params.get("filters").and_then(Value::as_object);
    let mut filters = std::collections::HashMap::new();
    if let Some(filters_obj) = filters_obj {
        if let Some(language) = filters_obj.get("language").and_then(Value::as_str) {
            filters.insert("language".to_string(), Value::String(language.to_string()));
        }
        if let Some(source_types) = filters_obj.get("source_types").and_then(Value::as_array) {
            filters.insert("source_type".to_string(), Value::Array(source_types.clone()));
        }
    }
    let path_prefix = filters_obj.and_then(|f| f.get("path_prefix")).and_then(Value::as_str).map(str::to_string);

    let config = indexer.config();
    let limit = top_k.unwrap_or(config.search.default_limit).min(config.search.max_limit);
    let opts = SearchOptions { limit, filters, score_threshold: None };

    let started = Instant::now();
    let query_vec = indexer.embed_query(query)?;
    let mut results = indexer.store().search_hybrid(
        query,
        &query_vec,
        &opts,
        config.search.rrf_k,
        config.search.k_over,
        config.search.enable_rerank,
    )?;

    if let Some(prefix) = &path_prefix {
        results.retain(|r| r.document.file_path().is_some_and(|p| p.starts_with(prefix.as_str())));
    }

    let query_time_ms = started.elapsed().as_millis() as u64;
    let results_json: Vec<Value> = results
        .iter()
        .map(|r| json!({ "content": r.document.content, "score": r.score, "metadata": r.document.metadata }))
        .collect();

    Ok(json!({ "results": results_json, "total_count": results_json.len(), "query_time_ms": query_time_ms }))
}

// ---------------------------------------------------------------------
// context.get_related_info
// ---------------------------------------------------------------------

fn validate_relative_path(path: &str) -> ConexusResult<()> {
    if path.is_empty() {
        return Err(ConexusError::InvalidPath { path: path.to_string(), message: "path must not be empty".into() });
    }
    let candidate = Path::new(path);
    if candidate.is_absolute() || candidate.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConexusError::PathTraversal { path: path.to_string() });
    }
    Ok(())
}

fn context_get_related_info(indexer: &Indexer, params: &Value) -> ConexusResult<Value> {
    let file_path = params.get("file_path").and_then(Value::as_str);
    let ticket_id = params.get("ticket_id").and_then(Value::as_str);

    match (file_path, ticket_id) {
        (Some(path), _) => related_info_for_file(indexer, path),
        (None, Some(ticket)) => related_info_for_ticket(indexer, ticket),
        (None, None) => Err(ConexusError::InvalidParams { message: "one of 'file_path' or 'ticket_id' is required".into() }),
    }
}

fn related_info_for_file(indexer: &Indexer, path: &str) -> ConexusResult<Value> {
    validate_relative_path(path)?;

    let own_chunks = indexer.store().list_by_file_path_prefix(path)?;
    if own_chunks.is_empty() {
        return Err(ConexusError::NotFound { entity: format!("file {path}") });
    }

    let stem = Path::new(path).file_stem().and_then(|s| s.to_str()).unwrap_or(path);
    let parent = Path::new(path).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();

    let siblings = indexer.store().list_by_file_path_prefix(&parent)?;
    let related: Vec<&conexus_core::types::Document> = siblings
        .iter()
        .filter(|doc| {
            let Some(candidate) = doc.file_path() else { return false };
            if candidate == path {
                return false;
            }
            let candidate_stem = Path::new(candidate).file_stem().and_then(|s| s.to_str()).unwrap_or(candidate);
            let is_test_sibling = candidate_stem == format!("{stem}_test") || candidate.contains(&format!("{stem}_test."));
            let is_doc_sibling = candidate_stem == stem && candidate.ends_with(".md");
            is_test_sibling || is_doc_sibling
        })
        .collect();

    let related_items: Vec<Value> = related
        .iter()
        .map(|doc| json!({ "file_path": doc.file_path(), "content": doc.content, "metadata": doc.metadata }))
        .collect();

    Ok(json!({
        "related_items": related_items,
        "summary": format!("{} chunk(s) in {path}; {} related file(s) found", own_chunks.len(), related_items.len()),
    }))
}

fn related_info_for_ticket(indexer: &Indexer, ticket_id: &str) -> ConexusResult<Value> {
    let connectors = indexer.store().connectors().list(&ConnectorFilter::default())?;
    let linked: Vec<Value> = connectors
        .iter()
        .filter(|c| c.enabled)
        .map(|c| json!({ "connector_id": c.id, "connector_kind": c.kind, "ticket_id": ticket_id }))
        .collect();

    Ok(json!({
        "related_items": linked,
        "summary": format!("{} connector(s) consulted for ticket {ticket_id}", linked.len()),
    }))
}

// ---------------------------------------------------------------------
// context.index_control
// ---------------------------------------------------------------------

fn context_index_control(indexer: &Indexer, cancel: &mut CancellationToken, params: &Value) -> ConexusResult<Value> {
    let action = require_str(params, "action")?;

    match action {
        "status" => {
            let status = indexer.status()?;
            Ok(serde_json::to_value(status)?)
        }
        // Request dispatch is synchronous within a single task (`spec.md`
        // §5), so a concurrent "reindex" can never observe a run already
        // in progress; both actions simply run to completion here. A fresh
        // token is issued for each run so a prior `stop` (which cancels
        // only the token in flight at the time) can never leak into later
        // runs -- a `CancellationToken` cannot be un-cancelled.
        "start" | "reindex" => {
            *cancel = CancellationToken::new();
            let report = indexer.index(cancel)?;
            Ok(serde_json::to_value(report)?)
        }
        "stop" => {
            cancel.cancel();
            Ok(json!({ "acknowledged": true }))
        }
        other => Err(ConexusError::InvalidParams { message: format!("unknown action '{other}'") }),
    }
}

// ---------------------------------------------------------------------
// context.connector_management
// ---------------------------------------------------------------------

fn context_connector_management(indexer: &Indexer, params: &Value) -> ConexusResult<Value> {
    let action = require_str(params, "action")?;
    let connectors = indexer.store().connectors();

    match action {
        "list" => {
            let kind = params.get("type").and_then(Value::as_str).map(str::to_string);
            let list = connectors.list(&ConnectorFilter { kind, enabled: None })?;
            Ok(json!({ "connectors": list }))
        }
        "add" => {
            let id = require_str(params, "id")?;
            if connectors.get(id).is_ok() {
                return Err(ConexusError::InvalidParams { message: format!("connector '{id}' already exists") });
            }
            let kind = require_str(params, "type")?;
            let name = params.get("name").and_then(Value::as_str).unwrap_or(id).to_string();
            let config = params.get("config").cloned().unwrap_or(Value::Null);
            let now = unix_now();
            let connector = ConnectorConfig {
                id: id.to_string(),
                kind: kind.to_string(),
                name,
                config,
                enabled: true,
                created_at: now,
                updated_at: now,
            };
            connectors.upsert(&connector)?;
            Ok(json!({ "connector": connector }))
        }
        "update" => {
            let id = require_str(params, "id")?;
            let mut connector = connectors.get(id)?;
            if let Some(kind) = params.get("type").and_then(Value::as_str) {
                connector.kind = kind.to_string();
            }
            if let Some(name) = params.get("name").and_then(Value::as_str) {
                connector.name = name.to_string();
            }
            if let Some(config) = params.get("config") {
                connector.config = config.clone();
            }
            connector.updated_at = unix_now();
            connectors.upsert(&connector)?;
            Ok(json!({ "connector": connector }))
        }
        "remove" => {
            let id = require_str(params, "id")?;
            // Default to hard delete (DESIGN.md's Open Question decision);
            // callers needing history pass `"hard_delete": false`.
            let hard = params.get("hard_delete").and_then(Value::as_bool).unwrap_or(true);
            let mode = if hard { RemoveMode::Hard } else { RemoveMode::Soft };
            connectors.remove(id, mode)?;
            Ok(json!({ "removed": id, "mode": if hard { "hard" } else { "soft" } }))
        }
        other => Err(ConexusError::InvalidParams { message: format!("unknown action '{other}'") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conexus_core::config::Config;

    fn test_indexer(root: &std::path::Path) -> Indexer {
        let config = Config::defaults(root);
        Indexer::new(config).expect("create indexer")
    }

    #[test]
    fn search_with_empty_store_returns_no_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let result = context_search(&indexer, &json!({ "query": "anything", "top_k": 5 })).expect("search");
        assert_eq!(result["results"], json!([]));
        assert_eq!(result["total_count"], json!(0));
    }

    #[test]
    fn search_rejects_missing_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let err = context_search(&indexer, &json!({})).unwrap_err();
        assert!(matches!(err, ConexusError::InvalidParams { .. }));
    }

    #[test]
    fn search_rejects_non_positive_top_k() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let err = context_search(&indexer, &json!({ "query": "x", "top_k": 0 })).unwrap_err();
        assert!(matches!(err, ConexusError::InvalidParams { .. }));
    }

    #[test]
    fn get_related_info_rejects_path_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let err = context_get_related_info(&indexer, &json!({ "file_path": "../etc/passwd" })).unwrap_err();
        assert!(matches!(err, ConexusError::PathTraversal { .. }));
        assert_eq!(err.rpc_code(), -32602);
        assert_eq!(err.kind(), "PathTraversal");
    }

    #[test]
    fn get_related_info_requires_one_argument() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let err = context_get_related_info(&indexer, &json!({})).unwrap_err();
        assert!(matches!(err, ConexusError::InvalidParams { .. }));
    }

    #[test]
    fn index_control_status_reports_zero_documents_initially() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let mut cancel = CancellationToken::new();
        let result = context_index_control(&indexer, &mut cancel, &json!({ "action": "status" })).expect("status");
        assert_eq!(result["documents_indexed"], json!(0));
    }

    #[test]
    fn stop_does_not_permanently_cancel_later_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.py"), "def a():\n    pass\n").expect("write");
        let indexer = test_indexer(dir.path());
        let mut cancel = CancellationToken::new();

        context_index_control(&indexer, &mut cancel, &json!({ "action": "stop" })).expect("stop");
        assert!(cancel.is_cancelled());

        let report = context_index_control(&indexer, &mut cancel, &json!({ "action": "start" })).expect("start after stop");
        assert_eq!(report["files_added"], json!(1));
    }

    #[test]
    fn connector_add_then_list_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        let added = context_connector_management(&indexer, &json!({ "action": "add", "id": "c1", "type": "github", "name": "Main" })).expect("add");
        assert_eq!(added["connector"]["id"], json!("c1"));

        let listed = context_connector_management(&indexer, &json!({ "action": "list" })).expect("list");
        assert_eq!(listed["connectors"].as_array().expect("array").len(), 1);
    }

    #[test]
    fn connector_add_rejects_duplicate_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = test_indexer(dir.path());
        context_connector_management(&indexer, &json!({ "action": "add", "id": "c1", "type": "github" })).expect("first add");
        let err = context_connector_management(&indexer, &json!({ "action": "add", "id": "c1", "type": "github" })).unwrap_err();
        assert!(matches!(err, ConexusError::InvalidParams { .. }));
    }
}
