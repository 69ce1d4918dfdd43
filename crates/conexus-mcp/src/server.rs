//! Line-delimited JSON-RPC server loop and state machine (`spec.md` §4.8).
//!
//! One blocking task reads complete lines from `input` and writes complete
//! response lines to `output`, in order: request dispatch is synchronous
//! within this loop, so response ordering always matches request ordering
//! and a long-running `context.index_control` call blocks later requests
//! on the same stream rather than interleaving with them.

use std::io::{BufRead, Write};

use conexus_core::indexer::Indexer;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::rpc::{self, METHOD_NOT_FOUND};
use crate::tools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Ready,
    Terminated,
}

/// Owns the session state machine and the engine it dispatches requests
/// into. One `Server` per stdio connection.
pub struct Server {
    indexer: Indexer,
    state: State,
    /// Token for the current (or most recently started) index run. Replaced
    /// with a fresh token at the start of every `start`/`reindex` so `stop`
    /// only ever cancels the run in flight, never future ones -- a single
    /// shared `CancellationToken` cannot be un-cancelled, so reusing one
    /// across runs would brick indexing for the rest of the session after
    /// one `stop`.
    run_cancel: CancellationToken,
}

impl Server {
    pub fn new(indexer: Indexer) -> Self {
        Self { indexer, state: State::Uninitialized, run_cancel: CancellationToken::new() }
    }

    /// Run the read-dispatch-write loop until `input` reaches EOF. A
    /// malformed line produces a `-32700` response and the loop continues
    /// to the next line (`spec.md` §4.8's "parse error containment").
    pub fn run(mut self, input: impl BufRead, mut output: impl Write) -> std::io::Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let response = match rpc::parse_line(&line) {
                Ok(request) => self.dispatch(request),
                Err(error_envelope) => Some(error_envelope),
            };

            if let Some(response) = response {
                writeln!(output, "{response}")?;
                output.flush()?;
            }

            if self.state == State::Terminated {
                break;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, request: rpc::ParsedRequest) -> Option<Value> {
        let is_notification = request.id.is_none();

        if self.state == State::Uninitialized && request.method != "initialize" {
            let message = format!("server is uninitialized; only 'initialize' is accepted, got '{}'", request.method);
            return respond(is_notification, request.id, Err((METHOD_NOT_FOUND, message, None)));
        }

        let result: Result<Value, (i64, String, Option<Value>)> = match request.method.as_str() {
            "initialize" => {
                self.state = State::Ready;
                Ok(tools::initialize_result())
            }
            "tools/list" => Ok(tools::list_tools()),
            "tools/call" => tools::call(&self.indexer, &mut self.run_cancel, &request.params).map_err(to_rpc_tuple),
            "resources/list" => Ok(tools::list_resources()),
            "resources/read" => tools::read_resource(&self.indexer, &request.params).map_err(to_rpc_tuple),
            other => Err((METHOD_NOT_FOUND, format!("unknown method '{other}'"), None)),
        };

        respond(is_notification, request.id, result)
    }
}

fn to_rpc_tuple(error: conexus_core::error::ConexusError) -> (i64, String, Option<Value>) {
    (error.rpc_code(), error.to_string(), Some(serde_json::json!({ "kind": error.kind() })))
}

fn respond(is_notification: bool, id: Option<Value>, result: Result<Value, (i64, String, Option<Value>)>) -> Option<Value> {
    if is_notification {
        return None;
    }
    let id = id.unwrap_or(Value::Null);
    Some(match result {
        Ok(value) => rpc::success_envelope(id, value),
        Err((code, message, data)) => rpc::error_envelope(Some(id), code, &message, data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use conexus_core::config::Config;
    use serde_json::json;
    use std::io::Cursor;

    fn test_server() -> (Server, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::defaults(dir.path());
        let indexer = Indexer::new(config).expect("create indexer");
        (Server::new(indexer), dir)
    }

    fn run_lines(server: Server, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server.run(Cursor::new(input.as_bytes()), &mut output).expect("run");
        String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json response"))
            .collect()
    }

    #[test]
    fn rejects_requests_before_initialize() {
        let (server, _dir) = test_server();
        let responses = run_lines(server, "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], json!(METHOD_NOT_FOUND));
    }

    #[test]
    fn initialize_then_tools_list_returns_four_tools() {
        let (server, _dir) = test_server();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{\"protocolVersion\":\"2024-11-05\",\"capabilities\":{},\"clientInfo\":{\"name\":\"t\",\"version\":\"1\"}}}\n\
                     {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n";
        let responses = run_lines(server, input);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["protocolVersion"], json!("2024-11-05"));
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], json!("conexus"));
        assert_eq!(responses[1]["result"]["tools"].as_array().expect("array").len(), 4);
    }

    #[test]
    fn malformed_json_recovers_on_next_line() {
        let (server, _dir) = test_server();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n\
                     {\"jsonrpc\":\"2.0\",invalid}\n\
                     {\"jsonrpc\":\"2.0\",\"id\":42,\"method\":\"tools/list\"}\n";
        let responses = run_lines(server, input);
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[1]["error"]["code"], json!(rpc::PARSE_ERROR));
        assert_eq!(responses[2]["id"], json!(42));
        assert!(responses[2]["result"]["tools"].is_array());
    }

    #[test]
    fn notifications_produce_no_response() {
        let (server, _dir) = test_server();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n\
                     {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n";
        let responses = run_lines(server, input);
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn path_traversal_is_rejected_with_invalid_params_code() {
        let (server, _dir) = test_server();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n\
                     {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"context.get_related_info\",\"arguments\":{\"file_path\":\"../etc/passwd\"}}}\n";
        let responses = run_lines(server, input);
        assert_eq!(responses[1]["error"]["code"], json!(-32602));
        assert_eq!(responses[1]["error"]["data"]["kind"], json!("PathTraversal"));
    }
}
