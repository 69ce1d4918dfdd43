//! JSON-RPC 2.0 envelope parsing and construction (`spec.md` §4.8/§6).
//!
//! Hand-rolled rather than built on an SDK: the wire contract is a single
//! line-delimited message framing with strict id round-tripping, which is
//! simple enough to own directly and keeps the dependency stack aligned
//! with the rest of Conexus.

use serde_json::{json, Value};

/// Standard JSON-RPC 2.0 error codes, plus the application range `-32000+`
/// reserved for domain-specific codes (unused here; `ConexusError::rpc_code`
/// only ever returns `-32602` or `-32603`).
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A successfully parsed request or notification line.
pub struct ParsedRequest {
    /// `None` for notifications (no `id` field in the source message).
    pub id: Option<Value>,
    pub method: String,
    pub params: Value,
}

/// Parse one line of input. On success, distinguishes requests from
/// notifications via `id`. On failure, returns a ready-to-send JSON-RPC
/// error envelope (`-32700` for malformed JSON, `-32600` for a
/// well-formed-but-invalid request) so the caller never has to build its
/// own error path for framing problems.
pub fn parse_line(line: &str) -> Result<ParsedRequest, Value> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| error_envelope(None, PARSE_ERROR, &format!("parse error: {e}"), None))?;

    let obj = value
        .as_object()
        .ok_or_else(|| error_envelope(None, INVALID_REQUEST, "request must be a JSON object", None))?;

    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| error_envelope(obj.get("id").cloned(), INVALID_REQUEST, "request is missing 'method'", None))?
        .to_string();

    let id = obj.get("id").cloned();
    let params = obj.get("params").cloned().unwrap_or(Value::Null);

    Ok(ParsedRequest { id, method, params })
}

/// Build a `{jsonrpc, id, result}` envelope.
pub fn success_envelope(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Build a `{jsonrpc, id, error}` envelope. `id` is `Value::Null` for
/// framing errors that occur before an id can be recovered (`-32700`).
pub fn error_envelope(id: Option<Value>, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id.unwrap_or(Value::Null), "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_extracts_method_id_and_params() {
        let parsed = parse_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#).expect("parse");
        assert_eq!(parsed.method, "tools/list");
        assert_eq!(parsed.id, Some(json!(1)));
    }

    #[test]
    fn parse_line_treats_missing_id_as_notification() {
        let parsed = parse_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).expect("parse");
        assert_eq!(parsed.id, None);
    }

    #[test]
    fn parse_line_rejects_malformed_json() {
        let err = parse_line(r#"{"jsonrpc":"2.0",invalid}"#).unwrap_err();
        assert_eq!(err["error"]["code"], json!(PARSE_ERROR));
        assert_eq!(err["id"], Value::Null);
    }

    #[test]
    fn parse_line_rejects_missing_method() {
        let err = parse_line(r#"{"jsonrpc":"2.0","id":5}"#).unwrap_err();
        assert_eq!(err["error"]["code"], json!(INVALID_REQUEST));
        assert_eq!(err["id"], json!(5));
    }

    #[test]
    fn string_and_numeric_ids_round_trip_byte_equal() {
        let envelope = success_envelope(json!("abc"), json!({}));
        assert_eq!(envelope["id"], json!("abc"));
    }
}
