//! Model Context Protocol server: JSON-RPC 2.0 messages carrying the
//! dataset and date tools.
//!
//! The stdio transport reads one JSON message per line from stdin and writes
//! one response per line to stdout. Logs go to stderr.

pub mod dates;
pub mod sessions;
pub mod tools;

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::state::AppState;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Versions a client may negotiate; anything else gets [`PROTOCOL_VERSION`].
const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];
const SERVER_NAME: &str = "market-data-hub";

const INSTRUCTIONS: &str = "Retrieve historical market data. \
Use get_candles for OHLCV rows, get_volume_footprint for POC/VAH/VAL, volume delta and levels, \
get_cvd for cumulative volume delta candles and get_ema for EMA values. \
Timestamps are returned as ISO-8601 strings and rows are sorted oldest first.";

// JSON-RPC error codes.
const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

/// Response for an unparseable message.
pub fn parse_error(detail: &str) -> Value {
    rpc_error(Value::Null, PARSE_ERROR, format!("parse error: {detail}"))
}

fn initialize_result(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        "instructions": INSTRUCTIONS,
    })
}

/// Handle one JSON-RPC message. Returns `None` for notifications.
pub async fn handle_message(state: &Arc<AppState>, message: Value) -> Option<Value> {
    // Only a missing id marks a notification; `"id": null` still gets a reply.
    let is_notification = message.as_object().is_some_and(|m| !m.contains_key("id"));
    let request: RpcRequest = match serde_json::from_value(message) {
        Ok(r) => r,
        Err(e) => return Some(rpc_error(Value::Null, INVALID_REQUEST, e.to_string())),
    };
    if is_notification {
        tracing::debug!(method = %request.method, "mcp notification");
        return None;
    }
    let id = request.id;
    tracing::debug!(method = %request.method, "mcp request");

    let response = match request.method.as_str() {
        "initialize" => rpc_result(id, initialize_result(&request.params)),
        "ping" => rpc_result(id, json!({})),
        "tools/list" => rpc_result(id, tools::list()),
        "tools/call" => match serde_json::from_value::<CallParams>(request.params) {
            Ok(call) => match tools::call(state, &call.name, call.arguments).await {
                Some(outcome) => rpc_result(id, outcome.into_result()),
                None => rpc_error(id, INVALID_PARAMS, format!("unknown tool: {}", call.name)),
            },
            Err(e) => rpc_error(id, INVALID_PARAMS, e.to_string()),
        },
        other => rpc_error(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
    };
    Some(response)
}

/// Serve MCP over stdin/stdout until stdin closes.
pub async fn serve_stdio(state: Arc<AppState>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tracing::info!("MCP server ready on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(line) {
            Ok(message) => handle_message(&state, message).await,
            Err(e) => Some(parse_error(&e.to_string())),
        };
        if let Some(response) = response {
            let mut out = response.to_string();
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("stdin closed, MCP server exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{candle_row, stub_state};

    #[tokio::test]
    async fn initialize_echoes_protocol_version() {
        let state = stub_state(vec![], false);
        let resp = handle_message(
            &state,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2025-03-26"}}),
        )
        .await
        .unwrap();
        assert_eq!(resp["id"], json!(1));
        assert_eq!(resp["result"]["protocolVersion"], json!("2025-03-26"));
        assert_eq!(resp["result"]["serverInfo"]["name"], json!("market-data-hub"));
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn unsupported_protocol_version_falls_back() {
        let state = stub_state(vec![], false);
        for params in [json!({"protocolVersion": "1999-01-01"}), json!({})] {
            let resp = handle_message(
                &state,
                json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": params}),
            )
            .await
            .unwrap();
            assert_eq!(resp["result"]["protocolVersion"], json!(PROTOCOL_VERSION));
        }
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let state = stub_state(vec![], false);
        let resp = handle_message(&state, json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn null_id_is_a_request() {
        let state = stub_state(vec![], false);
        let resp = handle_message(&state, json!({"jsonrpc": "2.0", "id": null, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(resp["id"], Value::Null);
        assert_eq!(resp["result"], json!({}));
    }

    #[tokio::test]
    async fn tools_call_round_trip() {
        let state = stub_state(vec![candle_row("2024-01-01 00:00:00", 3.0)], false);
        let resp = handle_message(
            &state,
            json!({
                "jsonrpc": "2.0",
                "id": "abc",
                "method": "tools/call",
                "params": {"name": "get_candles", "arguments": {"symbol": "BTC", "time_frame": "5"}}
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp["id"], json!("abc"));
        assert_eq!(resp["result"]["isError"], json!(false));
        assert_eq!(resp["result"]["structuredContent"]["count"], json!(1));
        assert_eq!(resp["result"]["structuredContent"]["candles"][0]["close"], json!(3.0));
    }

    #[tokio::test]
    async fn protocol_errors() {
        let state = stub_state(vec![], false);

        let resp = handle_message(&state, json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], json!(METHOD_NOT_FOUND));

        let resp = handle_message(
            &state,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await
        .unwrap();
        assert_eq!(resp["error"]["code"], json!(INVALID_PARAMS));

        let resp = handle_message(&state, json!([1, 2, 3])).await.unwrap();
        assert_eq!(resp["error"]["code"], json!(INVALID_REQUEST));

        assert_eq!(parse_error("eof")["error"]["code"], json!(PARSE_ERROR));
    }
}
