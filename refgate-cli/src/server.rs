//! Stdio tool server
//!
//! Newline-delimited JSON-RPC 2.0 on stdin/stdout. Stdout carries protocol
//! messages only; everything else goes to the tracing subscriber on stderr.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use refgate_core::{call_tool, tool_definitions, Gateway};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "ffmpeg-mcp-server";
pub const SERVER_VERSION: &str = "1.0.0";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Serve until stdin closes
pub async fn serve(gateway: Gateway) -> Result<()> {
    info!("Tool server listening on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let Some(response) = handle_message(&gateway, &line).await else {
            continue;
        };
        let mut message = serde_json::to_string(&response)?;
        message.push('\n');
        stdout
            .write_all(message.as_bytes())
            .await
            .context("Failed to write response")?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Handle one line; `None` when nothing should be written back
pub async fn handle_message(gateway: &Gateway, line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let message: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("JSON parse error: {}", e);
            return Some(error_response(&Value::Null, PARSE_ERROR, "Parse error"));
        }
    };

    let method = message["method"].as_str().unwrap_or_default();
    let id = &message["id"];
    let params = &message["params"];
    debug!("Received: {}", method);

    // notifications carry no id and never get a reply
    if id.is_null() {
        if !method.starts_with("notifications/") {
            debug!("Ignoring request without id: {}", method);
        }
        return None;
    }

    let response = match method {
        "initialize" => success_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION,
                }
            }),
        ),

        "tools/list" => success_response(id, json!({ "tools": tool_definitions() })),

        "tools/call" => {
            let Some(name) = params["name"].as_str() else {
                return Some(error_response(id, INVALID_PARAMS, "Missing tool name"));
            };
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

            let result = call_tool(gateway, name, &arguments).await;
            if result.is_error {
                debug!("Tool {} returned an error", name);
            }
            success_response(
                id,
                json!({
                    "content": [{ "type": "text", "text": result.text }],
                    "isError": result.is_error,
                }),
            )
        }

        "ping" => success_response(id, json!({})),

        other => error_response(id, METHOD_NOT_FOUND, &format!("Unknown method: {other}")),
    };
    Some(response)
}

fn success_response(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}
