//! Tool-call surface
//!
//! Maps named tool invocations with JSON arguments onto [`Gateway`]
//! operations. Every text returned from here has been sanitized; callers only
//! ever see `{{id}}` placeholders.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::gateway::Gateway;

pub const RUN_COMMAND_TOOL: &str = "ffmpeg";
pub const DESCRIBE_TOOL: &str = "video_info";
pub const LIST_TOOL: &str = "list_registered_videos";
pub const ADD_TARGET_TOOL: &str = "addTargetVideo";

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Name, description and input schema for every tool
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": RUN_COMMAND_TOOL,
            "description": "Execute FFmpeg commands to process video and audio files. \
                Refer to files only through {{id}} placeholders.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "FFmpeg arguments, e.g. -i {{source}} -vf scale=640:360 {{output}}"
                    }
                },
                "required": ["command"]
            }
        }),
        json!({
            "name": DESCRIBE_TOOL,
            "description": "Get information about a video file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "videoref": {
                        "type": "string",
                        "description": "Reference id of the video"
                    }
                },
                "required": ["videoref"]
            }
        }),
        json!({
            "name": LIST_TOOL,
            "description": "List videos in storage which are registered",
            "inputSchema": {
                "type": "object",
                "properties": {}
            }
        }),
        json!({
            "name": ADD_TARGET_TOOL,
            "description": "Register a target video file that FFmpeg can write to",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "targetName": {
                        "type": "string",
                        "description": "Name to use as the placeholder id"
                    },
                    "extension": {
                        "type": "string",
                        "description": "File extension such as .mp4 or mov"
                    }
                },
                "required": ["targetName"]
            }
        }),
    ]
}

/// Dispatch one tool call
pub async fn call_tool(gateway: &Gateway, name: &str, arguments: &Value) -> ToolResult {
    debug!("Tool call: {}", name);
    match name {
        RUN_COMMAND_TOOL => run_command(gateway, arguments).await,
        DESCRIBE_TOOL => describe(gateway, arguments).await,
        LIST_TOOL => list(gateway),
        ADD_TARGET_TOOL => add_target(gateway, arguments),
        other => ToolResult::error(format!("Unknown tool: {other}")),
    }
}

async fn run_command(gateway: &Gateway, arguments: &Value) -> ToolResult {
    let command = match required_str(arguments, "command") {
        Ok(command) => command,
        Err(result) => return result,
    };

    match gateway.run_command(command).await {
        Ok(text) => ToolResult::ok(text),
        Err(e) => {
            let message = gateway.sanitize_error(&e);
            match e {
                GatewayError::Io { .. } => {
                    ToolResult::error(format!("FFmpeg execution failed: {message}"))
                }
                GatewayError::SecurityViolation(_) => {
                    ToolResult::error(format!("Unexpected error: {message}"))
                }
                _ => ToolResult::error(format!("Error: {message}")),
            }
        }
    }
}

async fn describe(gateway: &Gateway, arguments: &Value) -> ToolResult {
    let id = match required_str(arguments, "videoref") {
        Ok(id) => id,
        Err(result) => return result,
    };

    match gateway.describe_reference(id).await {
        Ok(text) => ToolResult::ok(format!("Video Information for {id}:\n{text}")),
        Err(GatewayError::UnknownReference { .. }) => {
            ToolResult::error(format!("Video reference not found: {id}"))
        }
        Err(e) => ToolResult::error(format!(
            "Error getting video information from {id}: {}",
            gateway.sanitize_error(&e)
        )),
    }
}

fn list(gateway: &Gateway) -> ToolResult {
    let ids = gateway.all_ids();
    if ids.is_empty() {
        return ToolResult::ok("No registered videos");
    }
    let lines: Vec<String> = ids.iter().map(|id| format!("Video ID: {id}")).collect();
    ToolResult::ok(lines.join("\n"))
}

fn add_target(gateway: &Gateway, arguments: &Value) -> ToolResult {
    let name = match required_str(arguments, "targetName") {
        Ok(name) => name,
        Err(result) => return result,
    };
    let extension = arguments.get("extension").and_then(Value::as_str);

    match gateway.add_target(name, extension) {
        Ok(reference) => {
            info!("Target '{}' available to callers", reference.id());
            ToolResult::ok(format!(
                "Target video '{}' registered as {}",
                reference.id(),
                reference.placeholder()
            ))
        }
        Err(e) => ToolResult::error(format!(
            "Error registering video: {}",
            gateway.sanitize_error(&e)
        )),
    }
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolResult::error(format!("Error: missing string argument '{key}'")))
}
