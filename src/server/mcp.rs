//! Line-delimited JSON-RPC 2.0 over stdio, carrying the MCP handshake and
//! the `interview_*` tools.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState};
use crate::error::{AppResult, McpError};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// Protocol revision answered during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// `null` when the request id could not be read.
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Protocol-level failure carrying the code that matches `err`.
    pub fn from_mcp_error(id: Option<Value>, err: &McpError) -> Self {
        let code = match err {
            McpError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            McpError::UnknownTool { .. } => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParameters { .. } => error_codes::INVALID_PARAMS,
            McpError::ExecutionFailed { .. } | McpError::Json(_) => error_codes::INTERNAL_ERROR,
        };
        Self::error(id, code, err.to_string())
    }
}

/// A tool as listed by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Body of a `tools/call` result. Tool failures are reported here with
/// `isError`, never as JSON-RPC errors.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            is_error: None,
        }
    }

    pub fn error(err: &McpError) -> Self {
        Self {
            is_error: Some(true),
            ..Self::text(format!("Error: {}", err))
        }
    }
}

/// MCP server reading requests from stdin and answering on stdout.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve until stdin closes.
    pub async fn run(&self) -> AppResult<()> {
        info!("Interview coach MCP server starting...");

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    warn!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(response) = response {
                let response_json = serde_json::to_string(&response).map_err(McpError::Json)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one request. Notifications get `None`.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;
        let is_notification = id.is_none();

        if jsonrpc != JSONRPC_VERSION {
            let err = McpError::InvalidRequest {
                message: format!("unsupported jsonrpc version {:?}", jsonrpc),
            };
            warn!(method = %method, error = %err, "Rejecting request");
            return (!is_notification).then(|| JsonRpcResponse::from_mcp_error(id, &err));
        }

        match method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(id, initialize_result())),
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            "tools/list" => Some(JsonRpcResponse::success(
                id,
                json!({ "tools": tool_definitions() }),
            )),
            "tools/call" => Some(self.handle_tool_call(id, params).await),
            _ if is_notification => {
                debug!(method = %method, "Notification ignored");
                None
            }
            _ => {
                warn!(method = %method, "Unknown method");
                Some(JsonRpcResponse::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                ))
            }
        }
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params = params
            .ok_or_else(|| "Missing params".to_string())
            .and_then(|p| serde_json::from_value::<ToolCallParams>(p).map_err(|e| e.to_string()));
        let params = match params {
            Ok(params) => params,
            Err(message) => {
                let err = McpError::InvalidParameters {
                    tool_name: "tools/call".to_string(),
                    message,
                };
                return JsonRpcResponse::from_mcp_error(id, &err);
            }
        };

        let result = handle_tool_call(&self.state, &params.name, params.arguments)
            .await
            .and_then(|value| serde_json::to_string_pretty(&value).map_err(McpError::Json));
        let tool_result = match result {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => ToolCallResult::error(&e),
        };

        match serde_json::to_value(tool_result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::from_mcp_error(id, &McpError::Json(e))
            }
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn session_id_schema() -> Value {
    object_schema(
        json!({
            "session_id": {
                "type": "string",
                "description": "Session ID returned by interview_start_session"
            }
        }),
        &["session_id"],
    )
}

/// Every tool this server exposes, in `tools/list` order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        tool(
            "interview_start_session",
            "Start an interview practice session. Returns the session ID and the first question. \
             Company research for the role starts in the background.",
            object_schema(
                json!({
                    "user_id": {
                        "type": "string",
                        "description": "Learner identifier; history is shared across that learner's sessions"
                    },
                    "role": { "type": "string", "description": "Target role, e.g. \"Product Manager\"" },
                    "company": { "type": "string", "description": "Target company" },
                    "difficulty": {
                        "type": "string",
                        "enum": ["easy", "medium", "hard"],
                        "description": "Difficulty preference (default: medium)"
                    },
                    "level": {
                        "type": "string",
                        "enum": ["junior", "mid", "senior", "staff", "principal"],
                        "description": "Seniority of the target role (default: mid)"
                    },
                    "job_description": {
                        "type": "string",
                        "description": "Optional job description; requirement lines become question topics"
                    }
                }),
                &["user_id"],
            ),
        ),
        submit_answer_tool(),
        tool(
            "interview_end_session",
            "End a session and return its report, including a time-boxed fact-check of the claims \
             made in its answers.",
            session_id_schema(),
        ),
        tool(
            "interview_session_graph",
            "Return the context graph of a session: user, session, answer, entity and decision \
             nodes with their edges.",
            session_id_schema(),
        ),
        tool(
            "interview_session_status",
            "Return the question counter, current question and asked questions of a session.",
            session_id_schema(),
        ),
        tool(
            "interview_company_brief",
            "Research what a company expects from a role. With a session ID, the result also \
             steers that session's next questions.",
            object_schema(
                json!({
                    "company": { "type": "string", "description": "Company to research" },
                    "role": { "type": "string", "description": "Role to research" },
                    "session_id": {
                        "type": "string",
                        "description": "Optional active session to attach the brief to"
                    }
                }),
                &["company"],
            ),
        ),
        tool(
            "interview_scout_updates",
            "Recent news and interview tips for the session's role and company. scout_status is \
             \"live\" when a scout watches them, \"no_scout\" when the updates are canned.",
            session_id_schema(),
        ),
        tool(
            "interview_user_profile",
            "Summarize a learner's stored history: answer count, baseline signals, top entities \
             and recent answer snippets.",
            object_schema(
                json!({
                    "user_id": { "type": "string", "description": "Learner identifier" }
                }),
                &["user_id"],
            ),
        ),
    ]
}

fn submit_answer_tool() -> Tool {
    tool(
        "interview_submit_answer",
        "Submit the answer to the current question, as a transcript or as raw audio bytes. \
         Returns the next question, tone, difficulty change, feedback, extracted entities and \
         voice scores.",
        object_schema(
            json!({
                "session_id": { "type": "string", "description": "Active session ID" },
                "transcript": {
                    "type": "string",
                    "description": "Answer text; voice signals are neutral"
                },
                "audio": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 255 },
                    "description": "Recorded answer as raw bytes, analyzed for stress and confidence"
                },
                "duration_seconds": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Answer duration (default: 30)"
                }
            }),
            &["session_id"],
        ),
    )
}
