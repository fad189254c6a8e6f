use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::orchestrator::{
    AnswerPayload, CompanyBriefRequest, StartSessionRequest, SubmitAnswerRequest,
};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");
    let start = Instant::now();

    let result = match tool_name {
        "interview_start_session" => handle_start_session(state, arguments).await,
        "interview_submit_answer" => handle_submit_answer(state, arguments).await,
        "interview_end_session" => handle_end_session(state, arguments).await,
        "interview_session_graph" => handle_session_graph(state, arguments).await,
        "interview_session_status" => handle_session_status(state, arguments).await,
        "interview_company_brief" => handle_company_brief(state, arguments).await,
        "interview_scout_updates" => handle_scout_updates(state, arguments).await,
        "interview_user_profile" => handle_user_profile(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    };

    let latency = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => info!(tool = %tool_name, latency_ms = latency, "Tool call succeeded"),
        Err(e) => info!(tool = %tool_name, latency_ms = latency, error = %e, "Tool call failed"),
    }
    result
}

async fn handle_start_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_start_session",
        arguments,
        |params: StartSessionRequest| state.orchestrator.start_session(params),
    )
    .await
}

/// Arguments of `interview_submit_answer`. Exactly one of `transcript`
/// and `audio` must be given; `audio` is the raw recording as a byte array.
#[derive(Debug, Deserialize)]
struct SubmitAnswerParams {
    session_id: String,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    audio: Option<Vec<u8>>,
    #[serde(default)]
    duration_seconds: u32,
}

impl SubmitAnswerParams {
    fn into_request(self, tool_name: &str) -> McpResult<SubmitAnswerRequest> {
        let payload = match (self.transcript, self.audio) {
            (Some(text), None) => AnswerPayload::Transcript(text),
            (None, Some(bytes)) => AnswerPayload::Audio(bytes),
            (Some(_), Some(_)) => {
                return Err(McpError::InvalidParameters {
                    tool_name: tool_name.to_string(),
                    message: "Provide either transcript or audio, not both".to_string(),
                })
            }
            (None, None) => {
                return Err(McpError::InvalidParameters {
                    tool_name: tool_name.to_string(),
                    message: "One of transcript or audio is required".to_string(),
                })
            }
        };
        Ok(SubmitAnswerRequest {
            session_id: self.session_id,
            payload,
            duration_seconds: self.duration_seconds,
        })
    }
}

async fn handle_submit_answer(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    const TOOL: &str = "interview_submit_answer";
    let params: SubmitAnswerParams = parse_arguments(TOOL, arguments)?;
    let request = params.into_request(TOOL)?;
    let response = state.orchestrator.submit_answer(request).await?;
    serde_json::to_value(response).map_err(McpError::Json)
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: String,
}

async fn handle_end_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_end_session", arguments, |params: SessionParams| async move {
        state.orchestrator.end_session(&params.session_id).await
    })
    .await
}

async fn handle_session_graph(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_session_graph", arguments, |params: SessionParams| async move {
        state.orchestrator.session_graph(&params.session_id).await
    })
    .await
}

async fn handle_session_status(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_session_status", arguments, |params: SessionParams| async move {
        state.orchestrator.session_status(&params.session_id).await
    })
    .await
}

async fn handle_company_brief(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_company_brief",
        arguments,
        |params: CompanyBriefRequest| state.orchestrator.company_brief(params),
    )
    .await
}

async fn handle_scout_updates(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_scout_updates", arguments, |params: SessionParams| async move {
        state.orchestrator.scout_updates(&params.session_id).await
    })
    .await
}

#[derive(Debug, Deserialize)]
struct UserParams {
    user_id: String,
}

async fn handle_user_profile(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_user_profile", arguments, |params: UserParams| async move {
        state.orchestrator.user_profile(&params.user_id).await
    })
    .await
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Generic handler that runs an orchestrator operation with consistent error handling.
///
/// # Type Parameters
/// - `P`: Parameter type (must implement DeserializeOwned)
/// - `R`: Result type (must implement Serialize)
/// - `E`: Error type (must implement Display)
/// - `F`: Async operation that takes P and returns Result<R, E>
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Collaborators;
    use crate::config::Config;
    use crate::orchestrator::InterviewOrchestrator;
    use crate::server::AppState;
    use crate::storage::ContextGraph;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestParams {
        content: String,
        value: i32,
    }

    fn test_state() -> SharedState {
        let config = Config::default();
        let graph = ContextGraph::disabled();
        let orchestrator = InterviewOrchestrator::new(
            config.session.clone(),
            graph.clone(),
            Collaborators::offline(graph),
        );
        Arc::new(AppState::new(config, orchestrator))
    }

    #[test]
    fn test_parse_arguments_success() {
        let args = Some(json!({
            "content": "test content",
            "value": 42
        }));

        let params: TestParams = parse_arguments("test.tool", args).unwrap();
        assert_eq!(params.content, "test content");
        assert_eq!(params.value, 42);
    }

    #[test]
    fn test_parse_arguments_missing_arguments() {
        let err = parse_arguments::<TestParams>("test.tool", None).unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
        assert!(err.to_string().contains("Missing arguments"));
        assert!(err.to_string().contains("test.tool"));
    }

    #[test]
    fn test_parse_arguments_wrong_type() {
        let args = Some(json!({
            "content": "test",
            "value": "not a number"
        }));

        let err = parse_arguments::<TestParams>("test.tool", args).unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
    }

    #[test]
    fn test_submit_params_require_one_payload() {
        let params: SubmitAnswerParams =
            serde_json::from_value(json!({"session_id": "s"})).unwrap();
        assert!(params.into_request("t").is_err());

        let params: SubmitAnswerParams = serde_json::from_value(json!({
            "session_id": "s",
            "transcript": "hi",
            "audio": [1, 2]
        }))
        .unwrap();
        assert!(params.into_request("t").is_err());

        let params: SubmitAnswerParams = serde_json::from_value(json!({
            "session_id": "s",
            "audio": [1, 2, 3],
            "duration_seconds": 12
        }))
        .unwrap();
        let request = params.into_request("t").unwrap();
        assert_eq!(request.payload, AnswerPayload::Audio(vec![1, 2, 3]));
        assert_eq!(request.duration_seconds, 12);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let state = test_state();
        let err = handle_tool_call(&state, "interview_nope", None)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_session_tools_round_trip() {
        let state = test_state();

        let started = handle_tool_call(
            &state,
            "interview_start_session",
            Some(json!({"user_id": "u1", "role": "PM", "company": "Acme"})),
        )
        .await
        .unwrap();
        let session_id = started["session_id"].as_str().unwrap().to_string();
        assert_eq!(started["question_number"], 1);

        let answered = handle_tool_call(
            &state,
            "interview_submit_answer",
            Some(json!({"session_id": session_id, "transcript": "I led a team of 5."})),
        )
        .await
        .unwrap();
        assert_eq!(answered["question_number"], 2);
        assert_eq!(answered["metrics_source"], "neutral");

        let status = handle_tool_call(
            &state,
            "interview_session_status",
            Some(json!({"session_id": session_id})),
        )
        .await
        .unwrap();
        assert_eq!(status["question_count"], 2);

        let report = handle_tool_call(
            &state,
            "interview_end_session",
            Some(json!({"session_id": session_id})),
        )
        .await
        .unwrap();
        assert_eq!(report["questions_answered"], 1);

        let scout = handle_tool_call(
            &state,
            "interview_scout_updates",
            Some(json!({"session_id": session_id})),
        )
        .await
        .unwrap();
        assert_eq!(scout["scout_status"], "no_scout");
        assert_eq!(scout["updates"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_caller_errors_carry_reason() {
        let state = test_state();
        let err = handle_tool_call(
            &state,
            "interview_session_status",
            Some(json!({"session_id": "sess_missing"})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("sess_missing"));
    }
}
