use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Context graph storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Graph store disabled")]
    Disabled,

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// External collaborator errors (voice, extraction, verification, research)
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {message} (retries: {retries})")]
    Unavailable {
        service: String,
        message: String,
        retries: u32,
    },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Task {task_id} did not finish: {status}")]
    TaskIncomplete { task_id: String, status: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Caller input errors, terminal for the request that caused them
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("Session already ended: {session_id}")]
    Ended { session_id: String },

    #[error("Empty payload: {what}")]
    EmptyPayload { what: String },

    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SessionError> for McpError {
    fn from(err: SessionError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "bad value".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: bad value");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::InvalidRecord {
            message: "empty answer id".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid record: empty answer id");

        assert_eq!(StorageError::Disabled.to_string(), "Graph store disabled");
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = CollaboratorError::Unavailable {
            service: "verifier".to_string(),
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "verifier unavailable: server down (retries: 3)");

        let err = CollaboratorError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = CollaboratorError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        let err = CollaboratorError::TaskIncomplete {
            task_id: "t-1".to_string(),
            status: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "Task t-1 did not finish: failed");
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotFound {
            session_id: "sess_123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess_123");

        let err = SessionError::PayloadTooLarge {
            size: 10,
            limit: 5,
        };
        assert_eq!(err.to_string(), "Payload too large: 10 bytes (limit 5)");

        let err = SessionError::EmptyPayload {
            what: "audio".to_string(),
        };
        assert_eq!(err.to_string(), "Empty payload: audio");
    }

    #[test]
    fn test_mcp_error_display() {
        let err = McpError::UnknownTool {
            tool_name: "nonexistent".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown tool: nonexistent");

        let err = McpError::InvalidParameters {
            tool_name: "interview_submit_answer".to_string(),
            message: "missing session_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for interview_submit_answer: missing session_id"
        );
    }

    #[test]
    fn test_session_error_conversion_to_mcp_error() {
        let err: McpError = SessionError::NotFound {
            session_id: "sess_x".to_string(),
        }
        .into();
        assert!(matches!(err, McpError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("Session not found: sess_x"));
    }

    #[test]
    fn test_io_and_mcp_errors_convert_to_app_error() {
        let app_err: AppError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed").into();
        assert!(matches!(app_err, AppError::Io(_)));
        assert_eq!(app_err.to_string(), "I/O error: stdout closed");

        let app_err: AppError = McpError::InvalidRequest {
            message: "bad".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Mcp(_)));
    }

    #[test]
    fn test_collaborator_error_conversion_to_app_error() {
        let app_err: AppError = CollaboratorError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Collaborator(_)));
    }
}
