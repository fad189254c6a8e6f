//! # Interview Coach
//!
//! Adaptive core of an interview-practice coach, served as a Model Context
//! Protocol (MCP) server over stdio.
//!
//! After every answer the coach fuses voice signals into a tone and a
//! difficulty change, picks the next question's topic, and records the
//! answer and the decision in a per-user context graph. Ending a session
//! fact-checks the claims made in its answers under a single deadline.
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → McpServer (stdio) → InterviewOrchestrator
//!                                     ├─ signals / topics / scoring (pure)
//!                                     ├─ collaborators (HTTP or offline)
//!                                     └─ ContextGraph → SQLite
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use interview_coach::{AppState, Config, McpServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::from_config(config).await?;
//!     McpServer::new(Arc::new(state)).run().await?;
//!     Ok(())
//! }
//! ```

/// End-of-session claim extraction and bounded verification.
pub mod claims;
/// External collaborator traits with live and offline implementations.
pub mod collaborators;
/// Configuration management.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Per-answer pipeline and session lifecycle.
pub mod orchestrator;
/// Learner-facing question and feedback text.
pub mod prompts;
/// Answer scoring and voice coaching.
pub mod scoring;
/// MCP server implementation and request handling.
pub mod server;
/// In-memory session table.
pub mod session;
/// Voice-signal fusion into tone and difficulty.
pub mod signals;
/// Context graph persistence.
pub mod storage;
/// Character-safe string helpers.
pub mod text;
/// Next-question topic selection.
pub mod topics;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::InterviewOrchestrator;
pub use server::{AppState, McpServer, SharedState};
