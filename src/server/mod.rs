//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::error::AppResult;
use crate::orchestrator::InterviewOrchestrator;
use crate::storage::ContextGraph;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Session orchestrator every tool delegates to.
    pub orchestrator: Arc<InterviewOrchestrator>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, orchestrator: InterviewOrchestrator) -> Self {
        tracing::info!(
            graph_live = orchestrator.graph().is_live(),
            fact_check_timeout_ms = config.session.fact_check_timeout_ms,
            "AppState initializing"
        );

        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

impl AppState {
    /// Open the context graph and collaborators named by `config`.
    ///
    /// An unusable graph store degrades to a disabled graph. Only a
    /// collaborator client that cannot be built is an error.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let graph = ContextGraph::open(&config.database).await;
        let collaborators = Collaborators::from_config(&config, graph.clone())?;
        let orchestrator = InterviewOrchestrator::new(config.session.clone(), graph, collaborators);
        Ok(Self::new(config, orchestrator))
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
