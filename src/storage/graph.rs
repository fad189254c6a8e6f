use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    AnswerRecord, DecisionRecord, EntityNode, GraphStore, SessionGraph, SqliteGraphStore,
    UserNode, UserStats,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Prefix marking text that carries no real data.
pub const STUB_PREFIX: &str = "[Stub]";

const TOP_LABELS_IN_CONTEXT: usize = 6;

/// Store used when persistence is disabled: writes succeed, reads are empty.
#[derive(Debug, Clone, Default)]
pub struct NullGraphStore;

#[async_trait]
impl GraphStore for NullGraphStore {
    async fn register_user(&self, _user: &UserNode) -> StorageResult<()> {
        Ok(())
    }

    async fn ingest_answer(
        &self,
        _answer: &AnswerRecord,
        _entities: &[EntityNode],
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn ingest_decision(&self, _decision: &DecisionRecord) -> StorageResult<()> {
        Ok(())
    }

    async fn entity_label_counts(&self, _user_id: &str) -> StorageResult<HashMap<String, u32>> {
        Ok(HashMap::new())
    }

    async fn session_graph(&self, session_id: &str) -> StorageResult<SessionGraph> {
        Ok(SessionGraph::empty(session_id))
    }

    async fn session_transcripts(&self, _session_id: &str) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn user_stats(&self, _user_id: &str) -> StorageResult<UserStats> {
        Err(StorageError::Disabled)
    }

    async fn recent_transcripts(&self, _user_id: &str, _limit: u32) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Best-effort view over a [`GraphStore`].
///
/// Nothing here returns an error. A failing write is logged and dropped, a
/// failing read is logged and answered with an empty value, so a broken
/// store can never stop a turn from completing.
#[derive(Clone)]
pub struct ContextGraph {
    store: Arc<dyn GraphStore>,
    live: bool,
}

impl ContextGraph {
    /// Wrap a live store.
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store, live: true }
    }

    /// A graph backed by [`NullGraphStore`].
    pub fn disabled() -> Self {
        Self {
            store: Arc::new(NullGraphStore),
            live: false,
        }
    }

    /// Open the configured SQLite store.
    ///
    /// Falls back to [`ContextGraph::disabled`] when the store is turned off
    /// or cannot be opened, so the server still starts and sessions run
    /// without history.
    pub async fn open(config: &DatabaseConfig) -> Self {
        if !config.enabled {
            warn!("Context graph disabled, answers will not be persisted");
            return Self::disabled();
        }

        match SqliteGraphStore::new(config).await {
            Ok(store) => {
                info!(path = %config.path.display(), "Context graph initialized");
                Self::new(Arc::new(store))
            }
            Err(e) => {
                warn!(
                    path = %config.path.display(),
                    error = %e,
                    "Context graph unavailable, continuing without persistence"
                );
                Self::disabled()
            }
        }
    }

    /// Whether a real store is attached.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub async fn register_user(&self, user: &UserNode) {
        if let Err(e) = self.store.register_user(user).await {
            warn!(user_id = %user.user_id, error = %e, "Failed to register user");
        }
    }

    pub async fn ingest_answer(&self, answer: &AnswerRecord, entities: &[EntityNode]) {
        if let Err(e) = self.store.ingest_answer(answer, entities).await {
            warn!(
                session_id = %answer.session_id,
                question_number = answer.question_number,
                error = %e,
                "Failed to ingest answer"
            );
        }
    }

    pub async fn ingest_decision(&self, decision: &DecisionRecord) {
        if let Err(e) = self.store.ingest_decision(decision).await {
            warn!(
                session_id = %decision.session_id,
                question_number = decision.question_number,
                error = %e,
                "Failed to ingest decision"
            );
        }
    }

    pub async fn entity_label_counts(&self, user_id: &str) -> HashMap<String, u32> {
        self.store
            .entity_label_counts(user_id)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id = %user_id, error = %e, "Failed to read entity label counts");
                HashMap::new()
            })
    }

    pub async fn session_graph(&self, session_id: &str) -> SessionGraph {
        self.store
            .session_graph(session_id)
            .await
            .unwrap_or_else(|e| {
                warn!(session_id = %session_id, error = %e, "Failed to read session graph");
                SessionGraph::empty(session_id)
            })
    }

    pub async fn session_transcripts(&self, session_id: &str) -> Vec<String> {
        self.store
            .session_transcripts(session_id)
            .await
            .unwrap_or_else(|e| {
                warn!(session_id = %session_id, error = %e, "Failed to read session transcripts");
                Vec::new()
            })
    }

    pub async fn recent_transcripts(&self, user_id: &str, limit: u32) -> Vec<String> {
        self.store
            .recent_transcripts(user_id, limit)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id = %user_id, error = %e, "Failed to read recent transcripts");
                Vec::new()
            })
    }

    /// One-line profile summary of everything stored for a user.
    pub async fn user_context(&self, user_id: &str) -> String {
        if !self.live {
            debug!(user_id = %user_id, "Graph store disabled, returning stub context");
            return format!("{} Context graph disabled.", STUB_PREFIX);
        }

        match self.store.user_stats(user_id).await {
            Ok(stats) => format_user_context(&stats),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read user stats");
                format!("{} Context graph query failed.", STUB_PREFIX)
            }
        }
    }
}

fn format_user_context(stats: &UserStats) -> String {
    if stats.answer_count == 0 {
        return "No history yet. This is the first answer.".to_string();
    }

    let mut parts = vec![format!("Profile: {} answers stored.", stats.answer_count)];
    if let Some(stress) = stats.avg_stress {
        parts.push(format!("Baseline stress≈{:.2}.", stress));
    }
    if let Some(confidence) = stats.avg_confidence {
        parts.push(format!("Baseline confidence≈{:.2}.", confidence));
    }
    let labels: Vec<String> = stats
        .top_labels
        .iter()
        .take(TOP_LABELS_IN_CONTEXT)
        .map(|(label, count)| format!("{}({})", label, count))
        .collect();
    if !labels.is_empty() {
        parts.push(format!("Top entities: {}.", labels.join(", ")));
    }
    parts.join(" ")
}
