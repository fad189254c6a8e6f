use async_trait::async_trait;

use super::PersonalizationMemory;
use crate::storage::ContextGraph;

/// The context graph doubles as personalization memory.
#[async_trait]
impl PersonalizationMemory for ContextGraph {
    async fn context(&self, user_id: &str, _question: &str) -> String {
        self.user_context(user_id).await
    }

    async fn rag_snippets(&self, user_id: &str, limit: usize) -> Vec<String> {
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);
        self.recent_transcripts(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AnswerRecord, SqliteGraphStore, STUB_PREFIX};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_disabled_graph_memory_is_stub() {
        let memory = ContextGraph::disabled();
        assert!(memory.context("u1", "q").await.starts_with(STUB_PREFIX));
        assert!(memory.rag_snippets("u1", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_live_graph_memory() {
        let store = SqliteGraphStore::new_in_memory().await.unwrap();
        let graph = ContextGraph::new(Arc::new(store));

        assert_eq!(
            graph.context("u1", "q").await,
            "No history yet. This is the first answer."
        );

        let answer = AnswerRecord {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            role: "PM".to_string(),
            company: "Acme".to_string(),
            question_number: 1,
            question: "Tell me about yourself.".to_string(),
            transcript: "I led the payments team.".to_string(),
            duration_seconds: 30,
            stress: Some(0.4),
            confidence: Some(0.6),
            fact_correct: None,
        };
        graph.ingest_answer(&answer, &[]).await;

        assert!(graph.context("u1", "q").await.starts_with("Profile: 1 answers stored."));
        assert_eq!(
            graph.rag_snippets("u1", 5).await,
            vec!["I led the payments team.".to_string()]
        );
    }
}
