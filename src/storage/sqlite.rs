use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    answer_id, decision_id, AnswerRecord, DecisionRecord, EdgeType, EntityNode, GraphAssembler,
    GraphEdge, GraphNode, GraphStore, SessionGraph, UserNode, UserStats,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::signals::Tone;
use crate::text::preview;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const TRANSCRIPT_PREVIEW_CHARS: usize = 80;
const NEXT_QUESTION_PREVIEW_CHARS: usize = 60;
const TOP_LABELS: usize = 6;

/// SQLite-backed context graph
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Open (creating if needed) the database at the configured path
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// SQLite memory connection is its own database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

async fn upsert_user(conn: &mut SqliteConnection, user: &UserNode) -> StorageResult<()> {
    let ts = now();
    sqlx::query(
        r#"
        INSERT INTO users (user_id, role, company, level, difficulty, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            role = COALESCE(excluded.role, users.role),
            company = COALESCE(excluded.company, users.company),
            level = COALESCE(excluded.level, users.level),
            difficulty = COALESCE(excluded.difficulty, users.difficulty),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.role)
    .bind(&user.company)
    .bind(&user.level)
    .bind(&user.difficulty)
    .bind(&ts)
    .bind(&ts)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Upsert a session; empty role or company keeps the stored value.
async fn upsert_session(
    conn: &mut SqliteConnection,
    session_id: &str,
    user_id: &str,
    role: &str,
    company: &str,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (session_id, user_id, role, company, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            role = CASE WHEN excluded.role <> '' THEN excluded.role ELSE sessions.role END,
            company = CASE WHEN excluded.company <> '' THEN excluded.company ELSE sessions.company END
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .bind(role)
    .bind(company)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn link(
    conn: &mut SqliteConnection,
    source: &str,
    target: &str,
    edge_type: EdgeType,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO edges (source, target, edge_type, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(source)
    .bind(target)
    .bind(edge_type.as_str())
    .bind(now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn decision_exists(conn: &mut SqliteConnection, id: &str) -> StorageResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM decisions WHERE decision_id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn register_user(&self, user: &UserNode) -> StorageResult<()> {
        if user.user_id.trim().is_empty() {
            return Err(StorageError::InvalidRecord {
                message: "user_id is empty".to_string(),
            });
        }
        let mut conn = self.pool.acquire().await?;
        upsert_user(&mut conn, user).await
    }

    async fn ingest_answer(
        &self,
        answer: &AnswerRecord,
        entities: &[EntityNode],
    ) -> StorageResult<()> {
        answer.validate()?;
        let answer_key = answer.answer_id();

        let mut tx = self.pool.begin().await?;

        upsert_user(&mut tx, &UserNode::new(&answer.user_id)).await?;
        upsert_session(
            &mut tx,
            &answer.session_id,
            &answer.user_id,
            &answer.role,
            &answer.company,
        )
        .await?;
        link(&mut tx, &answer.user_id, &answer.session_id, EdgeType::HasSession).await?;

        sqlx::query(
            r#"
            INSERT INTO answers (answer_id, session_id, question_number, question, transcript,
                                 duration_seconds, stress, confidence, fact_correct, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(answer_id) DO UPDATE SET
                question = excluded.question,
                transcript = excluded.transcript,
                duration_seconds = excluded.duration_seconds,
                stress = excluded.stress,
                confidence = excluded.confidence,
                fact_correct = excluded.fact_correct
            "#,
        )
        .bind(&answer_key)
        .bind(&answer.session_id)
        .bind(i64::from(answer.question_number))
        .bind(&answer.question)
        .bind(&answer.transcript)
        .bind(i64::from(answer.duration_seconds))
        .bind(answer.stress)
        .bind(answer.confidence)
        .bind(answer.fact_correct)
        .bind(now())
        .execute(&mut *tx)
        .await?;
        link(&mut tx, &answer.session_id, &answer_key, EdgeType::HasAnswer).await?;

        let mut mentioned = 0usize;
        for entity in entities.iter().filter(|e| e.is_valid()) {
            let entity_key = entity.entity_id();
            sqlx::query("INSERT OR IGNORE INTO entities (entity_id, label, text) VALUES (?, ?, ?)")
                .bind(&entity_key)
                .bind(&entity.label)
                .bind(&entity.text)
                .execute(&mut *tx)
                .await?;
            link(&mut tx, &answer_key, &entity_key, EdgeType::Mentions).await?;
            mentioned += 1;
        }

        tx.commit().await?;

        debug!(answer_id = %answer_key, entities = mentioned, "Answer ingested");
        Ok(())
    }

    async fn ingest_decision(&self, decision: &DecisionRecord) -> StorageResult<()> {
        decision.validate()?;
        let answer_key = decision.answer_id();
        let decision_key = decision.decision_id();
        let q = decision.question_number;

        let mut tx = self.pool.begin().await?;

        upsert_user(&mut tx, &UserNode::new(&decision.user_id)).await?;
        upsert_session(&mut tx, &decision.session_id, &decision.user_id, "", "").await?;
        link(&mut tx, &decision.user_id, &decision.session_id, EdgeType::HasSession).await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO answers (answer_id, session_id, question_number, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&answer_key)
        .bind(&decision.session_id)
        .bind(i64::from(q))
        .bind(now())
        .execute(&mut *tx)
        .await?;
        link(&mut tx, &decision.session_id, &answer_key, EdgeType::HasAnswer).await?;

        sqlx::query(
            r#"
            INSERT INTO decisions (decision_id, session_id, question_number, tone, difficulty_delta,
                                   next_question, feedback_note, reasoning, stress, confidence,
                                   fact_correct, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(decision_id) DO UPDATE SET
                tone = excluded.tone,
                difficulty_delta = excluded.difficulty_delta,
                next_question = excluded.next_question,
                feedback_note = excluded.feedback_note,
                reasoning = excluded.reasoning,
                stress = excluded.stress,
                confidence = excluded.confidence,
                fact_correct = excluded.fact_correct
            "#,
        )
        .bind(&decision_key)
        .bind(&decision.session_id)
        .bind(i64::from(q))
        .bind(decision.tone.as_str())
        .bind(i64::from(decision.difficulty_delta))
        .bind(&decision.next_question)
        .bind(&decision.feedback_note)
        .bind(&decision.reasoning)
        .bind(decision.stress)
        .bind(decision.confidence)
        .bind(decision.fact_correct)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        link(&mut tx, &decision.session_id, &decision_key, EdgeType::HasDecision).await?;
        link(&mut tx, &answer_key, &decision_key, EdgeType::LedTo).await?;

        // Chain in both directions so out-of-order ingestion still links neighbors.
        if q > 1 {
            let prev = decision_id(&decision.session_id, q - 1);
            if decision_exists(&mut tx, &prev).await? {
                link(&mut tx, &prev, &decision_key, EdgeType::PrecedentFor).await?;
            }
        }
        let next = decision_id(&decision.session_id, q + 1);
        if decision_exists(&mut tx, &next).await? {
            link(&mut tx, &decision_key, &next, EdgeType::PrecedentFor).await?;
        }

        tx.commit().await?;

        debug!(decision_id = %decision_key, tone = %decision.tone, "Decision ingested");
        Ok(())
    }

    async fn entity_label_counts(&self, user_id: &str) -> StorageResult<HashMap<String, u32>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT en.label, COUNT(*)
            FROM edges hs
            JOIN edges ha ON ha.source = hs.target AND ha.edge_type = 'HAS_ANSWER'
            JOIN edges m ON m.source = ha.target AND m.edge_type = 'MENTIONS'
            JOIN entities en ON en.entity_id = m.target
            WHERE hs.source = ? AND hs.edge_type = 'HAS_SESSION'
            GROUP BY en.label
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(label, count)| (label, u32::try_from(count).unwrap_or(u32::MAX)))
            .collect())
    }

    async fn session_graph(&self, session_id: &str) -> StorageResult<SessionGraph> {
        let session: Option<SessionRow> = sqlx::query_as(
            "SELECT session_id, role, company FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(session) = session else {
            return Ok(SessionGraph::empty(session_id));
        };

        let mut graph = GraphAssembler::new(session_id);
        graph.node(GraphNode::Session {
            id: session.session_id,
            role: session.role,
            company: session.company,
        });

        let answers: Vec<AnswerRow> = sqlx::query_as(
            r#"
            SELECT answer_id, question_number, transcript
            FROM answers
            WHERE session_id = ?
            ORDER BY question_number ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        for row in answers {
            graph.edge(GraphEdge::new(session_id, &row.answer_id, EdgeType::HasAnswer));
            graph.node(row.into());
        }

        let mentions: Vec<MentionRow> = sqlx::query_as(
            r#"
            SELECT m.source AS answer_id, en.entity_id, en.label, en.text
            FROM answers a
            JOIN edges m ON m.source = a.answer_id AND m.edge_type = 'MENTIONS'
            JOIN entities en ON en.entity_id = m.target
            WHERE a.session_id = ?
            ORDER BY a.question_number ASC, en.label ASC, en.text ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        for row in mentions {
            graph.edge(GraphEdge::new(&row.answer_id, &row.entity_id, EdgeType::Mentions));
            graph.node(GraphNode::Entity {
                id: row.entity_id,
                label: row.label,
                text: row.text,
            });
        }

        let decisions: Vec<DecisionRow> = sqlx::query_as(
            r#"
            SELECT decision_id, question_number, tone, next_question
            FROM decisions
            WHERE session_id = ?
            ORDER BY question_number ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        for row in decisions {
            let q = u32::try_from(row.question_number).unwrap_or(0);
            graph.edge(GraphEdge::new(session_id, &row.decision_id, EdgeType::HasDecision));
            graph.edge(GraphEdge::new(
                answer_id(session_id, q),
                &row.decision_id,
                EdgeType::LedTo,
            ));
            graph.node(row.try_into()?);
        }

        let precedents: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT e.source, e.target
            FROM edges e
            JOIN decisions d ON d.decision_id = e.target
            WHERE e.edge_type = 'PRECEDENT_FOR' AND d.session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        for (source, target) in precedents {
            if graph.has_node(&source) && graph.has_node(&target) {
                graph.edge(GraphEdge::new(source, target, EdgeType::PrecedentFor));
            }
        }

        Ok(graph.finish())
    }

    async fn session_transcripts(&self, session_id: &str) -> StorageResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT transcript
            FROM answers
            WHERE session_id = ? AND transcript <> ''
            ORDER BY question_number ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    async fn user_stats(&self, user_id: &str) -> StorageResult<UserStats> {
        let (count, avg_stress, avg_confidence): (i64, Option<f64>, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), AVG(a.stress), AVG(a.confidence)
            FROM answers a
            JOIN sessions s ON s.session_id = a.session_id
            WHERE s.user_id = ? AND a.transcript <> ''
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let mut top_labels: Vec<(String, u32)> =
            self.entity_label_counts(user_id).await?.into_iter().collect();
        top_labels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_labels.truncate(TOP_LABELS);

        Ok(UserStats {
            answer_count: u32::try_from(count).unwrap_or(u32::MAX),
            avg_stress,
            avg_confidence,
            top_labels,
        })
    }

    async fn recent_transcripts(&self, user_id: &str, limit: u32) -> StorageResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT a.transcript
            FROM answers a
            JOIN sessions s ON s.session_id = a.session_id
            WHERE s.user_id = ? AND a.transcript <> ''
            ORDER BY a.created_at DESC, a.rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    role: String,
    company: String,
}

#[derive(sqlx::FromRow)]
struct AnswerRow {
    answer_id: String,
    question_number: i64,
    transcript: String,
}

impl From<AnswerRow> for GraphNode {
    fn from(row: AnswerRow) -> Self {
        GraphNode::Answer {
            id: row.answer_id,
            question_number: u32::try_from(row.question_number).unwrap_or(0),
            transcript_preview: preview(&row.transcript, TRANSCRIPT_PREVIEW_CHARS),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MentionRow {
    answer_id: String,
    entity_id: String,
    label: String,
    text: String,
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    decision_id: String,
    question_number: i64,
    tone: String,
    next_question: String,
}

impl TryFrom<DecisionRow> for GraphNode {
    type Error = StorageError;

    fn try_from(row: DecisionRow) -> Result<Self, Self::Error> {
        let tone = Tone::from_str(&row.tone).map_err(|message| StorageError::InvalidRecord {
            message,
        })?;
        Ok(GraphNode::Decision {
            id: row.decision_id,
            question_number: u32::try_from(row.question_number).unwrap_or(0),
            tone,
            next_question_preview: preview(&row.next_question, NEXT_QUESTION_PREVIEW_CHARS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(session: &str, q: u32, transcript: &str) -> AnswerRecord {
        AnswerRecord {
            user_id: "u1".to_string(),
            session_id: session.to_string(),
            role: "PM".to_string(),
            company: "Acme".to_string(),
            question_number: q,
            question: format!("Question {}", q),
            transcript: transcript.to_string(),
            duration_seconds: 30,
            stress: Some(0.3),
            confidence: Some(0.7),
            fact_correct: None,
        }
    }

    fn decision(session: &str, q: u32) -> DecisionRecord {
        DecisionRecord {
            user_id: "u1".to_string(),
            session_id: session.to_string(),
            question_number: q,
            tone: Tone::Neutral,
            difficulty_delta: 0,
            next_question: format!("Next after {}", q),
            feedback_note: "Good structure.".to_string(),
            reasoning: None,
            stress: Some(0.3),
            confidence: Some(0.7),
            fact_correct: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_starts_empty() {
        let store = SqliteGraphStore::new_in_memory().await.unwrap();
        let graph = store.session_graph("missing").await.unwrap();
        assert!(graph.nodes.is_empty());
        assert!(store.entity_label_counts("u1").await.unwrap().is_empty());
        assert_eq!(store.user_stats("u1").await.unwrap().answer_count, 0);
    }

    #[tokio::test]
    async fn test_answer_ingest_is_idempotent() {
        let store = SqliteGraphStore::new_in_memory().await.unwrap();
        let entities = vec![EntityNode::new("TECHNICAL_SKILL", "Rust")];
        let record = answer("s1", 1, "I shipped a Rust service.");

        store.ingest_answer(&record, &entities).await.unwrap();
        store.ingest_answer(&record, &entities).await.unwrap();

        let graph = store.session_graph("s1").await.unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges_of(EdgeType::Mentions).len(), 1);
        assert_eq!(graph.edges_of(EdgeType::HasAnswer).len(), 1);

        let counts = store.entity_label_counts("u1").await.unwrap();
        assert_eq!(counts.get("TECHNICAL_SKILL"), Some(&1));
    }

    #[tokio::test]
    async fn test_invalid_entities_are_skipped() {
        let store = SqliteGraphStore::new_in_memory().await.unwrap();
        let entities = vec![EntityNode::new("", "orphan"), EntityNode::new("SOFT_SKILL", " ")];
        store
            .ingest_answer(&answer("s1", 1, "text"), &entities)
            .await
            .unwrap();
        assert!(store.entity_label_counts("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_decisions_still_chain() {
        let store = SqliteGraphStore::new_in_memory().await.unwrap();
        store.ingest_decision(&decision("s1", 2)).await.unwrap();
        store.ingest_decision(&decision("s1", 1)).await.unwrap();

        let graph = store.session_graph("s1").await.unwrap();
        let chain = graph.edges_of(EdgeType::PrecedentFor);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].source, decision_id("s1", 1));
        assert_eq!(chain[0].target, decision_id("s1", 2));
    }

    #[tokio::test]
    async fn test_register_user_keeps_known_fields() {
        let store = SqliteGraphStore::new_in_memory().await.unwrap();
        store
            .register_user(&UserNode::new("u1").with_target("PM", "Acme"))
            .await
            .unwrap();
        store.register_user(&UserNode::new("u1")).await.unwrap();

        let row: (Option<String>, Option<String>) =
            sqlx::query_as("SELECT role, company FROM users WHERE user_id = ?")
                .bind("u1")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(row.0.as_deref(), Some("PM"));
        assert_eq!(row.1.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn test_recent_transcripts_newest_first() {
        let store = SqliteGraphStore::new_in_memory().await.unwrap();
        for q in 1..=3 {
            store
                .ingest_answer(&answer("s1", q, &format!("answer {}", q)), &[])
                .await
                .unwrap();
        }
        let recent = store.recent_transcripts("u1", 2).await.unwrap();
        assert_eq!(recent, vec!["answer 3".to_string(), "answer 2".to_string()]);
    }
}
