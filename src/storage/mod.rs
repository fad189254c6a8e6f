//! Context graph storage.
//!
//! The graph records every learner (`User`), conversation (`Session`), turn
//! (`Answer`), mentioned competency (`Entity`) and coaching decision
//! (`Decision`) as nodes joined by typed edges. Identity keys are stable, so
//! every write is an upsert and retries are safe.
//!
//! [`SqliteGraphStore`] is the live backend; [`NullGraphStore`] is the stub
//! used when persistence is disabled. Callers go through [`ContextGraph`],
//! which never lets a store failure escape.

mod graph;
mod sqlite;


pub use graph::{ContextGraph, NullGraphStore, STUB_PREFIX};
pub use sqlite::SqliteGraphStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{StorageError, StorageResult};
use crate::signals::Tone;

/// A learner, upserted on every session start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserNode {
    /// Unique learner identifier.
    pub user_id: String,
    /// Target role, if known.
    pub role: Option<String>,
    /// Target company, if known.
    pub company: Option<String>,
    /// Seniority level label.
    pub level: Option<String>,
    /// Difficulty preference label.
    pub difficulty: Option<String>,
}

impl UserNode {
    /// Create a user node with only its identity key.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Attach role and company.
    pub fn with_target(mut self, role: impl Into<String>, company: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self.company = Some(company.into());
        self
    }

    /// Attach level and difficulty preference.
    pub fn with_preferences(mut self, level: impl Into<String>, difficulty: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self.difficulty = Some(difficulty.into());
        self
    }
}

/// One answered turn, keyed by `{session_id}:q{question_number}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub user_id: String,
    pub session_id: String,
    pub role: String,
    pub company: String,
    /// 1-based question number.
    pub question_number: u32,
    /// The question this answer responds to.
    pub question: String,
    pub transcript: String,
    pub duration_seconds: u32,
    pub stress: Option<f64>,
    pub confidence: Option<f64>,
    /// Whether the per-answer fact check passed, when one ran.
    pub fact_correct: Option<bool>,
}

impl AnswerRecord {
    /// Identity key of this answer.
    pub fn answer_id(&self) -> String {
        answer_id(&self.session_id, self.question_number)
    }

    /// Reject records that would corrupt identity keys or carry out-of-range signals.
    pub fn validate(&self) -> StorageResult<()> {
        validate_keys(&self.user_id, &self.session_id, self.question_number)?;
        validate_unit("stress", self.stress)?;
        validate_unit("confidence", self.confidence)
    }
}

/// A labeled span mentioned by an answer, deduplicated by `(label, text)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityNode {
    pub label: String,
    pub text: String,
}

impl EntityNode {
    /// Create an entity.
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }

    /// Identity key of this entity.
    pub fn entity_id(&self) -> String {
        format!("{}:{}", self.label, self.text)
    }

    /// Entities with an empty label or text are dropped at ingest.
    pub fn is_valid(&self) -> bool {
        !self.label.trim().is_empty() && !self.text.trim().is_empty()
    }
}

/// The coaching decision made after one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub user_id: String,
    pub session_id: String,
    pub question_number: u32,
    pub tone: Tone,
    /// Relative difficulty instruction in {-1, 0, +1}.
    pub difficulty_delta: i8,
    pub next_question: String,
    pub feedback_note: String,
    pub reasoning: Option<String>,
    pub stress: Option<f64>,
    pub confidence: Option<f64>,
    pub fact_correct: Option<bool>,
}

impl DecisionRecord {
    /// Identity key of the answer that triggered this decision.
    pub fn answer_id(&self) -> String {
        answer_id(&self.session_id, self.question_number)
    }

    /// Identity key of this decision.
    pub fn decision_id(&self) -> String {
        decision_id(&self.session_id, self.question_number)
    }

    /// Validate identity keys, delta range and signal ranges.
    pub fn validate(&self) -> StorageResult<()> {
        validate_keys(&self.user_id, &self.session_id, self.question_number)?;
        if !(-1..=1).contains(&self.difficulty_delta) {
            return Err(StorageError::InvalidRecord {
                message: format!("difficulty_delta out of range: {}", self.difficulty_delta),
            });
        }
        validate_unit("stress", self.stress)?;
        validate_unit("confidence", self.confidence)
    }
}

/// Answer identity key.
pub fn answer_id(session_id: &str, question_number: u32) -> String {
    format!("{}:q{}", session_id, question_number)
}

/// Decision identity key.
pub fn decision_id(session_id: &str, question_number: u32) -> String {
    format!("{}:decision", answer_id(session_id, question_number))
}

fn validate_keys(user_id: &str, session_id: &str, question_number: u32) -> StorageResult<()> {
    if user_id.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            message: "user_id is empty".to_string(),
        });
    }
    if session_id.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            message: "session_id is empty".to_string(),
        });
    }
    if question_number == 0 {
        return Err(StorageError::InvalidRecord {
            message: "question_number starts at 1".to_string(),
        });
    }
    Ok(())
}

fn validate_unit(field: &str, value: Option<f64>) -> StorageResult<()> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(StorageError::InvalidRecord {
            message: format!("{} out of range [0, 1]: {}", field, v),
        }),
        _ => Ok(()),
    }
}

/// Typed relationship between graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// User -> Session.
    HasSession,
    /// Session -> Answer.
    HasAnswer,
    /// Answer -> Entity.
    Mentions,
    /// Session -> Decision.
    HasDecision,
    /// Answer -> Decision.
    LedTo,
    /// Decision(q-1) -> Decision(q).
    PrecedentFor,
}

impl EdgeType {
    /// Storage and wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::HasSession => "HAS_SESSION",
            EdgeType::HasAnswer => "HAS_ANSWER",
            EdgeType::Mentions => "MENTIONS",
            EdgeType::HasDecision => "HAS_DECISION",
            EdgeType::LedTo => "LED_TO",
            EdgeType::PrecedentFor => "PRECEDENT_FOR",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HAS_SESSION" => Ok(EdgeType::HasSession),
            "HAS_ANSWER" => Ok(EdgeType::HasAnswer),
            "MENTIONS" => Ok(EdgeType::Mentions),
            "HAS_DECISION" => Ok(EdgeType::HasDecision),
            "LED_TO" => Ok(EdgeType::LedTo),
            "PRECEDENT_FOR" => Ok(EdgeType::PrecedentFor),
            _ => Err(format!("Unknown edge type: {}", s)),
        }
    }
}

/// A node in a session subgraph, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphNode {
    Session {
        id: String,
        role: String,
        company: String,
    },
    Answer {
        id: String,
        question_number: u32,
        transcript_preview: String,
    },
    Entity {
        id: String,
        label: String,
        text: String,
    },
    Decision {
        id: String,
        question_number: u32,
        tone: Tone,
        next_question_preview: String,
    },
}

impl GraphNode {
    /// Identity key of the node.
    pub fn id(&self) -> &str {
        match self {
            GraphNode::Session { id, .. }
            | GraphNode::Answer { id, .. }
            | GraphNode::Entity { id, .. }
            | GraphNode::Decision { id, .. } => id,
        }
    }
}

/// A directed, typed edge between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

impl GraphEdge {
    /// Create an edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
        }
    }
}

/// Nodes and edges reachable from one session, deduplicated by identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionGraph {
    pub session_id: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl SessionGraph {
    /// A graph with no nodes.
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Edges of one type, in insertion order.
    pub fn edges_of(&self, edge_type: EdgeType) -> Vec<&GraphEdge> {
        self.edges
            .iter()
            .filter(|e| e.edge_type == edge_type)
            .collect()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }
}

/// Builds a [`SessionGraph`] while dropping duplicate nodes and edges.
pub(crate) struct GraphAssembler {
    graph: SessionGraph,
    seen_nodes: HashSet<String>,
    seen_edges: HashSet<GraphEdge>,
}

impl GraphAssembler {
    pub(crate) fn new(session_id: &str) -> Self {
        Self {
            graph: SessionGraph::empty(session_id),
            seen_nodes: HashSet::new(),
            seen_edges: HashSet::new(),
        }
    }

    pub(crate) fn node(&mut self, node: GraphNode) {
        if self.seen_nodes.insert(node.id().to_string()) {
            self.graph.nodes.push(node);
        }
    }

    pub(crate) fn has_node(&self, id: &str) -> bool {
        self.seen_nodes.contains(id)
    }

    pub(crate) fn edge(&mut self, edge: GraphEdge) {
        if self.seen_edges.insert(edge.clone()) {
            self.graph.edges.push(edge);
        }
    }

    pub(crate) fn finish(self) -> SessionGraph {
        self.graph
    }
}

/// Aggregate signal statistics for one learner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub answer_count: u32,
    pub avg_stress: Option<f64>,
    pub avg_confidence: Option<f64>,
    /// Most-mentioned entity labels with their counts, descending.
    pub top_labels: Vec<(String, u32)>,
}

/// Storage backend for the context graph.
///
/// All writes merge by identity key. Reads return empty collections for
/// unknown keys rather than errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert a user; `None` fields keep their stored values.
    async fn register_user(&self, user: &UserNode) -> StorageResult<()>;

    /// Upsert the user, session and answer nodes, then the answer's entities.
    async fn ingest_answer(&self, answer: &AnswerRecord, entities: &[EntityNode])
        -> StorageResult<()>;

    /// Upsert a decision and link it into its session's precedent chain.
    async fn ingest_decision(&self, decision: &DecisionRecord) -> StorageResult<()>;

    /// Count entity mentions per label across all of a user's answers.
    async fn entity_label_counts(&self, user_id: &str) -> StorageResult<HashMap<String, u32>>;

    /// Session, answers, mentioned entities and decisions for one session.
    async fn session_graph(&self, session_id: &str) -> StorageResult<SessionGraph>;

    /// Non-empty transcripts of a session ordered by question number.
    async fn session_transcripts(&self, session_id: &str) -> StorageResult<Vec<String>>;

    /// Aggregate statistics over all of a user's answers.
    async fn user_stats(&self, user_id: &str) -> StorageResult<UserStats>;

    /// The user's most recent non-empty transcripts, newest first.
    async fn recent_transcripts(&self, user_id: &str, limit: u32) -> StorageResult<Vec<String>>;
}
