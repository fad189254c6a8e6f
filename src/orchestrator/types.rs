use serde::{Deserialize, Serialize};

use crate::collaborators::{CompanyBrief, MetricsSource, ScoutUpdate};
use crate::signals::{DifficultyPreference, SignalSample, Tone};
use crate::storage::EntityNode;
use crate::topics::{SeniorityLevel, TopicSource};

/// Parameters for starting a session.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StartSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub difficulty: DifficultyPreference,
    #[serde(default)]
    pub level: SeniorityLevel,
    #[serde(default)]
    pub job_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub first_question: String,
    pub question_number: u32,
    pub difficulty: DifficultyPreference,
    pub level: SeniorityLevel,
}

/// What the learner submitted for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerPayload {
    /// Recorded audio, analyzed by the voice collaborator.
    Audio(Vec<u8>),
    /// An already transcribed answer. Voice signals are neutral.
    Transcript(String),
}

impl AnswerPayload {
    pub fn len(&self) -> usize {
        match self {
            AnswerPayload::Audio(bytes) => bytes.len(),
            AnswerPayload::Transcript(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AnswerPayload::Audio(bytes) => bytes.is_empty(),
            AnswerPayload::Transcript(text) => text.trim().is_empty(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            AnswerPayload::Audio(_) => "audio",
            AnswerPayload::Transcript(_) => "transcript",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitAnswerRequest {
    pub session_id: String,
    pub payload: AnswerPayload,
    /// Zero means unknown.
    pub duration_seconds: u32,
}

/// Everything returned after one answered turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub session_id: String,
    pub next_question: String,
    /// Number of the question now being asked.
    pub question_number: u32,
    pub tone: Tone,
    pub difficulty_delta: i8,
    pub feedback_note: String,
    pub topic_source: TopicSource,
    pub transcript: String,
    pub extracted_entities: Vec<EntityNode>,
    pub stress: f64,
    pub confidence: f64,
    pub hesitation_count: u32,
    pub metrics_source: MetricsSource,
    /// Newest samples last, at most five.
    pub signal_trend: Vec<SignalSample>,
    pub overall_score: u32,
    pub voice_pacing_score: f64,
    pub voice_coaching_tip: String,
}

/// End-of-session report. Fact-check fields may be empty, never absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub questions_answered: u32,
    pub questions_asked: u32,
    pub overall_trend: String,
    pub strengths: Vec<String>,
    pub focus_areas: Vec<String>,
    pub suggested_next_steps: Vec<String>,
    pub fact_check_summary: Option<String>,
    pub disputed_claims: Vec<String>,
    pub verified_claims: usize,
    pub total_claims: usize,
    pub fact_accuracy_pct: Option<f64>,
    pub timed_out: bool,
    pub timed_out_claims: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub question_count: u32,
    pub current_question: String,
    pub questions_asked: Vec<String>,
    pub ended: bool,
    pub has_company_brief: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CompanyBriefRequest {
    #[serde(default)]
    pub role: String,
    pub company: String,
    /// Attach the researched summary to this session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyBriefResponse {
    pub role: String,
    pub company: String,
    #[serde(flatten)]
    pub brief: CompanyBrief,
    pub summary: Option<String>,
    /// Whether the summary was attached to the requested session.
    pub attached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub summary: String,
    pub sample_snippets: Vec<String>,
}

/// Whether scout updates came from a live scout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoutStatus {
    Live,
    NoScout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutUpdatesResponse {
    pub session_id: String,
    pub scout_status: ScoutStatus,
    pub updates: Vec<ScoutUpdate>,
}
