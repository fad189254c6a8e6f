//! Session orchestration.
//!
//! [`InterviewOrchestrator`] runs the per-answer pipeline
//!
//! ```text
//! payload -> voice analysis -> entity extraction -> ingest answer
//!         -> memory context -> signal fusion + topic selection
//!         -> ingest decision -> session state update
//! ```
//!
//! and the end-of-session report with its bounded fact-check fan-out.
//! Collaborator and store failures are logged and replaced with neutral
//! values; only caller input errors reach the caller as [`SessionError`].

mod types;

pub use types::*;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::claims::FactCheckFanOut;
use crate::collaborators::{entity_schema, Collaborators, VoiceAnalysis};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::prompts;
use crate::scoring::ScoringPolicy;
use crate::session::{SessionState, SessionStore};
use crate::signals::{fuse, SignalSample};
use crate::storage::{AnswerRecord, ContextGraph, DecisionRecord, SessionGraph, UserNode, STUB_PREFIX};
use crate::text::truncate_chars;
use crate::topics::{TopicInput, TopicSelector};

/// Answers with no usable transcript are stored under this text.
pub const NO_TRANSCRIPT: &str = "(no transcript)";

/// Job descriptions longer than this may replace the fixed opener.
const JD_OPENER_MIN_CHARS: usize = 100;
const DEFAULT_DURATION_SECONDS: u32 = 30;
const RAG_SNIPPETS: usize = 5;
const SIGNAL_TREND_LEN: usize = 5;
const SCOUT_UPDATE_LIMIT: usize = 3;

const MAX_QUESTION_CHARS: usize = 400;
const MAX_TRANSCRIPT_CHARS: usize = 4000;
const MAX_NOTE_CHARS: usize = 500;
const MAX_REASONING_CHARS: usize = 800;

const FEEDBACK_QUERY: &str = "What behavioral or technical topics has this user struggled with?";
const PROFILE_QUERY: &str = "Summarize this learner's strengths, weak topics and stress patterns.";

/// Drives interview sessions.
pub struct InterviewOrchestrator {
    config: SessionConfig,
    sessions: Arc<SessionStore>,
    graph: ContextGraph,
    collaborators: Collaborators,
    selector: TopicSelector,
    scoring: ScoringPolicy,
    fact_check: FactCheckFanOut,
    /// One scout per learner, keyed by user id.
    scouts: RwLock<HashMap<String, String>>,
    rng: Mutex<StdRng>,
}

impl InterviewOrchestrator {
    /// Create an orchestrator with its own empty session table.
    pub fn new(config: SessionConfig, graph: ContextGraph, collaborators: Collaborators) -> Self {
        let fact_check = FactCheckFanOut::new(
            Arc::clone(&collaborators.verifier),
            Duration::from_millis(config.fact_check_timeout_ms),
        );
        let sessions = Arc::new(SessionStore::with_ended_capacity(
            config.ended_session_retention,
        ));
        Self {
            config,
            sessions,
            graph,
            collaborators,
            selector: TopicSelector::new(),
            scoring: ScoringPolicy::new(),
            fact_check,
            scouts: RwLock::new(HashMap::new()),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Use a shared session table.
    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Make random choices reproducible.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn graph(&self) -> &ContextGraph {
        &self.graph
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Start a session and return its first question.
    ///
    /// Company research is primed in a detached task that never delays
    /// this call.
    pub async fn start_session(&self, request: StartSessionRequest) -> SessionResult<StartSessionResponse> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(SessionError::Validation {
                field: "user_id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let session_id = format!("sess_{}", Uuid::new_v4().simple());
        let role = request.role.trim().to_string();
        let company = request.company.trim().to_string();
        let job_description = request
            .job_description
            .as_deref()
            .map(str::trim)
            .filter(|jd| !jd.is_empty())
            .map(str::to_string);

        self.graph
            .register_user(
                &UserNode::new(user_id)
                    .with_target(role.as_str(), company.as_str())
                    .with_preferences(request.level.as_str(), request.difficulty.as_str()),
            )
            .await;

        let first_question = self.first_question(&role, &company, job_description.as_deref());

        let state = SessionState::new(
            session_id.as_str(),
            user_id,
            role.as_str(),
            company.as_str(),
            request.difficulty,
            request.level,
            job_description,
            first_question.as_str(),
            self.config.history_len,
        );
        self.sessions.insert(state).await;
        self.spawn_priming(&session_id, &role, &company).await;

        info!(
            session_id = %session_id,
            user_id = %user_id,
            role = %role,
            company = %company,
            difficulty = %request.difficulty,
            level = %request.level,
            "Session started"
        );

        Ok(StartSessionResponse {
            session_id,
            first_question,
            question_number: 1,
            difficulty: request.difficulty,
            level: request.level,
        })
    }

    fn first_question(&self, role: &str, company: &str, job_description: Option<&str>) -> String {
        let long_jd = job_description.is_some_and(|jd| jd.chars().count() > JD_OPENER_MIN_CHARS);
        let probability = self.config.jd_opener_probability.clamp(0.0, 1.0);
        if long_jd && self.with_rng(|rng| rng.random_bool(probability)) {
            prompts::jd_first_question(role, company)
        } else {
            prompts::DEFAULT_FIRST_QUESTION.to_string()
        }
    }

    /// Research the company in the background and attach the summary to
    /// the session if it is still active when research finishes.
    async fn spawn_priming(&self, session_id: &str, role: &str, company: &str) {
        let sessions = Arc::clone(&self.sessions);
        let researcher = Arc::clone(&self.collaborators.researcher);
        let (id, role, company) = (session_id.to_string(), role.to_string(), company.to_string());

        let work = async move {
            match researcher.brief(&role, &company).await {
                Ok(brief) => match brief.summary() {
                    Some(summary) => {
                        if sessions.attach_company_brief(&id, summary).await {
                            info!(session_id = %id, "Company brief attached");
                        } else {
                            debug!(session_id = %id, "Session ended before company brief arrived");
                        }
                    }
                    None => debug!(session_id = %id, "Company research returned no data"),
                },
                Err(e) => warn!(session_id = %id, error = %e, "Company brief priming failed"),
            }
        };

        self.sessions.start_priming(session_id, work).await;
    }

    /// Process one answer and choose the next question.
    pub async fn submit_answer(&self, request: SubmitAnswerRequest) -> SessionResult<SubmitAnswerResponse> {
        let start = Instant::now();
        let SubmitAnswerRequest {
            session_id,
            payload,
            duration_seconds,
        } = request;

        if payload.is_empty() {
            return Err(SessionError::EmptyPayload {
                what: payload.kind().to_string(),
            });
        }
        if payload.len() > self.config.max_payload_bytes {
            return Err(SessionError::PayloadTooLarge {
                size: payload.len(),
                limit: self.config.max_payload_bytes,
            });
        }

        let state = self.sessions.get_active(&session_id).await?;
        let question_number = state.question_count;

        let analysis = self.analyze(&session_id, payload).await;
        let transcript = analysis.transcript.clone();
        let sample = SignalSample::new(analysis.stress, analysis.confidence);

        let schema = entity_schema(&state.role);
        let entities = self
            .collaborators
            .extractor
            .extract(&transcript, &schema)
            .await
            .unwrap_or_else(|e| {
                warn!(session_id = %session_id, error = %e, "Entity extraction failed");
                Vec::new()
            });

        let answer = AnswerRecord {
            user_id: state.user_id.clone(),
            session_id: session_id.clone(),
            role: state.role.clone(),
            company: state.company.clone(),
            question_number,
            question: truncate_chars(&state.current_question, MAX_QUESTION_CHARS),
            transcript: truncate_chars(&transcript, MAX_TRANSCRIPT_CHARS),
            duration_seconds: if duration_seconds == 0 {
                DEFAULT_DURATION_SECONDS
            } else {
                duration_seconds
            },
            stress: Some(sample.stress),
            confidence: Some(sample.confidence),
            fact_correct: None,
        };
        self.graph.ingest_answer(&answer, &entities).await;

        let memory = &self.collaborators.memory;
        let context = memory.context(&state.user_id, FEEDBACK_QUERY).await;
        let snippets = memory.rag_snippets(&state.user_id, RAG_SNIPPETS).await;

        let fusion = fuse(sample, &state.history, state.difficulty);

        let label_counts = self.graph.entity_label_counts(&state.user_id).await;
        let input = TopicInput {
            role: &state.role,
            company: &state.company,
            level: state.level,
            difficulty: state.difficulty,
            job_description: state.job_description.as_deref(),
            questions_asked: &state.questions_asked,
            current_question: &state.current_question,
            company_brief: state.company_brief.as_deref(),
            label_counts: &label_counts,
        };
        let topic = self.with_rng(|rng| self.selector.select(&input, rng));

        let feedback_note = if context.trim().is_empty() || context.contains(STUB_PREFIX) {
            prompts::feedback_for_tone(fusion.tone).to_string()
        } else {
            truncate_chars(context.trim(), MAX_NOTE_CHARS)
        };

        let reasoning = format!(
            "{} topic={} stress={:.2} confidence={:.2} rag_snippets={}",
            fusion.describe(),
            topic.source,
            sample.stress,
            sample.confidence,
            snippets.len()
        );

        let decision = DecisionRecord {
            user_id: state.user_id.clone(),
            session_id: session_id.clone(),
            question_number,
            tone: fusion.tone,
            difficulty_delta: fusion.difficulty_delta,
            next_question: truncate_chars(&topic.question, MAX_NOTE_CHARS),
            feedback_note: truncate_chars(&feedback_note, MAX_NOTE_CHARS),
            reasoning: Some(truncate_chars(&reasoning, MAX_REASONING_CHARS)),
            stress: Some(sample.stress),
            confidence: Some(sample.confidence),
            fact_correct: None,
        };
        self.graph.ingest_decision(&decision).await;

        let next_question = topic.question.clone();
        let (question_count, signal_trend) = self
            .sessions
            .update(&session_id, |s| {
                s.question_count += 1;
                s.current_question = next_question.clone();
                s.questions_asked.push(next_question.clone());
                s.history.push(sample);
                (s.question_count, s.history.last(SIGNAL_TREND_LEN))
            })
            .await?;

        let score = self
            .scoring
            .score(sample.stress, sample.confidence, analysis.hesitation_count);

        info!(
            session_id = %session_id,
            question_number,
            tone = %fusion.tone,
            difficulty_delta = fusion.difficulty_delta,
            topic = %topic.source,
            entities = entities.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Answer processed"
        );

        Ok(SubmitAnswerResponse {
            session_id,
            next_question,
            question_number: question_count,
            tone: fusion.tone,
            difficulty_delta: fusion.difficulty_delta,
            feedback_note,
            topic_source: topic.source,
            transcript,
            extracted_entities: entities,
            stress: sample.stress,
            confidence: sample.confidence,
            hesitation_count: analysis.hesitation_count,
            metrics_source: analysis.source,
            signal_trend,
            overall_score: score.overall,
            voice_pacing_score: score.coaching.pacing_score,
            voice_coaching_tip: score.coaching.tip,
        })
    }

    async fn analyze(&self, session_id: &str, payload: AnswerPayload) -> VoiceAnalysis {
        let mut analysis = match payload {
            AnswerPayload::Transcript(text) => VoiceAnalysis::neutral(text.trim()),
            AnswerPayload::Audio(bytes) => {
                match self.collaborators.voice.analyze(&bytes).await {
                    Ok(analysis) => analysis,
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Voice analysis failed, using neutral signals");
                        VoiceAnalysis::neutral(NO_TRANSCRIPT)
                    }
                }
            }
        };
        if analysis.transcript.trim().is_empty() {
            analysis.transcript = NO_TRANSCRIPT.to_string();
        }
        analysis
    }

    /// End a session and build its report.
    ///
    /// The fact-check is bounded by the configured deadline, so this
    /// always returns.
    pub async fn end_session(&self, session_id: &str) -> SessionResult<SessionReport> {
        let state = self.sessions.end(session_id).await?;
        let mut transcripts = self.graph.session_transcripts(session_id).await;
        transcripts.retain(|t| t != NO_TRANSCRIPT);
        let fact_check = self.fact_check.run(&transcripts).await;

        let answered = state.answered();
        let company = if state.company.is_empty() {
            "the company"
        } else {
            state.company.as_str()
        };
        let strengths = if answered >= 2 {
            "Confident delivery"
        } else {
            "Clear transcript"
        };

        info!(
            session_id = %session_id,
            answered,
            verified = fact_check.verified,
            total_claims = fact_check.total,
            timed_out = fact_check.timed_out,
            "Session ended"
        );

        Ok(SessionReport {
            session_id: session_id.to_string(),
            questions_answered: answered,
            questions_asked: u32::try_from(state.questions_asked.len()).unwrap_or(u32::MAX),
            overall_trend: prompts::overall_trend(answered),
            strengths: vec![strengths.to_string()],
            focus_areas: vec!["Metric quantification".to_string()],
            suggested_next_steps: vec![
                prompts::company_culture_step(company),
                prompts::PACING_STEP.to_string(),
            ],
            fact_accuracy_pct: fact_check.accuracy_pct(),
            fact_check_summary: fact_check.summary,
            disputed_claims: fact_check.disputed_claims,
            verified_claims: fact_check.verified,
            total_claims: fact_check.total,
            timed_out: fact_check.timed_out,
            timed_out_claims: fact_check.timed_out_claims,
        })
    }

    /// Nodes and edges recorded for a known session.
    pub async fn session_graph(&self, session_id: &str) -> SessionResult<SessionGraph> {
        self.sessions.get(session_id).await?;
        Ok(self.graph.session_graph(session_id).await)
    }

    pub async fn session_status(&self, session_id: &str) -> SessionResult<SessionStatus> {
        let state = self.sessions.get(session_id).await?;
        Ok(SessionStatus {
            session_id: state.session_id,
            question_count: state.question_count,
            current_question: state.current_question,
            questions_asked: state.questions_asked,
            ended: state.ended,
            has_company_brief: state.company_brief.is_some(),
        })
    }

    /// Research a company now and optionally attach the result to a session.
    pub async fn company_brief(&self, request: CompanyBriefRequest) -> SessionResult<CompanyBriefResponse> {
        let company = request.company.trim().to_string();
        if company.is_empty() {
            return Err(SessionError::Validation {
                field: "company".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(session_id) = &request.session_id {
            self.sessions.get(session_id).await?;
        }

        let role = request.role.trim().to_string();
        let brief = self
            .collaborators
            .researcher
            .brief(&role, &company)
            .await
            .unwrap_or_else(|e| {
                warn!(company = %company, error = %e, "Company research failed");
                Default::default()
            });

        let summary = brief.summary();
        let attached = match (&request.session_id, &summary) {
            (Some(session_id), Some(summary)) => {
                self.sessions
                    .attach_company_brief(session_id, summary.clone())
                    .await
            }
            _ => false,
        };

        Ok(CompanyBriefResponse {
            role,
            company,
            brief,
            summary,
            attached,
        })
    }

    /// Recent news for the session's role and company.
    ///
    /// The learner's scout is created on first use and reused by later
    /// sessions. With no scout, or when the feed fails or is empty, canned
    /// updates are returned instead.
    pub async fn scout_updates(&self, session_id: &str) -> SessionResult<ScoutUpdatesResponse> {
        let state = self.sessions.get(session_id).await?;

        let (scout_status, updates) = match self.scout_for(&state).await {
            Some(scout_id) => {
                let updates = self
                    .collaborators
                    .scout
                    .updates(&scout_id, SCOUT_UPDATE_LIMIT)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(session_id = %session_id, scout_id = %scout_id, error = %e, "Scout updates failed");
                        Vec::new()
                    });
                (ScoutStatus::Live, updates)
            }
            None => (ScoutStatus::NoScout, Vec::new()),
        };

        let mut updates = if updates.is_empty() {
            debug!(session_id = %session_id, "Using canned scout updates");
            prompts::scout_fallback_updates(&state.role, &state.company)
        } else {
            updates
        };
        updates.truncate(SCOUT_UPDATE_LIMIT);

        Ok(ScoutUpdatesResponse {
            session_id: session_id.to_string(),
            scout_status,
            updates,
        })
    }

    async fn scout_for(&self, state: &SessionState) -> Option<String> {
        if let Some(scout_id) = self.scouts.read().await.get(&state.user_id) {
            return Some(scout_id.clone());
        }

        match self.collaborators.scout.create(&state.role, &state.company).await {
            Ok(Some(scout_id)) => {
                let mut scouts = self.scouts.write().await;
                Some(scouts.entry(state.user_id.clone()).or_insert(scout_id).clone())
            }
            Ok(None) => None,
            Err(e) => {
                warn!(user_id = %state.user_id, error = %e, "Scout creation failed");
                None
            }
        }
    }

    pub async fn user_profile(&self, user_id: &str) -> SessionResult<UserProfile> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SessionError::Validation {
                field: "user_id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let memory = &self.collaborators.memory;
        Ok(UserProfile {
            user_id: user_id.to_string(),
            summary: memory.context(user_id, PROFILE_QUERY).await,
            sample_snippets: memory.rag_snippets(user_id, RAG_SNIPPETS).await,
        })
    }
}
