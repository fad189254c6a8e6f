//! Per-session state and the table that owns it.
//!
//! [`SessionStore`] is injected into the orchestrator, so every test can
//! use its own isolated table. Each read or write is atomic on its own, but
//! nothing serializes two turns of the same session against each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::signals::{DifficultyPreference, SignalHistory};
use crate::topics::SeniorityLevel;

/// Everything the coach tracks for one active conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub user_id: String,
    pub role: String,
    pub company: String,
    pub difficulty: DifficultyPreference,
    pub level: SeniorityLevel,
    pub job_description: Option<String>,
    /// Number of the question currently awaiting an answer, starting at 1.
    pub question_count: u32,
    pub current_question: String,
    pub questions_asked: Vec<String>,
    /// Semicolon-delimited company brief, once researched.
    pub company_brief: Option<String>,
    pub history: SignalHistory,
    pub ended: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    /// A fresh session about to ask `first_question`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        role: impl Into<String>,
        company: impl Into<String>,
        difficulty: DifficultyPreference,
        level: SeniorityLevel,
        job_description: Option<String>,
        first_question: impl Into<String>,
        history_len: usize,
    ) -> Self {
        let first_question = first_question.into();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            role: role.into(),
            company: company.into(),
            difficulty,
            level,
            job_description,
            question_count: 1,
            current_question: first_question.clone(),
            questions_asked: vec![first_question],
            company_brief: None,
            history: SignalHistory::new(history_len),
            ended: false,
            created_at: Utc::now(),
        }
    }

    /// Number of questions answered so far.
    pub fn answered(&self) -> u32 {
        self.question_count.saturating_sub(1)
    }
}

/// Ended sessions kept for status lookups when no capacity is given.
pub const DEFAULT_ENDED_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<String, SessionState>,
    /// Ended session ids, oldest first.
    ended: VecDeque<String>,
}

#[derive(Debug, Default)]
struct PrimingTable {
    tasks: HashMap<String, (u64, AbortHandle)>,
    next_generation: u64,
}

/// Process-wide table of sessions keyed by session id.
///
/// Ended sessions stay readable until more than `ended_capacity` others
/// have ended after them. The oldest are then dropped and report
/// [`SessionError::NotFound`]; their graph records are untouched.
#[derive(Debug)]
pub struct SessionStore {
    table: RwLock<SessionTable>,
    priming: RwLock<PrimingTable>,
    ended_capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ended_capacity(DEFAULT_ENDED_CAPACITY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that keeps at most `capacity` ended sessions.
    pub fn with_ended_capacity(capacity: usize) -> Self {
        Self {
            table: RwLock::new(SessionTable::default()),
            priming: RwLock::new(PrimingTable::default()),
            ended_capacity: capacity,
        }
    }

    pub async fn insert(&self, state: SessionState) {
        let mut table = self.table.write().await;
        table.sessions.insert(state.session_id.clone(), state);
    }

    /// Snapshot of a session, ended or not.
    pub async fn get(&self, session_id: &str) -> SessionResult<SessionState> {
        self.table
            .read()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| not_found(session_id))
    }

    /// Snapshot of a session that still accepts answers.
    pub async fn get_active(&self, session_id: &str) -> SessionResult<SessionState> {
        let state = self.get(session_id).await?;
        if state.ended {
            return Err(SessionError::Ended {
                session_id: session_id.to_string(),
            });
        }
        Ok(state)
    }

    /// Apply `f` to an active session under the write lock.
    pub async fn update<F, R>(&self, session_id: &str, f: F) -> SessionResult<R>
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let mut table = self.table.write().await;
        let state = table
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;
        if state.ended {
            return Err(SessionError::Ended {
                session_id: session_id.to_string(),
            });
        }
        Ok(f(state))
    }

    /// Attach a company brief summary. Returns false when the session is
    /// gone or has ended, in which case nothing changes.
    pub async fn attach_company_brief(&self, session_id: &str, summary: String) -> bool {
        self.update(session_id, |state| state.company_brief = Some(summary))
            .await
            .is_ok()
    }

    /// Run `work` as the background priming task of a session.
    ///
    /// The abort handle is registered before the task can run, and the task
    /// removes only its own entry when it finishes. Starting a new priming
    /// task for the same session aborts the previous one.
    pub async fn start_priming<F>(self: &Arc<Self>, session_id: &str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut priming = self.priming.write().await;
        let generation = priming.next_generation;
        priming.next_generation += 1;

        let store = Arc::clone(self);
        let key = session_id.to_string();
        let task = tokio::spawn(async move {
            work.await;
            store.finish_priming(&key, generation).await;
        });

        if let Some((_, previous)) = priming
            .tasks
            .insert(session_id.to_string(), (generation, task.abort_handle()))
        {
            previous.abort();
        }
    }

    async fn finish_priming(&self, session_id: &str, generation: u64) {
        let mut priming = self.priming.write().await;
        if priming
            .tasks
            .get(session_id)
            .is_some_and(|(current, _)| *current == generation)
        {
            priming.tasks.remove(session_id);
        }
    }

    /// Number of priming tasks still running.
    pub async fn priming_len(&self) -> usize {
        self.priming.read().await.tasks.len()
    }

    /// Mark a session ended, cancel its priming task and return its final state.
    ///
    /// Ending an already ended session returns the same state again, as
    /// long as it has not been evicted.
    pub async fn end(&self, session_id: &str) -> SessionResult<SessionState> {
        let state = {
            let mut table = self.table.write().await;
            let state = table
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| not_found(session_id))?;
            let newly_ended = !state.ended;
            state.ended = true;
            let state = state.clone();

            if newly_ended {
                table.ended.push_back(session_id.to_string());
                while table.ended.len() > self.ended_capacity {
                    if let Some(oldest) = table.ended.pop_front() {
                        table.sessions.remove(&oldest);
                        debug!(session_id = %oldest, "Evicted ended session");
                    }
                }
            }
            state
        };

        if let Some((_, handle)) = self.priming.write().await.tasks.remove(session_id) {
            debug!(session_id = %session_id, "Aborting company brief priming");
            handle.abort();
        }

        Ok(state)
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.sessions.is_empty()
    }
}

fn not_found(session_id: &str) -> SessionError {
    SessionError::NotFound {
        session_id: session_id.to_string(),
    }
}
