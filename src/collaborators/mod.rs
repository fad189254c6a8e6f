//! External collaborators.
//!
//! Each capability the coach consumes is a trait with a live HTTP
//! implementation and an offline one that returns documented neutral values.
//! The orchestrator only ever sees `Arc<dyn Trait>`, so choosing between
//! them happens once, in [`Collaborators::from_config`].
//!
//! Offline text that carries no real data starts with
//! [`STUB_PREFIX`](crate::storage::STUB_PREFIX).

mod extractor;
mod http;
mod memory;
mod research;
mod scout;
mod verifier;
mod voice;

pub use extractor::{entity_schema, HttpEntityExtractor, KeywordEntityExtractor};
pub use http::{AuthScheme, ServiceClient, TaskSnapshot};
pub use research::{parse_brief, BrowsingCompanyResearcher, StubCompanyResearcher};
pub use scout::{parse_scout_updates, HttpRoleScout, StubRoleScout};
pub use verifier::{parse_verdict, ResearchClaimVerifier, StubClaimVerifier, Verdict};
pub use voice::{scores_from_emotions, HttpVoiceAnalyzer, StubVoiceAnalyzer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::error::CollaboratorResult;
use crate::prompts;
use crate::storage::{ContextGraph, EntityNode};

/// Where a voice measurement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSource {
    /// A live voice service.
    Live,
    /// The offline analyzer.
    Stub,
    /// Substituted after a failure, or no audio was given.
    Neutral,
}

/// Voice analysis of one spoken answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAnalysis {
    pub transcript: String,
    pub stress: f64,
    pub confidence: f64,
    pub hesitation_count: u32,
    pub source: MetricsSource,
}

impl VoiceAnalysis {
    /// Mid-scale signals with no hesitations.
    pub fn neutral(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            stress: 0.5,
            confidence: 0.5,
            hesitation_count: 0,
            source: MetricsSource::Neutral,
        }
    }
}

/// A claim verifier's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub claim: String,
    pub correct: bool,
    pub actual_value: Option<String>,
    pub source_url: Option<String>,
    pub summary: Option<String>,
}

impl Verification {
    /// A verdict accepting the claim with nothing else to say.
    pub fn accepted(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            correct: true,
            actual_value: None,
            source_url: None,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Researched expectations for a role at a company. Empty lists mean "no data".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyBrief {
    pub expectations: Vec<String>,
    pub hints: Vec<String>,
    pub source_urls: Vec<String>,
}

impl CompanyBrief {
    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty() && self.hints.is_empty()
    }

    /// Semicolon-delimited summary attached to a session, `None` when empty.
    pub fn summary(&self) -> Option<String> {
        let summary = prompts::company_brief_summary(&self.expectations, &self.hints);
        if summary.is_empty() {
            None
        } else {
            Some(summary)
        }
    }
}

/// One item from a role scout's feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutUpdate {
    pub title: String,
    pub url: String,
    pub summary: String,
}

/// Turns recorded audio into a transcript and voice signals.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceAnalyzer: Send + Sync {
    async fn analyze(&self, audio: &[u8]) -> CollaboratorResult<VoiceAnalysis>;
}

/// Pulls labeled spans out of an answer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Only labels named in `schema` are returned.
    async fn extract(&self, text: &str, schema: &[String]) -> CollaboratorResult<Vec<EntityNode>>;
}

/// Checks one literal claim.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    async fn verify(&self, claim: &str) -> CollaboratorResult<Verification>;
}

/// Researches what a company expects from a role.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompanyResearcher: Send + Sync {
    async fn brief(&self, role: &str, company: &str) -> CollaboratorResult<CompanyBrief>;
}

/// Standing research query that watches a role and company for news.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleScout: Send + Sync {
    /// Start a scout and return its id, or `None` when scouting is unavailable.
    async fn create(&self, role: &str, company: &str) -> CollaboratorResult<Option<String>>;

    /// Most recent updates of a scout, newest first.
    async fn updates(&self, scout_id: &str, limit: usize) -> CollaboratorResult<Vec<ScoutUpdate>>;
}

/// Per-learner memory: a profile summary and recent answer snippets.
///
/// Neither call fails. A summary with no real data behind it starts with
/// the stub prefix.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersonalizationMemory: Send + Sync {
    async fn context(&self, user_id: &str, question: &str) -> String;

    async fn rag_snippets(&self, user_id: &str, limit: usize) -> Vec<String>;
}

/// The full set of collaborators handed to the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub voice: Arc<dyn VoiceAnalyzer>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub verifier: Arc<dyn ClaimVerifier>,
    pub researcher: Arc<dyn CompanyResearcher>,
    pub scout: Arc<dyn RoleScout>,
    pub memory: Arc<dyn PersonalizationMemory>,
}

impl Collaborators {
    /// Offline implementations everywhere, memory backed by `graph`.
    pub fn offline(graph: ContextGraph) -> Self {
        Self {
            voice: Arc::new(StubVoiceAnalyzer),
            extractor: Arc::new(KeywordEntityExtractor),
            verifier: Arc::new(StubClaimVerifier),
            researcher: Arc::new(StubCompanyResearcher),
            scout: Arc::new(StubRoleScout),
            memory: Arc::new(graph),
        }
    }

    /// Live implementations for every service with an API key, offline ones otherwise.
    pub fn from_config(config: &Config, graph: ContextGraph) -> CollaboratorResult<Self> {
        let mut collaborators = Self::offline(graph);
        let request = &config.request;
        let services = &config.collaborators;
        let poll_interval = Duration::from_millis(services.poll_interval_ms);

        match &services.voice.api_key {
            Some(key) => {
                let client = ServiceClient::new(
                    "voice",
                    &services.voice.base_url,
                    key,
                    AuthScheme::Bearer,
                    request.clone(),
                )?;
                collaborators.voice = Arc::new(HttpVoiceAnalyzer::new(client));
            }
            None => info!("VOICE_API_KEY not set, using offline voice analyzer"),
        }

        match &services.extractor.api_key {
            Some(key) => {
                let client = ServiceClient::new(
                    "extractor",
                    &services.extractor.base_url,
                    key,
                    AuthScheme::Bearer,
                    request.clone(),
                )?;
                collaborators.extractor = Arc::new(HttpEntityExtractor::new(client));
            }
            None => info!("EXTRACTOR_API_KEY not set, using keyword entity extractor"),
        }

        match &services.research.api_key {
            Some(key) => {
                let client = ServiceClient::new(
                    "research",
                    &services.research.base_url,
                    key,
                    AuthScheme::ApiKeyHeader,
                    request.clone(),
                )?;
                collaborators.verifier = Arc::new(ResearchClaimVerifier::new(
                    client.clone(),
                    poll_interval,
                    services.poll_attempts,
                ));
                collaborators.researcher = Arc::new(BrowsingCompanyResearcher::new(
                    client.clone(),
                    poll_interval,
                    services.poll_attempts,
                ));
                collaborators.scout = Arc::new(HttpRoleScout::new(client));
            }
            None => info!("RESEARCH_API_KEY not set, using offline verifier, researcher and scout"),
        }

        Ok(collaborators)
    }

    pub fn with_voice(mut self, voice: Arc<dyn VoiceAnalyzer>) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ClaimVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_researcher(mut self, researcher: Arc<dyn CompanyResearcher>) -> Self {
        self.researcher = researcher;
        self
    }

    pub fn with_scout(mut self, scout: Arc<dyn RoleScout>) -> Self {
        self.scout = scout;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn PersonalizationMemory>) -> Self {
        self.memory = memory;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    #[test]
    fn test_company_brief_summary() {
        let brief = CompanyBrief {
            expectations: vec!["Own the roadmap".to_string()],
            hints: vec![],
            source_urls: vec![],
        };
        assert_eq!(
            brief.summary().as_deref(),
            Some("Company/role expectations: Own the roadmap")
        );
        assert!(CompanyBrief::default().summary().is_none());
        assert!(CompanyBrief::default().is_empty());
    }

    #[test]
    fn test_from_config_without_keys_is_offline() {
        let config = Config::default();
        let collaborators = Collaborators::from_config(&config, ContextGraph::disabled());
        assert!(collaborators.is_ok());
    }

    #[test]
    fn test_from_config_with_keys_builds_clients() {
        let mut config = Config::default();
        config.collaborators.research = ServiceConfig {
            api_key: Some("key".to_string()),
            base_url: "http://localhost:9".to_string(),
        };
        assert!(Collaborators::from_config(&config, ContextGraph::disabled()).is_ok());
    }
}
