use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::{MetricsSource, ServiceClient, VoiceAnalysis, VoiceAnalyzer};
use crate::error::CollaboratorResult;

const STUB_TRANSCRIPT: &str =
    "[Stub] User spoke for a short answer. Enable a voice API key for real analysis.";

const STRESS_EMOTIONS: [&str; 12] = [
    "Stressed",
    "Anxious",
    "Afraid",
    "Concerned",
    "Angry",
    "Frustrated",
    "Ashamed",
    "Sad",
    "Tired",
    "Disgusted",
    "Disappointed",
    "Confused",
];

const CONFIDENT_EMOTIONS: [&str; 10] = [
    "Confident",
    "Proud",
    "Excited",
    "Hopeful",
    "Interested",
    "Calm",
    "Happy",
    "Amused",
    "Relieved",
    "Affectionate",
];

/// Offline analyzer returning fixed, mildly positive signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubVoiceAnalyzer;

#[async_trait]
impl VoiceAnalyzer for StubVoiceAnalyzer {
    async fn analyze(&self, audio: &[u8]) -> CollaboratorResult<VoiceAnalysis> {
        debug!(bytes = audio.len(), "Stub voice analysis");
        Ok(VoiceAnalysis {
            transcript: STUB_TRANSCRIPT.to_string(),
            stress: 0.35,
            confidence: 0.65,
            hesitation_count: 2,
            source: MetricsSource::Stub,
        })
    }
}

/// Voice analyzer backed by a remote service.
pub struct HttpVoiceAnalyzer {
    client: ServiceClient,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    stress: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    hesitation_count: u32,
    /// Emotion name to score, used when stress/confidence are not returned.
    #[serde(default)]
    emotions: HashMap<String, f64>,
}

impl HttpVoiceAnalyzer {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VoiceAnalyzer for HttpVoiceAnalyzer {
    async fn analyze(&self, audio: &[u8]) -> CollaboratorResult<VoiceAnalysis> {
        let response: AnalyzeResponse = self
            .client
            .post_bytes("analyze", audio, "application/octet-stream")
            .await?;

        let (stress, confidence) = match (response.stress, response.confidence) {
            (Some(s), Some(c)) => (s, c),
            _ => scores_from_emotions(&response.emotions),
        };

        Ok(VoiceAnalysis {
            transcript: response.transcript.trim().to_string(),
            stress: stress.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            hesitation_count: response.hesitation_count,
            source: MetricsSource::Live,
        })
    }
}

/// Collapse per-emotion scores into (stress, confidence).
///
/// No emotions at all maps to a calm default of (0.35, 0.6).
pub fn scores_from_emotions(emotions: &HashMap<String, f64>) -> (f64, f64) {
    if emotions.is_empty() {
        return (0.35, 0.6);
    }

    let mass = |names: &[&str]| -> f64 {
        names
            .iter()
            .filter_map(|name| emotions.get(*name))
            .map(|score| score.max(0.0))
            .sum()
    };

    let stress = (0.2 + 0.9 * mass(&STRESS_EMOTIONS)).clamp(0.05, 0.95);
    let confidence = (0.3 + 0.9 * mass(&CONFIDENT_EMOTIONS)).clamp(0.05, 0.95);
    (stress, confidence)
}
