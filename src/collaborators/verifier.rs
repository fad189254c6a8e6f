use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{ClaimVerifier, ServiceClient, Verification};
use crate::claims::MIN_CLAIM_CHARS;
use crate::error::CollaboratorResult;
use crate::prompts;
use crate::text::truncate_chars;

const STUB_SUMMARY: &str = "[Stub] Enable a research API key for real fact-checking.";
const MAX_ACTUAL_VALUE_CHARS: usize = 200;
const MAX_SUMMARY_CHARS: usize = 280;

/// Offline verifier: accepts every claim with a stub summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubClaimVerifier;

impl StubClaimVerifier {
    fn verdict(claim: &str) -> Verification {
        let claim = if claim.trim().is_empty() {
            "(no claim extracted)"
        } else {
            claim
        };
        Verification::accepted(claim).with_summary(STUB_SUMMARY)
    }
}

#[async_trait]
impl ClaimVerifier for StubClaimVerifier {
    async fn verify(&self, claim: &str) -> CollaboratorResult<Verification> {
        Ok(Self::verdict(claim))
    }
}

/// Parsed `CORRECT/ACTUAL_VALUE/SOURCE/SUMMARY` block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Verdict {
    pub correct: bool,
    pub actual_value: Option<String>,
    pub source_url: Option<String>,
    pub summary: Option<String>,
}

/// Parse the four-line verdict a research task was asked to return.
///
/// Keys are case-insensitive and may appear in any order. A missing or
/// unrecognized `CORRECT` line counts as correct.
pub fn parse_verdict(text: &str) -> Verdict {
    let grab = |key: &str| -> Option<String> {
        text.lines().find_map(|line| {
            let (k, v) = line.trim().split_once(':')?;
            if k.trim().eq_ignore_ascii_case(key) {
                Some(v.trim().to_string()).filter(|v| !v.is_empty())
            } else {
                None
            }
        })
    };

    let correct = match grab("CORRECT").map(|v| v.to_lowercase()) {
        Some(v) if v.starts_with('f') => false,
        Some(v) if v.starts_with('t') => true,
        Some(v) => !(v.contains("incorrect") || v.contains("false")),
        None => true,
    };

    let actual_value = grab("ACTUAL_VALUE")
        .filter(|v| !matches!(v.to_lowercase().as_str(), "unknown" | "n/a" | "none"))
        .map(|v| truncate_chars(&v, MAX_ACTUAL_VALUE_CHARS));

    Verdict {
        correct,
        actual_value,
        source_url: grab("SOURCE").filter(|v| v.starts_with("http")),
        summary: grab("SUMMARY").map(|v| truncate_chars(&v, MAX_SUMMARY_CHARS)),
    }
}

#[derive(Debug, Serialize)]
struct ResearchRequest {
    query: String,
}

/// Verifier that runs an asynchronous research task per claim.
///
/// Errors propagate so the fan-out can report them as disputed.
pub struct ResearchClaimVerifier {
    client: ServiceClient,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl ResearchClaimVerifier {
    pub fn new(client: ServiceClient, poll_interval: Duration, poll_attempts: u32) -> Self {
        Self {
            client,
            poll_interval,
            poll_attempts,
        }
    }
}

#[async_trait]
impl ClaimVerifier for ResearchClaimVerifier {
    async fn verify(&self, claim: &str) -> CollaboratorResult<Verification> {
        if claim.trim().chars().count() < MIN_CLAIM_CHARS {
            debug!("Claim too short for research, returning stub verdict");
            return Ok(StubClaimVerifier::verdict(claim));
        }

        let request = ResearchRequest {
            query: prompts::fact_check_query(claim),
        };
        let task_id = self.client.create_task("research/tasks", &request).await?;
        info!(task_id = %task_id, "Research task created");

        let snapshot = self
            .client
            .poll_task(
                &format!("research/tasks/{}", task_id),
                self.poll_interval,
                self.poll_attempts,
            )
            .await?;

        let result = snapshot.result_text().unwrap_or_default();
        let verdict = parse_verdict(result);
        let summary = verdict.summary.or_else(|| {
            Some(truncate_chars(result, MAX_SUMMARY_CHARS)).filter(|s| !s.is_empty())
        });

        Ok(Verification {
            claim: claim.to_string(),
            correct: verdict.correct,
            actual_value: verdict.actual_value,
            source_url: verdict.source_url.or_else(|| snapshot.first_citation()),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_block() {
        let verdict = parse_verdict(
            "CORRECT: false\nACTUAL_VALUE: 12 engineers\nSOURCE: https://acme.example/team\nSUMMARY: The team had 12 people.",
        );
        assert_eq!(
            verdict,
            Verdict {
                correct: false,
                actual_value: Some("12 engineers".to_string()),
                source_url: Some("https://acme.example/team".to_string()),
                summary: Some("The team had 12 people.".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_is_lenient() {
        let verdict = parse_verdict("correct: Incorrect claim\nactual_value: unknown\nSOURCE: none");
        assert!(!verdict.correct);
        assert_eq!(verdict.actual_value, None);
        assert_eq!(verdict.source_url, None);

        let verdict = parse_verdict("");
        assert!(verdict.correct);
        assert_eq!(verdict.summary, None);

        assert!(parse_verdict("CORRECT: True, mostly").correct);
    }

    #[tokio::test]
    async fn test_stub_verifier_accepts() {
        let v = StubClaimVerifier.verify("We grew revenue 40%.").await.unwrap();
        assert!(v.correct);
        assert!(v.summary.unwrap().starts_with("[Stub]"));

        let v = StubClaimVerifier.verify("").await.unwrap();
        assert_eq!(v.claim, "(no claim extracted)");
    }
}
