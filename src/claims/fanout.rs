use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::distinct_claims;
use crate::collaborators::{ClaimVerifier, Verification};
use crate::error::CollaboratorResult;
use crate::prompts;
use crate::storage::STUB_PREFIX;
use crate::text::{preview, truncate_chars};

/// Deadline for a whole batch of verifications.
pub const DEFAULT_FACT_CHECK_TIMEOUT: Duration = Duration::from_secs(20);

const ERROR_PREVIEW_CHARS: usize = 80;
const MAX_DISPUTED_CHARS: usize = 200;

/// Outcome of verifying a session's claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactCheckReport {
    /// `None` only when the session had no transcripts at all.
    pub summary: Option<String>,
    pub verified: usize,
    pub total: usize,
    /// Explanations for claims that failed verification or could not be checked.
    pub disputed_claims: Vec<String>,
    /// Claims still unsettled when the deadline passed.
    pub timed_out_claims: Vec<String>,
    pub timed_out: bool,
}

impl FactCheckReport {
    /// Share of claims verified, `None` without claims.
    pub fn accuracy_pct(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.verified as f64 / self.total as f64 * 100.0)
        }
    }
}

/// Verifies every distinct claim of a session concurrently under one deadline.
#[derive(Clone)]
pub struct FactCheckFanOut {
    verifier: Arc<dyn ClaimVerifier>,
    timeout: Duration,
}

impl FactCheckFanOut {
    pub fn new(verifier: Arc<dyn ClaimVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    /// Extract, dedupe and verify claims from `transcripts`.
    ///
    /// Results that settle before the deadline are always kept. Claims
    /// still in flight at the deadline are abandoned and listed in
    /// `timed_out_claims`.
    pub async fn run(&self, transcripts: &[String]) -> FactCheckReport {
        let claims = distinct_claims(transcripts);
        if claims.is_empty() {
            let summary = if transcripts.is_empty() {
                None
            } else {
                Some(prompts::NO_CLAIMS_SUMMARY.to_string())
            };
            return FactCheckReport {
                summary,
                ..FactCheckReport::default()
            };
        }

        let deadline = Instant::now() + self.timeout;
        info!(claims = claims.len(), timeout_ms = self.timeout.as_millis(), "Starting fact-check fan-out");

        let mut pending: FuturesUnordered<_> = claims
            .iter()
            .enumerate()
            .map(|(index, claim)| {
                let verifier = Arc::clone(&self.verifier);
                async move { (index, verifier.verify(claim).await) }
            })
            .collect();

        let mut settled: Vec<Option<CollaboratorResult<Verification>>> =
            claims.iter().map(|_| None).collect();
        let mut timed_out = false;

        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some((index, result))) => settled[index] = Some(result),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
        drop(pending);

        let mut report = FactCheckReport {
            total: claims.len(),
            timed_out,
            ..FactCheckReport::default()
        };

        for (claim, result) in claims.iter().zip(settled) {
            match result {
                None => report.timed_out_claims.push(claim.clone()),
                Some(Err(e)) => {
                    warn!(error = %e, "Claim verification failed");
                    report.disputed_claims.push(preview(claim, ERROR_PREVIEW_CHARS));
                }
                Some(Ok(v)) if v.correct => report.verified += 1,
                Some(Ok(v)) => {
                    if let Some(line) = dispute_line(claim, &v) {
                        report.disputed_claims.push(line);
                    }
                }
            }
        }

        report.summary = Some(if timed_out {
            warn!(
                settled = report.total - report.timed_out_claims.len(),
                total = report.total,
                "Fact-check deadline reached"
            );
            format!(
                "{} {}",
                prompts::TIMED_OUT_SUMMARY,
                prompts::fact_check_summary(report.verified, report.total, !report.disputed_claims.is_empty())
            )
        } else {
            prompts::fact_check_summary(report.verified, report.total, !report.disputed_claims.is_empty())
        });

        debug!(verified = report.verified, total = report.total, "Fact-check fan-out finished");
        report
    }
}

/// The explanation shown for a disputed claim; stub text is never shown.
fn dispute_line(claim: &str, verification: &Verification) -> Option<String> {
    let line = verification
        .summary
        .clone()
        .or_else(|| verification.actual_value.clone())
        .unwrap_or_else(|| truncate_chars(claim, ERROR_PREVIEW_CHARS));
    if line.is_empty() || line.contains(STUB_PREFIX) {
        None
    } else {
        Some(truncate_chars(&line, MAX_DISPUTED_CHARS))
    }
}
