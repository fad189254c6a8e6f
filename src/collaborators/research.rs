use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{CompanyBrief, CompanyResearcher, ServiceClient};
use crate::error::CollaboratorResult;
use crate::prompts;
use crate::text::truncate_chars;

const MAX_BROWSING_STEPS: u32 = 40;
const MAX_LINE_CHARS: usize = 200;
const MAX_ITEMS: usize = 5;

/// Offline researcher. Always returns an empty brief, meaning "no data".
#[derive(Debug, Clone, Copy, Default)]
pub struct StubCompanyResearcher;

#[async_trait]
impl CompanyResearcher for StubCompanyResearcher {
    async fn brief(&self, role: &str, company: &str) -> CollaboratorResult<CompanyBrief> {
        debug!(role = %role, company = %company, "Stub company research");
        Ok(CompanyBrief::default())
    }
}

#[derive(Debug, Serialize)]
struct BrowsingRequest {
    task: String,
    start_url: String,
    max_steps: u32,
}

/// Researcher that runs a browsing task against the company's careers pages.
pub struct BrowsingCompanyResearcher {
    client: ServiceClient,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl BrowsingCompanyResearcher {
    pub fn new(client: ServiceClient, poll_interval: Duration, poll_attempts: u32) -> Self {
        Self {
            client,
            poll_interval,
            poll_attempts,
        }
    }
}

#[async_trait]
impl CompanyResearcher for BrowsingCompanyResearcher {
    async fn brief(&self, role: &str, company: &str) -> CollaboratorResult<CompanyBrief> {
        let start_url = prompts::company_brief_start_url(company);
        let request = BrowsingRequest {
            task: prompts::company_brief_task(role, company),
            start_url: start_url.clone(),
            max_steps: MAX_BROWSING_STEPS,
        };

        let task_id = self.client.create_task("browsing/tasks", &request).await?;
        info!(task_id = %task_id, company = %company, "Browsing task created");

        let snapshot = self
            .client
            .poll_task(
                &format!("browsing/tasks/{}", task_id),
                self.poll_interval,
                self.poll_attempts,
            )
            .await?;

        let mut brief = parse_brief(snapshot.result_text().unwrap_or_default());
        brief.source_urls = vec![start_url];
        Ok(brief)
    }
}

/// Split a plain-text browsing summary into expectations and hints.
///
/// Lines mentioning an expectation or requirement are expectations, all
/// other content lines are hints. HTML tags, markdown headings and a
/// trailing "Sources" section are dropped. Each list keeps at most five
/// lines of at most 200 characters.
pub fn parse_brief(text: &str) -> CompanyBrief {
    let mut expectations = Vec::new();
    let mut hints = Vec::new();

    for raw in text.lines() {
        let stripped = strip_tags(raw.trim());
        let line = stripped.trim();
        if line.is_empty() || line.to_lowercase().starts_with("sources") || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix('-').map(str::trim).unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let line = truncate_chars(line, MAX_LINE_CHARS);
        let lower = line.to_lowercase();
        if lower.contains("expectation") || lower.contains("require") {
            expectations.push(line);
        } else {
            hints.push(line);
        }
    }

    expectations.truncate(MAX_ITEMS);
    hints.truncate(MAX_ITEMS);

    CompanyBrief {
        expectations,
        hints,
        source_urls: Vec::new(),
    }
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_brief_splits_lines() {
        let text = "## Final Summary\n\
                    - Expectation: own the product roadmap\n\
                    - <b>Requires</b> SQL fluency\n\
                    - Prepare STAR stories\n\
                    \n\
                    Sources: https://acme.example/jobs";
        let brief = parse_brief(text);
        assert_eq!(
            brief.expectations,
            vec![
                "Expectation: own the product roadmap".to_string(),
                "Requires SQL fluency".to_string()
            ]
        );
        assert_eq!(brief.hints, vec!["Prepare STAR stories".to_string()]);
        assert!(brief.source_urls.is_empty());
    }

    #[test]
    fn test_parse_brief_caps_lists() {
        let text: String = (0..8).map(|i| format!("- hint number {}\n", i)).collect();
        let brief = parse_brief(&text);
        assert_eq!(brief.hints.len(), 5);
        assert!(brief.expectations.is_empty());
    }

    #[test]
    fn test_parse_brief_empty() {
        assert!(parse_brief("").is_empty());
    }

    #[tokio::test]
    async fn test_stub_researcher_returns_empty_brief() {
        let brief = StubCompanyResearcher.brief("PM", "Acme").await.unwrap();
        assert!(brief.is_empty());
        assert!(brief.summary().is_none());
    }
}
