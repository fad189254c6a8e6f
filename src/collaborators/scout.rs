use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{RoleScout, ScoutUpdate, ServiceClient};
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::prompts;
use crate::text::truncate_chars;

const MAX_TITLE_CHARS: usize = 120;
const MAX_SUMMARY_CHARS: usize = 200;

/// Offline scout. Never creates a scout, so callers fall back to canned updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubRoleScout;

#[async_trait]
impl RoleScout for StubRoleScout {
    async fn create(&self, role: &str, company: &str) -> CollaboratorResult<Option<String>> {
        debug!(role = %role, company = %company, "Stub scout, nothing to create");
        Ok(None)
    }

    async fn updates(&self, _scout_id: &str, _limit: usize) -> CollaboratorResult<Vec<ScoutUpdate>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Serialize)]
struct ScoutRequest {
    query: String,
}

#[derive(Debug, Deserialize)]
struct ScoutCreated {
    #[serde(default)]
    scout_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// Scout backed by the research service's standing-query API.
pub struct HttpRoleScout {
    client: ServiceClient,
}

impl HttpRoleScout {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleScout for HttpRoleScout {
    async fn create(&self, role: &str, company: &str) -> CollaboratorResult<Option<String>> {
        let request = ScoutRequest {
            query: prompts::scout_query(role, company),
        };
        let created: ScoutCreated = self.client.post_json("scouts", &request).await?;
        let scout_id = created
            .scout_id
            .or(created.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CollaboratorError::InvalidResponse {
                message: "Scout creation response has no scout_id or id".to_string(),
            })?;

        info!(scout_id = %scout_id, role = %role, company = %company, "Scout created");
        Ok(Some(scout_id))
    }

    async fn updates(&self, scout_id: &str, limit: usize) -> CollaboratorResult<Vec<ScoutUpdate>> {
        let body: Value = self
            .client
            .get_json(&format!("scouts/{}/updates", scout_id))
            .await?;
        Ok(parse_scout_updates(&body, limit))
    }
}

/// Read at most `limit` updates from either `{"updates": [...]}` or a bare list.
///
/// Titles fall back to the summary and then to "Update", URLs to
/// `source_url`, summaries to `content`. Non-object entries are skipped.
pub fn parse_scout_updates(body: &Value, limit: usize) -> Vec<ScoutUpdate> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("updates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .take(limit)
        .map(|item| {
            let field = |primary: &str, fallback: &str| {
                item.get(primary)
                    .or_else(|| item.get(fallback))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            };

            let title = truncate_chars(&field("title", "summary"), MAX_TITLE_CHARS);
            ScoutUpdate {
                title: if title.is_empty() { "Update".to_string() } else { title },
                url: field("url", "source_url"),
                summary: truncate_chars(&field("summary", "content"), MAX_SUMMARY_CHARS),
            }
        })
        .collect()
}
