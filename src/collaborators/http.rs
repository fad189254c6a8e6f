use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::RequestConfig;
use crate::error::{CollaboratorError, CollaboratorResult};

/// How the API key is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `X-API-Key: <key>`
    ApiKeyHeader,
}

/// JSON client for one external service, with per-request timeout and
/// bounded exponential-backoff retries on transient failures.
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    service: &'static str,
    base_url: String,
    api_key: String,
    auth: AuthScheme,
    request_config: RequestConfig,
}

/// Server-side state of an asynchronous research or browsing task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSnapshot {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub updates: Vec<TaskUpdate>,
}

impl TaskSnapshot {
    /// The result when the service returned plain text.
    pub fn result_text(&self) -> Option<&str> {
        self.result.as_ref().and_then(|v| v.as_str())
    }

    /// First cited URL across all updates.
    pub fn first_citation(&self) -> Option<String> {
        self.updates
            .iter()
            .flat_map(|u| u.citations.iter())
            .find_map(|c| c.url.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskCreated {
    #[serde(default)]
    task_id: Option<String>,
}

impl ServiceClient {
    /// Create a client rooted at `base_url`.
    pub fn new(
        service: &'static str,
        base_url: &str,
        api_key: &str,
        auth: AuthScheme,
        request_config: RequestConfig,
    ) -> CollaboratorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(CollaboratorError::Http)?;

        Ok(Self {
            client,
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            auth,
            request_config,
        })
    }

    /// Service name used in logs and errors.
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth {
            AuthScheme::Bearer => builder.header("Authorization", format!("Bearer {}", self.api_key)),
            AuthScheme::ApiKeyHeader => builder.header("X-API-Key", &self.api_key),
        }
    }

    /// POST a JSON body and parse a JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> CollaboratorResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        self.with_retry(path, || {
            let request = self
                .authorize(self.client.post(&url))
                .header("Content-Type", "application/json")
                .json(body);
            self.execute(request)
        })
        .await
    }

    /// POST raw bytes and parse a JSON response.
    pub async fn post_bytes<T>(&self, path: &str, body: &[u8], content_type: &str) -> CollaboratorResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        self.with_retry(path, || {
            let request = self
                .authorize(self.client.post(&url))
                .header("Content-Type", content_type)
                .body(body.to_vec());
            self.execute(request)
        })
        .await
    }

    /// GET and parse a JSON response.
    pub async fn get_json<T>(&self, path: &str) -> CollaboratorResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        self.with_retry(path, || self.execute(self.authorize(self.client.get(&url))))
            .await
    }

    /// Create a task at `path` and return its id.
    pub async fn create_task<B>(&self, path: &str, body: &B) -> CollaboratorResult<String>
    where
        B: Serialize + Sync + ?Sized,
    {
        let created: TaskCreated = self.post_json(path, body).await?;
        created
            .task_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CollaboratorError::InvalidResponse {
                message: "Task creation response has no task_id".to_string(),
            })
    }

    /// Poll `path` until the task succeeds, fails, or `attempts` run out.
    ///
    /// Each attempt waits `interval` first. A status fetch that fails is
    /// logged and counted as an attempt.
    pub async fn poll_task(
        &self,
        path: &str,
        interval: Duration,
        attempts: u32,
    ) -> CollaboratorResult<TaskSnapshot> {
        let mut last_status = String::from("pending");

        for attempt in 1..=attempts {
            tokio::time::sleep(interval).await;

            match self.get_json::<TaskSnapshot>(path).await {
                Ok(snapshot) => match snapshot.status.as_str() {
                    "succeeded" => {
                        debug!(service = self.service, path = %path, attempt, "Task succeeded");
                        return Ok(snapshot);
                    }
                    "failed" => {
                        return Err(CollaboratorError::TaskIncomplete {
                            task_id: path.to_string(),
                            status: snapshot.status,
                        });
                    }
                    _ => last_status = snapshot.status,
                },
                Err(e) => {
                    warn!(service = self.service, path = %path, attempt, error = %e, "Task status poll failed");
                }
            }
        }

        Err(CollaboratorError::TaskIncomplete {
            task_id: path.to_string(),
            status: format!("still {} after {} polls", last_status, attempts),
        })
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> CollaboratorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CollaboratorResult<T>>,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    service = self.service,
                    operation = %operation,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match attempt().await {
                Ok(response) => {
                    info!(
                        service = self.service,
                        operation = %operation,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Request succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        service = self.service,
                        operation = %operation,
                        error = %e,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retry = retries,
                        "Request failed"
                    );
                    let transient = e.is_transient();
                    last_error = Some(e);
                    retries += 1;
                    if !transient {
                        break;
                    }
                }
            }
        }

        Err(CollaboratorError::Unavailable {
            service: self.service.to_string(),
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries: retries.saturating_sub(1),
        })
    }

    /// Execute a single request (internal)
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> CollaboratorResult<T> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                CollaboratorError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

impl CollaboratorError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CollaboratorError::Timeout { .. } | CollaboratorError::Http(_) => true,
            CollaboratorError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ServiceClient {
        ServiceClient::new(
            "test",
            "http://localhost:1234/v1/",
            "key",
            AuthScheme::Bearer,
            RequestConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_base_url_is_normalized() {
        let c = client();
        assert_eq!(c.base_url(), "http://localhost:1234/v1");
        assert_eq!(c.url("/extract"), "http://localhost:1234/v1/extract");
        assert_eq!(c.url("research/tasks"), "http://localhost:1234/v1/research/tasks");
    }

    #[test]
    fn test_transient_errors() {
        assert!(CollaboratorError::Timeout { timeout_ms: 1 }.is_transient());
        assert!(CollaboratorError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!CollaboratorError::Api {
            status: 401,
            message: String::new()
        }
        .is_transient());
        assert!(!CollaboratorError::InvalidResponse {
            message: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_task_snapshot_helpers() {
        let snapshot: TaskSnapshot = serde_json::from_value(serde_json::json!({
            "status": "succeeded",
            "result": "CORRECT: true",
            "updates": [{"citations": []}, {"citations": [{"url": "https://example.com"}]}]
        }))
        .unwrap();
        assert_eq!(snapshot.result_text(), Some("CORRECT: true"));
        assert_eq!(snapshot.first_citation().as_deref(), Some("https://example.com"));
    }
}
