use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub collaborators: CollaboratorConfig,
    pub session: SessionConfig,
}

/// Context graph database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    /// When false the graph store runs in stub mode (no-op writes, empty reads)
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration shared by live collaborators
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Credentials and endpoints for one external service.
///
/// A missing API key selects the stub implementation.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

/// External collaborator configuration
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub voice: ServiceConfig,
    pub extractor: ServiceConfig,
    pub research: ServiceConfig,
    /// Delay between research task status polls
    pub poll_interval_ms: u64,
    /// Maximum number of status polls per research task
    pub poll_attempts: u32,
}

/// Per-session behavior
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Rolling (stress, confidence) history length
    pub history_len: usize,
    /// Deadline for the whole end-of-session fact-check batch
    pub fact_check_timeout_ms: u64,
    /// Largest accepted answer payload in bytes
    pub max_payload_bytes: usize,
    /// Chance of using the job-description opener when a long JD is supplied
    pub jd_opener_probability: f64,
    /// Ended sessions kept in memory before the oldest is evicted
    pub ended_session_retention: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/interview.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS")?.unwrap_or(5),
            enabled: parse_bool_var("GRAPH_STORE_ENABLED")?.unwrap_or(true),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS")?.unwrap_or(defaults.timeout_ms),
            max_retries: parse_var("MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay_ms: parse_var("RETRY_DELAY_MS")?.unwrap_or(defaults.retry_delay_ms),
        };

        let collaborators = CollaboratorConfig {
            voice: service_from_env("VOICE", "https://api.voice.example.com/v1"),
            extractor: service_from_env("EXTRACTOR", "https://api.extractor.example.com/v1"),
            research: service_from_env("RESEARCH", "https://api.research.example.com/v1"),
            poll_interval_ms: parse_var("RESEARCH_POLL_INTERVAL_MS")?.unwrap_or(2000),
            poll_attempts: parse_var("RESEARCH_POLL_ATTEMPTS")?.unwrap_or(30),
        };

        let session_defaults = SessionConfig::default();
        let session = SessionConfig {
            history_len: parse_var("SIGNAL_HISTORY_LEN")?.unwrap_or(session_defaults.history_len),
            fact_check_timeout_ms: parse_var("FACT_CHECK_TIMEOUT_MS")?
                .unwrap_or(session_defaults.fact_check_timeout_ms),
            max_payload_bytes: parse_var("MAX_PAYLOAD_BYTES")?
                .unwrap_or(session_defaults.max_payload_bytes),
            jd_opener_probability: parse_probability_var("JD_OPENER_PROBABILITY")?
                .unwrap_or(session_defaults.jd_opener_probability),
            ended_session_retention: parse_var("ENDED_SESSION_RETENTION")?
                .unwrap_or(session_defaults.ended_session_retention),
        };

        if session.history_len == 0 {
            return Err(AppError::Config {
                message: "SIGNAL_HISTORY_LEN must be at least 1".to_string(),
            });
        }

        Ok(Config {
            database,
            logging,
            request,
            collaborators,
            session,
        })
    }
}

/// Read an optional, trimmed, non-empty variable
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, AppError> {
    match non_empty_var(name) {
        Some(raw) => raw.parse().map(Some).map_err(|_| AppError::Config {
            message: format!("{} has an invalid value: {}", name, raw),
        }),
        None => Ok(None),
    }
}

/// Parse a probability, clamped to `[0, 1]`. NaN and infinities are rejected.
fn parse_probability_var(name: &str) -> Result<Option<f64>, AppError> {
    match parse_var::<f64>(name)? {
        Some(p) if !p.is_finite() => Err(AppError::Config {
            message: format!("{} must be a finite number, got {}", name, p),
        }),
        other => Ok(other.map(|p| p.clamp(0.0, 1.0))),
    }
}

fn parse_bool_var(name: &str) -> Result<Option<bool>, AppError> {
    match non_empty_var(name).map(|v| v.to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(AppError::Config {
            message: format!("{} has an invalid value: {}", name, v),
        }),
        None => Ok(None),
    }
}

fn service_from_env(prefix: &str, default_base_url: &str) -> ServiceConfig {
    ServiceConfig {
        api_key: non_empty_var(&format!("{}_API_KEY", prefix)),
        base_url: non_empty_var(&format!("{}_BASE_URL", prefix))
            .unwrap_or_else(|| default_base_url.to_string()),
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_len: 10,
            fact_check_timeout_ms: 20_000,
            max_payload_bytes: 8 * 1024 * 1024,
            jd_opener_probability: 0.5,
            ended_session_retention: 256,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/interview.db"),
            max_connections: 5,
            enabled: true,
        }
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            voice: ServiceConfig::default(),
            extractor: ServiceConfig::default(),
            research: ServiceConfig::default(),
            poll_interval_ms: 2000,
            poll_attempts: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            collaborators: CollaboratorConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.history_len, 10);
        assert_eq!(session.fact_check_timeout_ms, 20_000);
        assert_eq!(session.max_payload_bytes, 8 * 1024 * 1024);
        assert_eq!(session.ended_session_retention, 256);
    }

    #[test]
    fn test_default_config_has_no_credentials() {
        let config = Config::default();
        assert!(config.collaborators.voice.api_key.is_none());
        assert!(config.collaborators.extractor.api_key.is_none());
        assert!(config.collaborators.research.api_key.is_none());
        assert!(config.database.enabled);
    }
}
