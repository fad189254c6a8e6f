use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EntityExtractor, ServiceClient};
use crate::claims::extract_entities;
use crate::error::CollaboratorResult;
use crate::storage::EntityNode;

const BASE_SCHEMA: [&str; 8] = [
    "TECHNICAL_SKILL",
    "SOFT_SKILL",
    "FRAMEWORK",
    "DOMAIN_KNOWLEDGE",
    "TRAIT",
    "METRIC",
    "PROJECT",
    "IMPACT",
];

const PRODUCT_LABELS: [&str; 4] = ["CUSTOMER", "EXPERIMENT", "TRADEOFF", "ROADMAP"];
const DATA_LABELS: [&str; 3] = ["MODEL", "DATASET", "EVALUATION_METRIC"];
const SALES_LABELS: [&str; 4] = ["CUSTOMER", "DEAL_SIZE", "OBJECTION", "COMPETITOR"];

/// Minimum extractor score for a span to be returned.
const EXTRACTION_THRESHOLD: f64 = 0.4;

/// Label schema for answers given for `role`.
///
/// Product roles are checked first, then data/ML, then sales. Short
/// abbreviations ("pm", "ml") only match as whole words.
pub fn entity_schema(role: &str) -> Vec<String> {
    let role = role.to_lowercase();
    let words: Vec<&str> = role
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |w: &str| words.contains(&w);

    let extra: &[&str] = if role.contains("product") || has_word("pm") {
        &PRODUCT_LABELS
    } else if role.contains("data")
        || has_word("ml")
        || role.contains("machine learning")
        || role.contains("scientist")
    {
        &DATA_LABELS
    } else if role.contains("sales")
        || role.contains("account")
        || role.contains("business development")
    {
        &SALES_LABELS
    } else {
        &[]
    };

    BASE_SCHEMA
        .iter()
        .chain(extra.iter())
        .map(|s| s.to_string())
        .collect()
}

/// Offline extractor backed by a keyword lexicon.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordEntityExtractor;

#[async_trait]
impl EntityExtractor for KeywordEntityExtractor {
    async fn extract(&self, text: &str, schema: &[String]) -> CollaboratorResult<Vec<EntityNode>> {
        let entities = extract_entities(text, schema);
        debug!(count = entities.len(), "Keyword entity extraction");
        Ok(entities)
    }
}

/// Zero-shot span extractor behind an HTTP API.
pub struct HttpEntityExtractor {
    client: ServiceClient,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    schema: &'a [String],
    threshold: f64,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    entities: Vec<ExtractedSpan>,
}

#[derive(Debug, Deserialize)]
struct ExtractedSpan {
    #[serde(default)]
    text: String,
    #[serde(default)]
    label: String,
}

impl HttpEntityExtractor {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EntityExtractor for HttpEntityExtractor {
    async fn extract(&self, text: &str, schema: &[String]) -> CollaboratorResult<Vec<EntityNode>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let request = ExtractRequest {
            text,
            schema,
            threshold: EXTRACTION_THRESHOLD,
        };
        let response: ExtractResponse = self.client.post_json("extract", &request).await?;

        Ok(response
            .entities
            .into_iter()
            .map(|span| EntityNode::new(span.label.trim(), span.text.trim()))
            .filter(|e| e.is_valid() && schema.iter().any(|label| *label == e.label))
            .collect())
    }
}
