//! Heuristic text processing: one literal claim per transcript and a
//! keyword lexicon for labeled spans. No external calls.

use std::collections::HashSet;

use crate::storage::EntityNode;
use crate::text::truncate_chars;

/// Claims shorter than this are not worth verifying.
pub const MIN_CLAIM_CHARS: usize = 10;

/// Without a sentence terminator, this many characters form the claim.
const MAX_UNTERMINATED_CLAIM_CHARS: usize = 150;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// The first sentence of `transcript`, terminator included.
///
/// Falls back to the first 150 characters when no terminator exists.
/// Empty or whitespace-only input yields `None`.
pub fn extract_claim(transcript: &str) -> Option<String> {
    let text = transcript.trim();
    if text.is_empty() {
        return None;
    }

    let claim = match text.find(SENTENCE_TERMINATORS) {
        Some(idx) => {
            let terminator = &text[idx..idx + 1];
            format!("{}{}", text[..idx].trim(), terminator)
        }
        None => truncate_chars(text, MAX_UNTERMINATED_CLAIM_CHARS),
    };

    Some(claim)
}

/// One claim per transcript, deduplicated by exact text in first-seen order.
pub fn distinct_claims<S: AsRef<str>>(transcripts: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    transcripts
        .iter()
        .filter_map(|t| extract_claim(t.as_ref()))
        .filter(|c| c.chars().count() >= MIN_CLAIM_CHARS)
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

const LEXICON: &[(&str, &[&str])] = &[
    (
        "TECHNICAL_SKILL",
        &[
            "Python", "Rust", "Java", "JavaScript", "TypeScript", "SQL", "C++", "Golang",
            "machine learning", "data analysis", "APIs", "cloud",
        ],
    ),
    (
        "SOFT_SKILL",
        &[
            "leadership", "communication", "collaboration", "mentoring", "negotiation",
            "stakeholder management", "teamwork", "conflict resolution",
        ],
    ),
    (
        "FRAMEWORK",
        &[
            "React", "Django", "FastAPI", "Flask", "Spring", "Rails", "Kubernetes", "Docker",
            "TensorFlow", "PyTorch", "Spark", "Agile", "Scrum",
        ],
    ),
    (
        "DOMAIN_KNOWLEDGE",
        &["fintech", "healthcare", "e-commerce", "payments", "logistics", "security"],
    ),
    ("TRAIT", &["curious", "ownership", "resilient", "detail-oriented", "proactive"]),
    ("PROJECT", &["migration", "launch", "redesign", "rollout", "prototype"]),
    (
        "IMPACT",
        &["increased", "reduced", "improved", "saved", "grew", "cut"],
    ),
    (
        "SYSTEM_DESIGN",
        &["architecture", "scalability", "microservices", "caching", "distributed systems"],
    ),
    ("CUSTOMER", &["customers", "users", "clients"]),
    ("EXPERIMENT", &["A/B test", "experiment", "hypothesis"]),
    ("TRADEOFF", &["tradeoff", "trade-off", "prioritized"]),
    ("ROADMAP", &["roadmap", "quarterly plan", "OKRs"]),
    ("MODEL", &["model", "classifier", "regression", "transformer"]),
    ("DATASET", &["dataset", "training data", "data pipeline"]),
    ("EVALUATION_METRIC", &["accuracy", "precision", "recall", "F1", "AUC"]),
    ("DEAL_SIZE", &["ARR", "contract value", "deal size"]),
    ("OBJECTION", &["objection", "pushback", "concern"]),
    ("COMPETITOR", &["competitor", "competition"]),
];

/// Keyword-lexicon entity extraction restricted to the labels in `schema`.
///
/// Tokens with a `%` or `$` are reported as `METRIC`. Results are unique
/// by (label, text) and ordered by label position in the lexicon.
pub fn extract_entities(text: &str, schema: &[String]) -> Vec<EntityNode> {
    let allowed: HashSet<&str> = schema.iter().map(String::as_str).collect();
    let lower = text.to_lowercase();
    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for (label, terms) in LEXICON {
        if !allowed.contains(label) {
            continue;
        }
        for term in terms.iter() {
            if contains_word(&lower, &term.to_lowercase()) {
                let entity = EntityNode::new(*label, *term);
                if seen.insert(entity.entity_id()) {
                    entities.push(entity);
                }
            }
        }
    }

    if allowed.contains("METRIC") {
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| matches!(c, ',' | '.' | ';' | ':' | '!' | '?' | '(' | ')'));
            if token.chars().any(|c| c.is_ascii_digit()) && (token.contains('%') || token.contains('$')) {
                let entity = EntityNode::new("METRIC", token);
                if seen.insert(entity.entity_id()) {
                    entities.push(entity);
                }
            }
        }
    }

    entities
}

/// `needle` occurs in `haystack` with no alphanumeric character on either side.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut offset = 0;
    while let Some(pos) = haystack[offset..].find(needle) {
        let start = offset + pos;
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        let bounded = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
        if bounded(before) && bounded(after) {
            return true;
        }
        offset = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}
