//! Claim extraction and end-of-session claim verification.

mod extract;
mod fanout;

pub use extract::{distinct_claims, extract_claim, extract_entities, MIN_CLAIM_CHARS};
pub use fanout::{FactCheckFanOut, FactCheckReport, DEFAULT_FACT_CHECK_TIMEOUT};
