//! Next-question topic selection.
//!
//! A strict priority chain, first applicable branch wins:
//!
//! 1. an unused requirement phrase from the job description
//! 2. a clause from the researched company brief
//! 3. the least-covered core competency, when it has at most one mention
//! 4. a generic follow-up built from the previous question or the role
//!
//! The chain always yields a question.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::prompts;
use crate::signals::DifficultyPreference;
use crate::text::{preview, truncate_chars};

/// Labels checked by the coverage branch, in tie-break order.
pub const CORE_COMPETENCY_LABELS: [&str; 5] = [
    "TECHNICAL_SKILL",
    "SOFT_SKILL",
    "FRAMEWORK",
    "IMPACT",
    "SYSTEM_DESIGN",
];

/// Words that mark a job-description line as a requirement.
const REQUIREMENT_KEYWORDS: [&str; 17] = [
    "experience",
    "ability",
    "lead",
    "manage",
    "design",
    "communication",
    "team",
    "required",
    "preferred",
    "responsibility",
    "skill",
    "cross-functional",
    "stakeholder",
    "impact",
    "deliver",
    "ownership",
    "collaborat",
];

/// Job descriptions at or below this many characters are ignored.
pub const MIN_JOB_DESCRIPTION_CHARS: usize = 60;
const MIN_PARSEABLE_CHARS: usize = 20;
const MAX_PHRASES: usize = 8;
const MAX_FALLBACK_PHRASES: usize = 5;
const DEDUPE_PREFIX_CHARS: usize = 50;
const USED_PREFIX_CHARS: usize = 35;
const PHRASE_IN_QUESTION_CHARS: usize = 80;
const MAX_COVERED_COUNT: u32 = 1;

/// Candidate's seniority, used to word job-description questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeniorityLevel {
    Junior,
    #[default]
    Mid,
    Senior,
    Staff,
    Principal,
}

impl SeniorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeniorityLevel::Junior => "junior",
            SeniorityLevel::Mid => "mid",
            SeniorityLevel::Senior => "senior",
            SeniorityLevel::Staff => "staff",
            SeniorityLevel::Principal => "principal",
        }
    }

    /// Lenient parse; "entry" means junior and anything unknown is mid.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "junior" | "entry" => SeniorityLevel::Junior,
            "senior" => SeniorityLevel::Senior,
            "staff" => SeniorityLevel::Staff,
            "principal" => SeniorityLevel::Principal,
            _ => SeniorityLevel::Mid,
        }
    }

    fn is_senior(&self) -> bool {
        matches!(
            self,
            SeniorityLevel::Senior | SeniorityLevel::Staff | SeniorityLevel::Principal
        )
    }
}

impl std::fmt::Display for SeniorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which branch of the chain produced a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicSource {
    JobDescription,
    CompanyBrief,
    EntityCoverage,
    Fallback,
}

impl TopicSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicSource::JobDescription => "job_description",
            TopicSource::CompanyBrief => "company_brief",
            TopicSource::EntityCoverage => "entity_coverage",
            TopicSource::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for TopicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the selector looks at for one turn.
#[derive(Debug, Clone)]
pub struct TopicInput<'a> {
    pub role: &'a str,
    pub company: &'a str,
    pub level: SeniorityLevel,
    pub difficulty: DifficultyPreference,
    pub job_description: Option<&'a str>,
    /// Every question asked so far in the session, including the current one.
    pub questions_asked: &'a [String],
    /// The question that was just answered.
    pub current_question: &'a str,
    pub company_brief: Option<&'a str>,
    /// Entity mentions per label across the user's history.
    pub label_counts: &'a HashMap<String, u32>,
}

/// The selected question and the branch it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicChoice {
    pub question: String,
    pub source: TopicSource,
}

impl TopicChoice {
    fn new(question: String, source: TopicSource) -> Self {
        Self { question, source }
    }
}

/// Stateless topic selector. Randomness (the company-brief clause) comes
/// from the caller's generator so tests can seed it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicSelector;

impl TopicSelector {
    pub fn new() -> Self {
        Self
    }

    /// Run the chain. Never fails.
    pub fn select<R: Rng + ?Sized>(&self, input: &TopicInput<'_>, rng: &mut R) -> TopicChoice {
        if let Some(question) = self.from_job_description(input) {
            return TopicChoice::new(question, TopicSource::JobDescription);
        }
        if let Some(question) = input.company_brief.and_then(|brief| from_company_brief(brief, rng))
        {
            return TopicChoice::new(question, TopicSource::CompanyBrief);
        }
        if let Some(question) = from_entity_coverage(input.label_counts) {
            return TopicChoice::new(question, TopicSource::EntityCoverage);
        }
        TopicChoice::new(fallback_question(input), TopicSource::Fallback)
    }

    fn from_job_description(&self, input: &TopicInput<'_>) -> Option<String> {
        let jd = input.job_description?.trim();
        if jd.chars().count() <= MIN_JOB_DESCRIPTION_CHARS {
            return None;
        }
        let phrases = requirement_phrases(jd);
        let asked: Vec<String> = input.questions_asked.iter().map(|q| q.to_lowercase()).collect();

        let topic = phrases.iter().find(|phrase| {
            let sig = truncate_chars(phrase, USED_PREFIX_CHARS).to_lowercase();
            let sig = sig.trim();
            !sig.is_empty() && !asked.iter().any(|q| q.contains(sig))
        })?;

        let phrase = preview(topic.trim(), PHRASE_IN_QUESTION_CHARS);
        let question = if input.level.is_senior() {
            prompts::jd_question_senior(&phrase)
        } else if input.level == SeniorityLevel::Junior {
            prompts::jd_question_junior(&phrase)
        } else {
            prompts::jd_question_default(&phrase)
        };

        Some(match input.difficulty {
            DifficultyPreference::Easy => format!("{}{}", prompts::EASY_PREFIX, question),
            DifficultyPreference::Hard => format!("{}{}", prompts::HARD_PREFIX, question),
            DifficultyPreference::Medium => question,
        })
    }
}

/// Extract up to eight requirement-like phrases from a job description.
///
/// Lines and sentences of 10 to 150 characters that contain a requirement
/// keyword are kept, deduplicated by their lowercased first 50 characters.
/// When nothing matches, up to five of the first sentences (15 to 120
/// characters) are used instead.
pub fn requirement_phrases(job_description: &str) -> Vec<String> {
    let jd = job_description.trim();
    if jd.chars().count() < MIN_PARSEABLE_CHARS {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for segment in split_segments(jd, true) {
        let line = strip_bullet(segment);
        let len = line.chars().count();
        if !(10..=150).contains(&len) {
            continue;
        }
        let lower = line.to_lowercase();
        if !REQUIREMENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            continue;
        }
        if seen.insert(truncate_chars(&lower, DEDUPE_PREFIX_CHARS)) {
            out.push(line.to_string());
            if out.len() >= MAX_PHRASES {
                break;
            }
        }
    }

    if out.is_empty() {
        for part in split_segments(jd, false).into_iter().take(MAX_FALLBACK_PHRASES) {
            let part = part.trim();
            let len = part.chars().count();
            if (15..=120).contains(&len)
                && seen.insert(truncate_chars(&part.to_lowercase(), DEDUPE_PREFIX_CHARS))
            {
                out.push(part.to_string());
            }
        }
    }

    out
}

/// Split on line breaks and on ". " sentence boundaries. With
/// `require_capital`, a sentence boundary also needs an ASCII capital next.
fn split_segments(text: &str, require_capital: bool) -> Vec<&str> {
    let mut out = Vec::new();
    for line in text.split(['\n', '\r']) {
        let chars: Vec<(usize, char)> = line.char_indices().collect();
        let mut start = 0;
        let mut i = 0;
        while i < chars.len() {
            let (idx, c) = chars[i];
            if c == '.' {
                let mut j = i + 1;
                while j < chars.len() && chars[j].1.is_whitespace() {
                    j += 1;
                }
                let has_space = j > i + 1;
                let capital_next = chars.get(j).is_some_and(|(_, n)| n.is_ascii_uppercase());
                if has_space && (capital_next || !require_capital) {
                    out.push(&line[start..idx]);
                    start = chars.get(j).map_or(line.len(), |(n, _)| *n);
                    i = j;
                    continue;
                }
            }
            i += 1;
        }
        out.push(&line[start..]);
    }
    out
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c.is_whitespace() || c.is_ascii_digit() || matches!(c, '-' | '*' | '•' | '.' | ')')
    })
    .trim()
}

fn from_company_brief<R: Rng + ?Sized>(brief: &str, rng: &mut R) -> Option<String> {
    let targets: Vec<&str> = brief
        .split(';')
        .filter_map(|clause| clause.rsplit(':').next())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    targets.choose(rng).map(|target| prompts::company_brief_question(target))
}

fn from_entity_coverage(label_counts: &HashMap<String, u32>) -> Option<String> {
    if label_counts.is_empty() {
        return None;
    }
    // min_by_key keeps the first minimum, so ties follow the label order.
    let (label, count) = CORE_COMPETENCY_LABELS
        .iter()
        .map(|label| (*label, label_counts.get(*label).copied().unwrap_or(0)))
        .min_by_key(|(_, count)| *count)?;

    if count > MAX_COVERED_COUNT {
        return None;
    }
    Some(prompts::coverage_question(&human_label(label)))
}

/// `SYSTEM_DESIGN` -> `system design`.
pub fn human_label(label: &str) -> String {
    label.replace('_', " ").to_lowercase()
}

fn fallback_question(input: &TopicInput<'_>) -> String {
    let role = non_empty_or(input.role, "this role");
    let company = non_empty_or(input.company, "this company");
    let prev = input.current_question.trim();

    if prev.chars().count() > 10 {
        let topic = match prev.split_once('.') {
            Some((first, _)) => first.trim().to_string(),
            None => truncate_chars(prev, 60).trim().to_string(),
        };
        let topic = topic.strip_suffix('?').map(str::trim).unwrap_or(&topic);
        if topic.chars().count() > 8 {
            prompts::follow_up_question(topic)
        } else {
            prompts::role_example_question(role, company)
        }
    } else {
        prompts::role_challenge_question(role, company)
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() {
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const JD: &str = "We are hiring for our Berlin office.\n\
        - Five years of experience shipping consumer products\n\
        - Strong communication with engineering and design partners\n\
        - Ability to lead cross-functional launches";

    fn input<'a>(
        questions: &'a [String],
        counts: &'a HashMap<String, u32>,
        jd: Option<&'a str>,
        brief: Option<&'a str>,
    ) -> TopicInput<'a> {
        TopicInput {
            role: "PM",
            company: "Acme",
            level: SeniorityLevel::Mid,
            difficulty: DifficultyPreference::Medium,
            job_description: jd,
            questions_asked: questions,
            current_question: questions.last().map(String::as_str).unwrap_or(""),
            company_brief: brief,
            label_counts: counts,
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_requirement_phrases_keep_keyword_lines() {
        let phrases = requirement_phrases(JD);
        assert_eq!(
            phrases,
            vec![
                "Five years of experience shipping consumer products".to_string(),
                "Strong communication with engineering and design partners".to_string(),
                "Ability to lead cross-functional launches".to_string(),
            ]
        );
    }

    #[test]
    fn test_requirement_phrases_split_sentences() {
        let jd = "You will own the roadmap. Experience with SQL is required. We like dogs and cats a lot";
        let phrases = requirement_phrases(jd);
        assert_eq!(phrases, vec!["Experience with SQL is required".to_string()]);
    }

    #[test]
    fn test_requirement_phrases_fallback_sentences() {
        let jd = "Join our growing company in Berlin. We build tools for bakeries everywhere";
        let phrases = requirement_phrases(jd);
        assert_eq!(
            phrases,
            vec![
                "Join our growing company in Berlin".to_string(),
                "We build tools for bakeries everywhere".to_string(),
            ]
        );
    }

    #[test]
    fn test_requirement_phrases_capped_and_deduped() {
        let mut jd = String::new();
        for i in 0..12 {
            jd.push_str(&format!("- Experience with system number {}\n", i));
        }
        jd.push_str("- Experience with system number 0\n");
        assert_eq!(requirement_phrases(&jd).len(), 8);
    }

    #[test]
    fn test_job_description_wins_over_other_branches() {
        let questions = vec!["Walk me through your background.".to_string()];
        let counts = HashMap::from([("TECHNICAL_SKILL".to_string(), 0)]);
        let choice = TopicSelector::new().select(
            &input(&questions, &counts, Some(JD), Some("Expectations: ownership")),
            &mut rng(),
        );
        assert_eq!(choice.source, TopicSource::JobDescription);
        assert!(choice
            .question
            .contains("Five years of experience shipping consumer products"));
    }

    #[test]
    fn test_used_phrases_are_skipped() {
        let selector = TopicSelector::new();
        let counts = HashMap::new();
        let mut questions = vec!["Opening".to_string()];
        for _ in 0..3 {
            let choice = selector.select(&input(&questions, &counts, Some(JD), None), &mut rng());
            assert_eq!(choice.source, TopicSource::JobDescription);
            questions.push(choice.question);
        }
        assert!(questions[2].contains("Strong communication"));
        assert!(questions[3].contains("Ability to lead"));

        let choice = selector.select(&input(&questions, &counts, Some(JD), None), &mut rng());
        assert_eq!(choice.source, TopicSource::Fallback);
    }

    #[test]
    fn test_short_job_description_is_ignored() {
        let questions = vec![];
        let counts = HashMap::new();
        let choice = TopicSelector::new().select(
            &input(&questions, &counts, Some("Experience with Rust required."), None),
            &mut rng(),
        );
        assert_eq!(choice.source, TopicSource::Fallback);
    }

    #[test]
    fn test_seniority_and_difficulty_wording() {
        let questions = vec![];
        let counts = HashMap::new();
        let mut senior = input(&questions, &counts, Some(JD), None);
        senior.level = SeniorityLevel::Staff;
        senior.difficulty = DifficultyPreference::Hard;
        let q = TopicSelector::new().select(&senior, &mut rng()).question;
        assert!(q.starts_with(prompts::HARD_PREFIX));
        assert!(q.contains("For a senior role"));

        let mut junior = input(&questions, &counts, Some(JD), None);
        junior.level = SeniorityLevel::Junior;
        junior.difficulty = DifficultyPreference::Easy;
        let q = TopicSelector::new().select(&junior, &mut rng()).question;
        assert!(q.starts_with(prompts::EASY_PREFIX));
        assert!(q.contains("even early in your experience"));
    }

    #[test]
    fn test_company_brief_strips_labels() {
        let questions = vec![];
        let counts = HashMap::new();
        let brief = "Expectations: owning the roadmap; ; Hints: talk about metrics";
        let choice =
            TopicSelector::new().select(&input(&questions, &counts, None, Some(brief)), &mut rng());
        assert_eq!(choice.source, TopicSource::CompanyBrief);
        assert!(
            choice.question == prompts::company_brief_question("owning the roadmap")
                || choice.question == prompts::company_brief_question("talk about metrics")
        );
    }

    #[test]
    fn test_coverage_picks_minimum_label() {
        let questions = vec![];
        let counts = HashMap::from([
            ("TECHNICAL_SKILL".to_string(), 0),
            ("SOFT_SKILL".to_string(), 3),
            ("FRAMEWORK".to_string(), 2),
            ("IMPACT".to_string(), 1),
            ("SYSTEM_DESIGN".to_string(), 5),
        ]);
        let choice =
            TopicSelector::new().select(&input(&questions, &counts, None, None), &mut rng());
        assert_eq!(choice.source, TopicSource::EntityCoverage);
        assert!(choice.question.contains("technical skill"));
    }

    #[test]
    fn test_coverage_ties_follow_label_order() {
        let counts = HashMap::from([("TECHNICAL_SKILL".to_string(), 4)]);
        assert!(from_entity_coverage(&counts)
            .unwrap()
            .contains("soft skill"));
    }

    #[test]
    fn test_well_covered_labels_fall_through() {
        let counts: HashMap<String, u32> = CORE_COMPETENCY_LABELS
            .iter()
            .map(|l| (l.to_string(), 2))
            .collect();
        assert!(from_entity_coverage(&counts).is_none());
    }

    #[test]
    fn test_fallback_uses_previous_topic() {
        let questions = vec!["Tell me about a product launch. What went wrong?".to_string()];
        let counts = HashMap::new();
        let choice =
            TopicSelector::new().select(&input(&questions, &counts, None, None), &mut rng());
        assert_eq!(choice.source, TopicSource::Fallback);
        assert_eq!(
            choice.question,
            prompts::follow_up_question("Tell me about a product launch")
        );
    }

    #[test]
    fn test_fallback_without_previous_question() {
        let questions = vec![];
        let counts = HashMap::new();
        let mut no_target = input(&questions, &counts, None, None);
        no_target.role = "";
        no_target.company = " ";
        let q = TopicSelector::new().select(&no_target, &mut rng()).question;
        assert_eq!(q, prompts::role_challenge_question("this role", "this company"));
    }

    #[test]
    fn test_seniority_from_label() {
        assert_eq!(SeniorityLevel::from_label("Entry"), SeniorityLevel::Junior);
        assert_eq!(SeniorityLevel::from_label("principal"), SeniorityLevel::Principal);
        assert_eq!(SeniorityLevel::from_label("?"), SeniorityLevel::Mid);
    }
}
