//! Centralized question, feedback and research prompt text.
//!
//! Every learner-facing sentence the coach produces lives here, so wording
//! changes never touch selection logic.

use reqwest::Url;

use crate::collaborators::ScoutUpdate;
use crate::signals::Tone;

const SEARCH_URL: &str = "https://www.google.com/search";

/// First question of every session unless the job-description opener is used.
pub const DEFAULT_FIRST_QUESTION: &str =
    "Walk me through your background and why you're interested in this role.";

/// Prefix for job-description questions when the learner chose easy.
pub const EASY_PREFIX: &str = "Give one concrete example. ";

/// Prefix for job-description questions when the learner chose hard.
pub const HARD_PREFIX: &str = "Walk me through a complex situation where this was critical. ";

/// Opener used for some sessions that come with a long job description.
pub fn jd_first_question(role: &str, company: &str) -> String {
    format!(
        "Based on the {} requirements for {}, walk me through your relevant experience.",
        role, company
    )
}

pub fn jd_question_senior(phrase: &str) -> String {
    format!(
        "For a senior role, the job description emphasizes {}. How have you demonstrated this at scale?",
        phrase
    )
}

pub fn jd_question_junior(phrase: &str) -> String {
    format!(
        "The role calls for {}. Can you tell us about a time you showed this, even early in your experience?",
        phrase
    )
}

pub fn jd_question_default(phrase: &str) -> String {
    format!(
        "The job description mentions {}. Can you share an example from your experience?",
        phrase
    )
}

pub fn company_brief_question(target: &str) -> String {
    format!(
        "Regarding {}, how have you demonstrated this in your past roles?",
        target
    )
}

/// Question naming an under-covered competency (already human readable).
pub fn coverage_question(competency: &str) -> String {
    format!(
        "Let's focus on your {}. Tell me about a recent example that best shows this strength.",
        competency
    )
}

pub fn follow_up_question(topic: &str) -> String {
    format!(
        "You just spoke about {}. Can you share a specific example from your experience that relates to that, and how did you handle it?",
        topic
    )
}

pub fn role_example_question(role: &str, company: &str) -> String {
    format!(
        "For a {} position at {}, can you share a specific example from your experience and how you handled it?",
        role, company
    )
}

pub fn role_challenge_question(role: &str, company: &str) -> String {
    format!(
        "For the {} role at {}, can you share a specific example from your experience where you faced a challenge and how you approached it?",
        role, company
    )
}

/// Deterministic feedback when personalization memory has nothing real.
pub fn feedback_for_tone(tone: Tone) -> &'static str {
    match tone {
        Tone::Challenging => "Your confidence is high. Let's push deeper into your metrics.",
        Tone::Supportive => {
            "I noticed some hesitation. Take a breath and focus on one specific example."
        }
        Tone::Neutral => "Good structure. Let's move to the next topic.",
    }
}

// ============================================================================
// Session report
// ============================================================================

pub fn overall_trend(questions_answered: u32) -> String {
    format!(
        "Session complete. You answered {} question(s) in this session. Your voice metrics suggest steady delivery.",
        questions_answered
    )
}

pub fn company_culture_step(company: &str) -> String {
    format!("Review company research on {} culture.", company)
}

pub const PACING_STEP: &str = "Practice pacing with voice signals.";

pub const NO_CLAIMS_SUMMARY: &str = "No verifiable claims in this session.";

pub const TIMED_OUT_SUMMARY: &str = "Fact-check timed out; partial results only.";

/// `flagged` is set when any claim ended up in the disputed list.
pub fn fact_check_summary(verified: usize, total: usize, flagged: bool) -> String {
    let mut summary = format!("{} of {} claims verified.", verified, total);
    if flagged {
        summary.push_str(" Some claims need verification or a source.");
    }
    summary
}

/// Summary attached to a session once its company brief is researched.
pub fn company_brief_summary(expectations: &[String], hints: &[String]) -> String {
    let mut parts = Vec::new();
    if !expectations.is_empty() {
        let top: Vec<&str> = expectations.iter().take(3).map(String::as_str).collect();
        parts.push(format!("Company/role expectations: {}", top.join("; ")));
    }
    if !hints.is_empty() {
        let top: Vec<&str> = hints.iter().take(3).map(String::as_str).collect();
        parts.push(format!("Hints for candidates: {}", top.join("; ")));
    }
    parts.join(" ")
}

// ============================================================================
// Research tasks
// ============================================================================

/// Research query asking for a fixed four-line verdict on one claim.
pub fn fact_check_query(claim: &str) -> String {
    format!(
        "Fact-check the claim below using reliable sources. Return EXACTLY this format (4 lines):\n\
         CORRECT: <true|false>\n\
         ACTUAL_VALUE: <short actual value or 'unknown'>\n\
         SOURCE: <best URL>\n\
         SUMMARY: <one short sentence>\n\n\
         CLAIM: {}",
        claim.trim()
    )
}

/// Browsing task asking for role expectations and candidate hints.
pub fn company_brief_task(role: &str, company: &str) -> String {
    format!(
        "Open the careers or jobs page for {company}. Find a relevant job posting for a role like {role}. \
         Summarize the top 3 expectations and 3 hints for candidates. \
         Return a short summary as plain text with bullet points."
    )
}

/// Where the browsing task starts.
pub fn company_brief_start_url(company: &str) -> String {
    search_url(&format!("{} careers", company.trim()))
}

/// Standing query for a role scout.
pub fn scout_query(role: &str, company: &str) -> String {
    format!(
        "Track new interview-related articles, leadership principles, and role expectations \
         for {role} at {company}. Alert on relevant interview tips and company culture insights."
    )
}

/// Canned scout updates shown when no live scout feed is available.
pub fn scout_fallback_updates(role: &str, company: &str) -> Vec<ScoutUpdate> {
    vec![
        ScoutUpdate {
            title: format!("{} {} interview tips", company, role),
            url: search_url(&format!("{} {} interview tips", company, role)),
            summary: "Focus on the core skills in the job description and on clear communication with partner teams."
                .to_string(),
        },
        ScoutUpdate {
            title: "Behavioral questions to expect".to_string(),
            url: search_url("behavioral interview questions"),
            summary: "Prepare STAR stories around conflict, leadership, estimation, and impact.".to_string(),
        },
        ScoutUpdate {
            title: format!("{} culture & leadership principles", company),
            url: search_url(&format!("{} company culture", company)),
            summary: format!(
                "Read about {}'s culture and leadership expectations before your round.",
                company
            ),
        },
    ]
}

/// Web search URL with `query` form-encoded into the `q` parameter.
pub fn search_url(query: &str) -> String {
    match Url::parse_with_params(SEARCH_URL, &[("q", query)]) {
        Ok(url) => url.to_string(),
        Err(_) => SEARCH_URL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_for_each_tone() {
        assert!(feedback_for_tone(Tone::Challenging).contains("metrics"));
        assert!(feedback_for_tone(Tone::Supportive).contains("hesitation"));
        assert!(feedback_for_tone(Tone::Neutral).contains("next topic"));
    }

    #[test]
    fn test_fact_check_summary() {
        assert_eq!(fact_check_summary(2, 2, false), "2 of 2 claims verified.");
        assert_eq!(
            fact_check_summary(1, 3, true),
            "1 of 3 claims verified. Some claims need verification or a source."
        );
    }

    #[test]
    fn test_company_brief_summary_takes_three_each() {
        let expectations: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let hints: Vec<String> = ["e", "f"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            company_brief_summary(&expectations, &hints),
            "Company/role expectations: a; b; c Hints for candidates: e; f"
        );
        assert_eq!(company_brief_summary(&[], &[]), "");
    }

    #[test]
    fn test_fact_check_query_embeds_claim() {
        let query = fact_check_query("  We grew revenue 40%.  ");
        assert!(query.starts_with("Fact-check the claim below"));
        assert!(query.contains("\nCORRECT: <true|false>\n"));
        assert!(query.ends_with("CLAIM: We grew revenue 40%."));
    }

    #[test]
    fn test_start_url_encodes_spaces() {
        assert_eq!(
            company_brief_start_url("Acme Corp"),
            "https://www.google.com/search?q=Acme+Corp+careers"
        );
    }

    #[test]
    fn test_start_url_escapes_reserved_characters() {
        assert_eq!(
            company_brief_start_url(" AT&T #1? "),
            "https://www.google.com/search?q=AT%26T+%231%3F+careers"
        );
        assert_eq!(search_url("a=b/c"), "https://www.google.com/search?q=a%3Db%2Fc");
    }

    #[test]
    fn test_scout_fallback_updates_link_searches() {
        let updates = scout_fallback_updates("PM", "Acme");
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].title, "Acme PM interview tips");
        assert_eq!(
            updates[2].url,
            "https://www.google.com/search?q=Acme+company+culture"
        );
    }

    #[test]
    fn test_scout_query_names_role_and_company() {
        let query = scout_query("PM", "Acme");
        assert!(query.contains("for PM at Acme."));
    }
}
