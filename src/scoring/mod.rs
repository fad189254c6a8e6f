//! Answer scoring policy.
//!
//! Every score is a pure function of the voice signals of one answer:
//!
//! * overall score: `round(100 * (0.6 * confidence + 0.4 * (1 - stress)))`
//! * pacing score: starts at 70, loses up to 40 points to stress and up to
//!   30 to hesitations, gains up to 15 from confidence, clamped to 0..=100
//!   with one decimal
//! * coaching tip: the first matching rule of stress, confidence and
//!   hesitation thresholds
//!
//! Session fact accuracy is the verified share of checked claims and lives
//! on [`FactCheckReport`](crate::claims::FactCheckReport).

use serde::{Deserialize, Serialize};

use crate::signals::{HIGH_CONFIDENCE, HIGH_STRESS, LOW_STRESS};

const CONFIDENCE_WEIGHT: f64 = 0.6;
const CALM_WEIGHT: f64 = 0.4;

const PACING_BASE: f64 = 70.0;
const PACING_STRESS_RATE: f64 = 50.0;
const PACING_MAX_STRESS_PENALTY: f64 = 40.0;
const PACING_HESITATION_RATE: f64 = 8.0;
const PACING_MAX_HESITATION_PENALTY: f64 = 30.0;
const PACING_CONFIDENCE_BONUS: f64 = 15.0;

const MANY_HESITATIONS: u32 = 3;

const TIP_STRESS: &str = "Stress is elevated. Take a breath and focus on one concrete example.";
const TIP_CONFIDENT: &str =
    "Strong confidence. Try adding a specific metric or outcome to land the point.";
const TIP_HESITATION: &str =
    "A few hesitations detected. Slowing down on key phrases can help clarity.";
const TIP_STEADY: &str = "Steady delivery. Keep this pace for the next answer.";

/// Voice-derived coaching for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCoaching {
    pub pacing_score: f64,
    pub tip: String,
}

/// All scores attached to one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerScore {
    /// 0..=100
    pub overall: u32,
    pub coaching: VoiceCoaching,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringPolicy;

impl ScoringPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, stress: f64, confidence: f64, hesitations: u32) -> AnswerScore {
        AnswerScore {
            overall: self.overall(stress, confidence),
            coaching: self.coaching(stress, confidence, hesitations),
        }
    }

    pub fn overall(&self, stress: f64, confidence: f64) -> u32 {
        let (stress, confidence) = (unit(stress), unit(confidence));
        let raw = 100.0 * (CONFIDENCE_WEIGHT * confidence + CALM_WEIGHT * (1.0 - stress));
        raw.round().clamp(0.0, 100.0) as u32
    }

    pub fn pacing(&self, stress: f64, confidence: f64, hesitations: u32) -> f64 {
        let (stress, confidence) = (unit(stress), unit(confidence));
        let stress_penalty = (PACING_STRESS_RATE * stress).min(PACING_MAX_STRESS_PENALTY);
        let hesitation_penalty =
            (PACING_HESITATION_RATE * f64::from(hesitations)).min(PACING_MAX_HESITATION_PENALTY);
        let score = PACING_BASE - stress_penalty - hesitation_penalty
            + PACING_CONFIDENCE_BONUS * confidence;
        (score.clamp(0.0, 100.0) * 10.0).round() / 10.0
    }

    pub fn tip(&self, stress: f64, confidence: f64, hesitations: u32) -> &'static str {
        if stress > HIGH_STRESS {
            TIP_STRESS
        } else if confidence > HIGH_CONFIDENCE && stress < LOW_STRESS {
            TIP_CONFIDENT
        } else if hesitations >= MANY_HESITATIONS {
            TIP_HESITATION
        } else {
            TIP_STEADY
        }
    }

    pub fn coaching(&self, stress: f64, confidence: f64, hesitations: u32) -> VoiceCoaching {
        VoiceCoaching {
            pacing_score: self.pacing(stress, confidence, hesitations),
            tip: self.tip(stress, confidence, hesitations).to_string(),
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_score() {
        let policy = ScoringPolicy::new();
        assert_eq!(policy.overall(0.0, 1.0), 100);
        assert_eq!(policy.overall(1.0, 0.0), 0);
        assert_eq!(policy.overall(0.5, 0.5), 50);
        // 100 * (0.6 * 0.65 + 0.4 * 0.65) = 65
        assert_eq!(policy.overall(0.35, 0.65), 65);
    }

    #[test]
    fn test_pacing_score() {
        let policy = ScoringPolicy::new();
        // 70 - 10 - 8 + 9 = 61
        assert_eq!(policy.pacing(0.2, 0.6, 1), 61.0);
        assert_eq!(policy.pacing(0.5, 0.5, 0), 52.5);
        assert_eq!(policy.pacing(0.0, 1.0, 0), 85.0);
        // both penalties capped: 70 - 40 - 30 + 0 = 0
        assert_eq!(policy.pacing(1.0, 0.0, 10), 0.0);
    }

    #[test]
    fn test_tip_priority() {
        let policy = ScoringPolicy::new();
        assert_eq!(policy.tip(0.8, 0.9, 5), TIP_STRESS);
        assert_eq!(policy.tip(0.2, 0.9, 5), TIP_CONFIDENT);
        assert_eq!(policy.tip(0.5, 0.5, 3), TIP_HESITATION);
        assert_eq!(policy.tip(0.5, 0.5, 0), TIP_STEADY);
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        let policy = ScoringPolicy::new();
        assert_eq!(policy.overall(-1.0, 2.0), 100);
        assert_eq!(policy.overall(f64::NAN, f64::NAN), 50);
    }
}
