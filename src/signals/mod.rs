//! Signal fusion.
//!
//! Turns the current (stress, confidence) measurement plus a short rolling
//! history into a coaching [`Tone`] and a relative difficulty delta. Streaks
//! over the recent window win over the current sample, and the learner's
//! stated [`DifficultyPreference`] softens whatever the signals suggest.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Stress above this counts toward a high-stress streak.
pub const HIGH_STRESS: f64 = 0.6;
/// Confidence above this (with low stress) counts toward a confidence streak.
pub const HIGH_CONFIDENCE: f64 = 0.7;
/// Stress must be below this for a sample to count as confident.
pub const LOW_STRESS: f64 = 0.4;
/// Confidence below this alone makes the current sample supportive.
pub const LOW_CONFIDENCE: f64 = 0.4;

const WINDOW: usize = 3;
const STREAK: usize = 2;

/// Coaching stance attached to the next question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tone {
    Supportive,
    Neutral,
    Challenging,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Supportive => "SUPPORTIVE",
            Tone::Neutral => "NEUTRAL",
            Tone::Challenging => "CHALLENGING",
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUPPORTIVE" => Ok(Tone::Supportive),
            "NEUTRAL" => Ok(Tone::Neutral),
            "CHALLENGING" => Ok(Tone::Challenging),
            _ => Err(format!("Unknown tone: {}", s)),
        }
    }
}

/// How hard the learner asked the interview to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyPreference {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl DifficultyPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyPreference::Easy => "easy",
            DifficultyPreference::Medium => "medium",
            DifficultyPreference::Hard => "hard",
        }
    }

    /// Lenient parse: anything starting with "easy" or "hard" selects that
    /// preference, everything else is medium.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.starts_with("easy") {
            DifficultyPreference::Easy
        } else if label.starts_with("hard") {
            DifficultyPreference::Hard
        } else {
            DifficultyPreference::Medium
        }
    }
}

impl std::fmt::Display for DifficultyPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One voice measurement, both values clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub stress: f64,
    pub confidence: f64,
}

impl SignalSample {
    pub fn new(stress: f64, confidence: f64) -> Self {
        Self {
            stress: clamp_unit(stress),
            confidence: clamp_unit(confidence),
        }
    }

    /// The value substituted when voice analysis is unavailable.
    pub fn neutral() -> Self {
        Self::new(0.5, 0.5)
    }

    fn is_stressed(&self) -> bool {
        self.stress > HIGH_STRESS
    }

    fn is_confident(&self) -> bool {
        self.confidence > HIGH_CONFIDENCE && self.stress < LOW_STRESS
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.5
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Bounded rolling history of prior samples, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalHistory {
    samples: VecDeque<SignalSample>,
    capacity: usize,
}

impl SignalHistory {
    /// A history keeping at most `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build a history from samples, keeping only the newest `capacity`.
    pub fn from_samples(capacity: usize, samples: impl IntoIterator<Item = SignalSample>) -> Self {
        let mut history = Self::new(capacity);
        for sample in samples {
            history.push(sample);
        }
        history
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: SignalSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The newest `n` samples, oldest first.
    pub fn last(&self, n: usize) -> Vec<SignalSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// The window streaks are judged on: the last three samples, or nothing
    /// when fewer than two samples exist.
    pub fn recent_window(&self) -> Vec<SignalSample> {
        if self.samples.len() < STREAK {
            Vec::new()
        } else {
            self.last(WINDOW)
        }
    }
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Result of fusing one measurement with its history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fusion {
    pub tone: Tone,
    /// One of -1, 0, +1.
    pub difficulty_delta: i8,
    pub high_stress_streak: bool,
    pub high_confidence_streak: bool,
}

impl Fusion {
    /// Short human-readable account of why this tone was chosen.
    pub fn describe(&self) -> String {
        format!(
            "high_stress_streak={} high_confidence_streak={} tone={} delta={:+}",
            self.high_stress_streak, self.high_confidence_streak, self.tone, self.difficulty_delta
        )
    }
}

/// Fuse the current sample with prior history under a preference.
///
/// Pure: the same inputs always give the same output.
pub fn fuse(
    current: SignalSample,
    history: &SignalHistory,
    preference: DifficultyPreference,
) -> Fusion {
    let window = history.recent_window();
    let high_stress_streak = window.iter().filter(|s| s.is_stressed()).count() >= STREAK;
    let high_confidence_streak = window.iter().filter(|s| s.is_confident()).count() >= STREAK;

    let (mut tone, mut delta) = if high_stress_streak {
        (Tone::Supportive, -1)
    } else if high_confidence_streak {
        (Tone::Challenging, 1)
    } else if current.is_confident() {
        (Tone::Challenging, 1)
    } else if current.stress > HIGH_STRESS || current.confidence < LOW_CONFIDENCE {
        (Tone::Supportive, -1)
    } else {
        (Tone::Neutral, 0)
    };

    match preference {
        DifficultyPreference::Easy if !high_confidence_streak => {
            if delta > 0 {
                delta = 0;
            }
            if tone == Tone::Challenging {
                tone = Tone::Neutral;
            }
        }
        DifficultyPreference::Hard if !high_stress_streak => {
            if delta < 0 {
                delta = 0;
            }
            if tone == Tone::Supportive {
                tone = Tone::Neutral;
            }
        }
        _ => {}
    }

    Fusion {
        tone,
        difficulty_delta: delta,
        high_stress_streak,
        high_confidence_streak,
    }
}
