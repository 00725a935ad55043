// Crisis keyword detector

use serde::{Deserialize, Serialize};
use std::fmt;

use super::keywords::KeywordSet;

/// Inputs shorter than this are partial keystrokes, not analyzed
pub const DEFAULT_MIN_LENGTH: usize = 10;

/// How much of the input travels with a detection (alerts, audit)
pub const DEFAULT_SAMPLE_LENGTH: usize = 200;

/// Coarse crisis severity, ordered `None < Moderate < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Moderate,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Moderate => "moderate",
            Severity::High => "high",
        }
    }

    /// Upper-case label used by the alerting backend
    pub fn label(&self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Moderate => "MODERATE",
            Severity::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" => Some(Severity::None),
            "moderate" => Some(Severity::Moderate),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a piece of text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    TextInput,
    FormSubmission,
    #[default]
    Manual,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::TextInput => "text_input",
            InputType::FormSubmission => "form_submission",
            InputType::Manual => "manual",
        }
    }
}

/// Outcome of a single scan. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub crisis_detected: bool,
    pub severity: Severity,
    /// General-list matches first, then domain-list matches, each in list order
    pub matched_phrases: Vec<String>,
    pub sampled_text: String,
}

impl DetectionResult {
    fn clear(sampled_text: String) -> Self {
        Self {
            crisis_detected: false,
            severity: Severity::None,
            matched_phrases: Vec::new(),
            sampled_text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrisisDetector {
    keywords: KeywordSet,
    min_length: usize,
    sample_length: usize,
}

impl CrisisDetector {
    pub fn new(keywords: KeywordSet) -> Self {
        Self {
            keywords,
            min_length: DEFAULT_MIN_LENGTH,
            sample_length: DEFAULT_SAMPLE_LENGTH,
        }
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn with_sample_length(mut self, sample_length: usize) -> Self {
        self.sample_length = sample_length;
        self
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    /// Classify text for crisis risk.
    ///
    /// Pure function of `text` and the keyword set: no logging of content,
    /// no state. Text under the minimum length yields a clear result; the
    /// minimum counts the raw characters, surrounding whitespace included.
    pub fn scan(&self, text: &str) -> DetectionResult {
        let sampled_text: String = text.chars().take(self.sample_length).collect();

        if text.chars().count() < self.min_length {
            return DetectionResult::clear(sampled_text);
        }

        let lowered = text.trim().to_lowercase();

        let general: Vec<String> = self
            .keywords
            .general()
            .iter()
            .filter(|phrase| lowered.contains(phrase.as_str()))
            .cloned()
            .collect();

        let domain: Vec<String> = self
            .keywords
            .domain()
            .iter()
            .filter(|phrase| lowered.contains(phrase.as_str()))
            .cloned()
            .collect();

        let severity = match (general.len(), domain.len()) {
            (g, _) if g >= 2 => Severity::High,
            (1, _) => Severity::Moderate,
            (0, d) if d >= 1 => Severity::Moderate,
            _ => Severity::None,
        };

        let mut matched_phrases = general;
        matched_phrases.extend(domain);

        DetectionResult {
            crisis_detected: !matched_phrases.is_empty(),
            severity,
            matched_phrases,
            sampled_text,
        }
    }
}

impl Default for CrisisDetector {
    fn default() -> Self {
        Self::new(KeywordSet::default())
    }
}
