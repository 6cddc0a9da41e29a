//! Content spam scoring
//!
//! Provides a pre-send content check:
//! - Subject heuristics (length, capitals, punctuation, fake reply prefixes)
//! - Body heuristics (text ratio, hidden text, scripts, shorteners, images)
//! - A categorised trigger-phrase lexicon

pub mod analyzer;
pub mod lexicon;

pub use analyzer::{SpamScoreAnalyzer, CLIPPING_THRESHOLD_BYTES};
pub use lexicon::{Lexicon, TriggerCategory, TriggerTerm};

use serde::{Deserialize, Serialize};

/// Spam classification of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpamLevel {
    /// Score below 3
    Safe,
    /// Score in [3, 5)
    Review,
    /// Score in [5, 8)
    Warning,
    /// Score of 8 or more
    Blocked,
}

impl SpamLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            SpamLevel::Blocked
        } else if score >= 5.0 {
            SpamLevel::Warning
        } else if score >= 3.0 {
            SpamLevel::Review
        } else {
            SpamLevel::Safe
        }
    }
}

impl std::fmt::Display for SpamLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpamLevel::Safe => write!(f, "safe"),
            SpamLevel::Review => write!(f, "review"),
            SpamLevel::Warning => write!(f, "warning"),
            SpamLevel::Blocked => write!(f, "blocked"),
        }
    }
}

/// Where a trigger phrase was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerLocation {
    Subject,
    Body,
}

/// A lexicon hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerMatch {
    pub word: String,
    pub category: TriggerCategory,
    pub location: TriggerLocation,
    /// Weight actually added to the score
    pub weight: f64,
}

/// Measurements gathered while scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpamDetails {
    pub subject_length: usize,
    pub caps_ratio: f64,
    pub html_length: usize,
    pub text_length: usize,
    pub text_to_html_ratio: f64,
    pub word_count: usize,
    pub link_count: usize,
    pub image_count: usize,
    pub images_missing_alt: usize,
    pub trigger_words: Vec<TriggerMatch>,
}

/// Result of a content analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamReport {
    /// Total score, rounded to one decimal
    pub score: f64,
    pub subject_score: f64,
    pub content_score: f64,
    pub level: SpamLevel,
    pub warnings: Vec<String>,
    pub details: SpamDetails,
}

impl SpamReport {
    pub fn is_blocked(&self) -> bool {
        self.level == SpamLevel::Blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(SpamLevel::from_score(0.0), SpamLevel::Safe);
        assert_eq!(SpamLevel::from_score(2.9), SpamLevel::Safe);
        assert_eq!(SpamLevel::from_score(3.0), SpamLevel::Review);
        assert_eq!(SpamLevel::from_score(4.9), SpamLevel::Review);
        assert_eq!(SpamLevel::from_score(5.0), SpamLevel::Warning);
        assert_eq!(SpamLevel::from_score(7.9), SpamLevel::Warning);
        assert_eq!(SpamLevel::from_score(8.0), SpamLevel::Blocked);
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let json = serde_json::to_string(&SpamLevel::Blocked).unwrap();
        assert_eq!(json, "\"blocked\"");
    }
}
