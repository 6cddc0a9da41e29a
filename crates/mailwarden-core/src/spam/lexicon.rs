//! Spam trigger lexicon
//!
//! Phrases that mailbox-provider filters weigh against bulk mail, grouped
//! by category. Matching is case-insensitive on word boundaries.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lexicon category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCategory {
    Urgency,
    Money,
    FreeOffer,
    SpammyPhrase,
    Deceptive,
}

impl std::fmt::Display for TriggerCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerCategory::Urgency => write!(f, "urgency"),
            TriggerCategory::Money => write!(f, "money"),
            TriggerCategory::FreeOffer => write!(f, "free_offer"),
            TriggerCategory::SpammyPhrase => write!(f, "spammy_phrase"),
            TriggerCategory::Deceptive => write!(f, "deceptive"),
        }
    }
}

const TERMS: &[(&str, TriggerCategory, f64)] = &[
    // Urgency
    ("act now", TriggerCategory::Urgency, 1.0),
    ("urgent", TriggerCategory::Urgency, 1.0),
    ("limited time", TriggerCategory::Urgency, 0.8),
    ("expires today", TriggerCategory::Urgency, 0.8),
    ("last chance", TriggerCategory::Urgency, 0.7),
    ("don't delay", TriggerCategory::Urgency, 0.7),
    ("immediately", TriggerCategory::Urgency, 0.5),
    ("action required", TriggerCategory::Urgency, 1.0),
    // Money
    ("cash bonus", TriggerCategory::Money, 1.2),
    ("make money", TriggerCategory::Money, 1.2),
    ("earn extra cash", TriggerCategory::Money, 1.2),
    ("double your income", TriggerCategory::Money, 1.5),
    ("million dollars", TriggerCategory::Money, 1.5),
    ("lowest price", TriggerCategory::Money, 0.6),
    ("best price", TriggerCategory::Money, 0.5),
    ("no credit check", TriggerCategory::Money, 1.2),
    ("bitcoin", TriggerCategory::Money, 0.8),
    // Free / offer
    ("100% free", TriggerCategory::FreeOffer, 1.5),
    ("free gift", TriggerCategory::FreeOffer, 1.0),
    ("free trial", TriggerCategory::FreeOffer, 0.5),
    ("free access", TriggerCategory::FreeOffer, 0.8),
    ("risk-free", TriggerCategory::FreeOffer, 0.8),
    ("no cost", TriggerCategory::FreeOffer, 0.7),
    ("special promotion", TriggerCategory::FreeOffer, 0.6),
    ("exclusive deal", TriggerCategory::FreeOffer, 0.5),
    // Spammy phrases
    ("click here", TriggerCategory::SpammyPhrase, 0.8),
    ("click below", TriggerCategory::SpammyPhrase, 0.8),
    ("buy now", TriggerCategory::SpammyPhrase, 0.8),
    ("order now", TriggerCategory::SpammyPhrase, 0.7),
    ("once in a lifetime", TriggerCategory::SpammyPhrase, 1.0),
    ("this isn't spam", TriggerCategory::SpammyPhrase, 2.0),
    ("not spam", TriggerCategory::SpammyPhrase, 1.5),
    ("viagra", TriggerCategory::SpammyPhrase, 3.0),
    ("weight loss", TriggerCategory::SpammyPhrase, 1.0),
    // Deceptive
    ("you have been selected", TriggerCategory::Deceptive, 1.5),
    ("you're a winner", TriggerCategory::Deceptive, 2.0),
    ("congratulations you", TriggerCategory::Deceptive, 1.2),
    ("verify your account", TriggerCategory::Deceptive, 2.0),
    ("confirm your identity", TriggerCategory::Deceptive, 1.5),
    ("account suspended", TriggerCategory::Deceptive, 2.0),
    ("inheritance", TriggerCategory::Deceptive, 1.5),
    ("wire transfer", TriggerCategory::Deceptive, 1.2),
];

/// A compiled lexicon entry
#[derive(Debug, Clone)]
pub struct TriggerTerm {
    pub term: &'static str,
    pub category: TriggerCategory,
    pub weight: f64,
    pattern: Regex,
}

impl TriggerTerm {
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// The compiled trigger lexicon
#[derive(Debug, Clone)]
pub struct Lexicon {
    terms: Vec<TriggerTerm>,
}

impl Lexicon {
    /// Compile the built-in lexicon
    pub fn builtin() -> Self {
        let terms = TERMS
            .iter()
            .filter_map(|(term, category, weight)| {
                // Boundaries only where the term starts/ends with a word char.
                let escaped = regex::escape(term);
                let starts_word = term.chars().next().map_or(false, |c| c.is_alphanumeric());
                let ends_word = term.chars().last().map_or(false, |c| c.is_alphanumeric());
                let pattern = format!(
                    "(?i){}{}{}",
                    if starts_word { r"\b" } else { "" },
                    escaped,
                    if ends_word { r"\b" } else { "" }
                );
                Regex::new(&pattern).ok().map(|pattern| TriggerTerm {
                    term,
                    category: *category,
                    weight: *weight,
                    pattern,
                })
            })
            .collect();

        Self { terms }
    }

    /// Every term found in `text`
    pub fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a TriggerTerm> + 'a {
        self.terms.iter().filter(move |t| t.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_compiles_every_term() {
        assert_eq!(Lexicon::builtin().len(), TERMS.len());
    }

    #[test]
    fn test_word_boundaries() {
        let lexicon = Lexicon::builtin();
        let found: Vec<&str> = lexicon
            .matches("Please CLICK HERE for a 100% free upgrade")
            .map(|t| t.term)
            .collect();
        assert!(found.contains(&"click here"));
        assert!(found.contains(&"100% free"));

        // "urgently" is not "urgent"
        assert_eq!(lexicon.matches("we urgently need feedback").count(), 0);
    }
}
