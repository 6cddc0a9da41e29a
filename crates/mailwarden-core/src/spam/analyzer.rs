//! Content spam-score analyzer
//!
//! Scores a subject line and HTML body with heuristics that mirror what
//! mailbox-provider filters penalise. Pure and deterministic: the analyzer
//! classifies, callers decide whether a level blocks sending.

use super::lexicon::{Lexicon, TriggerCategory};
use super::{SpamDetails, SpamLevel, SpamReport, TriggerLocation, TriggerMatch};
use regex::Regex;
use tracing::debug;

/// Gmail clips messages above this many bytes of HTML
pub const CLIPPING_THRESHOLD_BYTES: usize = 102_400;

const MAX_SUBJECT_CHARS: usize = 78;
const SUBJECT_LEXICON_MULTIPLIER: f64 = 1.5;
const MAX_IMAGES: usize = 15;
const MIN_TEXT_CHARS: usize = 20;
const WORDS_PER_LINK: usize = 20;

struct Patterns {
    style_block: Regex,
    script_block: Regex,
    tag: Regex,
    whitespace: Regex,
    hidden: Regex,
    img_tag: Regex,
    alt_attr: Regex,
    script_tag: Regex,
    form_tag: Regex,
    link: Regex,
    shortener: Regex,
    reply_prefix: Regex,
}

impl Patterns {
    fn compile() -> Self {
        let re = |p: &str| Regex::new(p).expect("static spam pattern");
        Self {
            style_block: re(r"(?is)<style\b.*?</style\s*>"),
            script_block: re(r"(?is)<script\b.*?</script\s*>"),
            tag: re(r"(?s)<[^>]*>"),
            whitespace: re(r"\s+"),
            hidden: re(r"(?i)display\s*:\s*none|font-size\s*:\s*0+(?:\.0+)?(?:px|pt|em|rem|%)?\s*[;\x22'}]"),
            img_tag: re(r"(?is)<img\b[^>]*>"),
            alt_attr: re(r"(?i)\balt\s*="),
            script_tag: re(r"(?i)<script\b"),
            form_tag: re(r"(?i)<form\b"),
            link: re(r"(?i)<a\b[^>]*\bhref\s*="),
            shortener: re(
                r"(?i)https?://(?:www\.)?(?:bit\.ly|tinyurl\.com|goo\.gl|t\.co|ow\.ly|is\.gd|buff\.ly|rebrand\.ly|cutt\.ly|shorturl\.at|tiny\.cc)/",
            ),
            reply_prefix: re(r"(?i)^\s*(?:re|fwd?)\s*:"),
        }
    }
}

/// Spam-score analyzer
pub struct SpamScoreAnalyzer {
    lexicon: Lexicon,
    patterns: Patterns,
}

impl SpamScoreAnalyzer {
    /// Create an analyzer with the built-in lexicon
    pub fn new() -> Self {
        Self::with_lexicon(Lexicon::builtin())
    }

    pub fn with_lexicon(lexicon: Lexicon) -> Self {
        Self {
            lexicon,
            patterns: Patterns::compile(),
        }
    }

    /// Score a subject line and HTML body
    pub fn analyze(&self, subject: &str, html_body: &str) -> SpamReport {
        let mut warnings = Vec::new();
        let mut details = SpamDetails::default();

        let subject_score = self.score_subject(subject, &mut warnings, &mut details);
        let content_score = self.score_body(html_body, &mut warnings, &mut details);

        let score = round1(subject_score + content_score);
        let level = SpamLevel::from_score(score);

        debug!(
            score,
            subject_score,
            content_score,
            level = %level,
            "Content analyzed"
        );

        SpamReport {
            score,
            subject_score: round1(subject_score),
            content_score: round1(content_score),
            level,
            warnings,
            details,
        }
    }

    /// Extract visible text from HTML
    pub fn strip_tags(&self, html: &str) -> String {
        let without_style = self.patterns.style_block.replace_all(html, " ");
        let without_script = self.patterns.script_block.replace_all(&without_style, " ");
        let text = self.patterns.tag.replace_all(&without_script, " ");
        let text = text
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'");
        self.patterns
            .whitespace
            .replace_all(&text, " ")
            .trim()
            .to_string()
    }

    fn score_subject(
        &self,
        subject: &str,
        warnings: &mut Vec<String>,
        details: &mut SpamDetails,
    ) -> f64 {
        let subject = subject.trim();
        details.subject_length = subject.chars().count();

        if subject.is_empty() {
            warnings.push("Subject line is empty".to_string());
            return 2.0;
        }

        let mut score = 0.0;

        if details.subject_length > MAX_SUBJECT_CHARS {
            warnings.push(format!(
                "Subject is {} characters; keep it under {}",
                details.subject_length, MAX_SUBJECT_CHARS
            ));
            score += 1.0;
        }

        let alpha: Vec<char> = subject.chars().filter(|c| c.is_alphabetic()).collect();
        if alpha.len() > 3 {
            let upper = alpha.iter().filter(|c| c.is_uppercase()).count();
            let ratio = upper as f64 / alpha.len() as f64;
            details.caps_ratio = round2(ratio);

            if upper == alpha.len() {
                warnings.push("Subject is written in ALL CAPS".to_string());
                score += 2.5;
            } else if ratio > 0.5 {
                warnings.push("Subject is mostly capital letters".to_string());
                score += 1.5;
            }
        }

        let marks = subject.chars().filter(|c| *c == '!' || *c == '?').count();
        if marks > 1 {
            warnings.push(format!("Subject has {} exclamation/question marks", marks));
            score += (0.5 * (marks - 1) as f64).min(2.0);
        }

        if self.patterns.reply_prefix.is_match(subject) {
            warnings.push("Subject fakes a reply/forward prefix".to_string());
            score += 1.5;
        }

        for term in self.lexicon.matches(subject) {
            let weight = term.weight * SUBJECT_LEXICON_MULTIPLIER;
            debug!(term = term.term, weight, "Subject trigger matched");
            score += weight;
            details.trigger_words.push(TriggerMatch {
                word: term.term.to_string(),
                category: term.category,
                location: TriggerLocation::Subject,
                weight,
            });
        }

        score
    }

    fn score_body(&self, html: &str, warnings: &mut Vec<String>, details: &mut SpamDetails) -> f64 {
        let mut score = 0.0;
        let text = self.strip_tags(html);

        details.html_length = html.len();
        details.text_length = text.chars().count();
        details.word_count = text.split_whitespace().count();

        if details.text_length < MIN_TEXT_CHARS {
            warnings.push("Message has almost no text content".to_string());
            score += 1.5;
        }

        if !html.is_empty() {
            let ratio = text.len() as f64 / html.len() as f64;
            details.text_to_html_ratio = round2(ratio);
            if ratio < 0.2 {
                warnings.push(format!(
                    "Text-to-HTML ratio is {:.0}%; aim for at least 30%",
                    ratio * 100.0
                ));
                score += 1.5;
            } else if ratio < 0.3 {
                warnings.push(format!("Text-to-HTML ratio is low ({:.0}%)", ratio * 100.0));
                score += 0.5;
            }
        }

        if html.len() > CLIPPING_THRESHOLD_BYTES {
            warnings.push("HTML exceeds 102KB and will be clipped by Gmail".to_string());
            score += 1.0;
        }

        if self.has_hidden_text(html) {
            warnings.push("Message contains hidden text".to_string());
            score += 2.0;
        }

        if self.patterns.script_tag.is_match(html) {
            warnings.push("Message contains <script> tags".to_string());
            score += 2.5;
        }

        if self.patterns.form_tag.is_match(html) {
            warnings.push("Message contains a <form>".to_string());
            score += 1.5;
        }

        if self.patterns.shortener.is_match(html) {
            warnings.push("Message links through a URL shortener".to_string());
            score += 1.5;
        }

        let images: Vec<&str> = self
            .patterns
            .img_tag
            .find_iter(html)
            .map(|m| m.as_str())
            .collect();
        details.image_count = images.len();
        details.images_missing_alt = images
            .iter()
            .filter(|tag| !self.patterns.alt_attr.is_match(tag))
            .count();

        if details.image_count > MAX_IMAGES {
            warnings.push(format!("Message has {} images", details.image_count));
            score += 1.0;
        }

        if details.images_missing_alt > 0 {
            warnings.push(format!(
                "{} image(s) missing alt text",
                details.images_missing_alt
            ));
            score += (0.25 * details.images_missing_alt as f64).min(1.5);
        }

        details.link_count = self.patterns.link.find_iter(html).count();
        if details.link_count >= 1 && details.link_count * WORDS_PER_LINK > details.word_count {
            warnings.push(format!(
                "{} links for {} words; too link-heavy",
                details.link_count, details.word_count
            ));
            score += 1.0;
        }

        for term in self.lexicon.matches(&text) {
            debug!(term = term.term, weight = term.weight, "Body trigger matched");
            score += term.weight;
            details.trigger_words.push(TriggerMatch {
                word: term.term.to_string(),
                category: term.category,
                location: TriggerLocation::Body,
                weight: term.weight,
            });
        }

        if details
            .trigger_words
            .iter()
            .any(|t| t.category == TriggerCategory::Deceptive)
        {
            warnings.push("Message uses deceptive phrasing".to_string());
        }

        score
    }

    /// Hidden styling anywhere except one occurrence inside an `<img>`
    /// (the usual 1x1 tracking pixel).
    fn has_hidden_text(&self, html: &str) -> bool {
        let total = self.patterns.hidden.find_iter(html).count();
        if total == 0 {
            return false;
        }

        let in_images: usize = self
            .patterns
            .img_tag
            .find_iter(html)
            .map(|img| self.patterns.hidden.find_iter(img.as_str()).count())
            .sum();

        !(total == 1 && in_images == 1)
    }
}

impl Default for SpamScoreAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
