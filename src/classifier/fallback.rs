//! Keyword fallback classifier — deterministic, always available.
//!
//! Scans normalized lowercase text for small per-category keyword sets in
//! a fixed priority order (hate speech > harassment > explicit > spam) and
//! returns the first hit at a fixed per-category confidence. Identical
//! input always yields identical output, so unit tests can assert exact
//! results.

use async_trait::async_trait;
use regex::RegexSet;

use super::{Classification, Classifier};
use crate::model::Category;

struct CategoryCheck {
    category: Category,
    confidence: u8,
    reason: &'static str,
    keywords: RegexSet,
}

fn keyword_set(keywords: &[&str]) -> RegexSet {
    // Escaped literals: plain substring matching, no boundary tricks.
    RegexSet::new(keywords.iter().map(|k| regex::escape(k)))
        .expect("escaped keyword literals always compile")
}

/// Rule-based classifier used when no external backend is configured or
/// the external call fails.
pub struct FallbackClassifier {
    checks: Vec<CategoryCheck>,
}

impl Default for FallbackClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackClassifier {
    pub fn new() -> Self {
        // Priority order matters: the first matching category wins.
        let checks = vec![
            CategoryCheck {
                category: Category::HateSpeech,
                confidence: 75,
                reason: "Contains keywords associated with hate speech",
                keywords: keyword_set(&["hate", "racist", "discrimination", "bigot"]),
            },
            CategoryCheck {
                category: Category::Harassment,
                confidence: 70,
                reason: "Contains keywords associated with harassment",
                keywords: keyword_set(&["harass", "bully", "threat", "stalking"]),
            },
            CategoryCheck {
                category: Category::Explicit,
                confidence: 85,
                reason: "Contains keywords associated with explicit content",
                keywords: keyword_set(&["porn", "sex", "nude", "explicit"]),
            },
            CategoryCheck {
                category: Category::Spam,
                confidence: 90,
                reason: "Contains keywords associated with spam",
                keywords: keyword_set(&[
                    "buy now",
                    "click here",
                    "free money",
                    "discount",
                    "limited time",
                ]),
            },
        ];
        Self { checks }
    }

    /// Synchronous classification core, shared with the external strategy's
    /// degrade path.
    pub fn classify_text(&self, text: &str) -> Classification {
        let normalized = text.to_lowercase();
        for check in &self.checks {
            if check.keywords.is_match(&normalized) {
                return Classification {
                    category: check.category,
                    confidence: check.confidence,
                    flagged_hint: false,
                    reasons: vec![check.reason.to_string()],
                };
            }
        }
        Classification::safe()
    }
}

#[async_trait]
impl Classifier for FallbackClassifier {
    async fn classify(&self, text: &str) -> Classification {
        self.classify_text(text)
    }

    fn name(&self) -> &str {
        "keyword-fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_text_yields_safe_zero() {
        let classifier = FallbackClassifier::new();
        let cls = classifier.classify_text("hello world");
        assert_eq!(cls.category, Category::Safe);
        assert_eq!(cls.confidence, 0);
        assert!(cls.reasons.is_empty());
    }

    #[test]
    fn spam_keywords_yield_spam_at_90() {
        let classifier = FallbackClassifier::new();
        let cls = classifier.classify_text("buy now limited time discount");
        assert_eq!(cls.category, Category::Spam);
        assert_eq!(cls.confidence, 90);
        assert!(!cls.flagged_hint);
    }

    #[test]
    fn hate_keywords_yield_hate_speech_at_75() {
        let classifier = FallbackClassifier::new();
        let cls = classifier.classify_text("full of hate and discrimination");
        assert_eq!(cls.category, Category::HateSpeech);
        assert_eq!(cls.confidence, 75);
    }

    #[test]
    fn harassment_keywords_yield_harassment_at_70() {
        let classifier = FallbackClassifier::new();
        let cls = classifier.classify_text("stop trying to bully me");
        assert_eq!(cls.category, Category::Harassment);
        assert_eq!(cls.confidence, 70);
    }

    #[test]
    fn explicit_keywords_yield_explicit_at_85() {
        let classifier = FallbackClassifier::new();
        let cls = classifier.classify_text("explicit material inside");
        assert_eq!(cls.category, Category::Explicit);
        assert_eq!(cls.confidence, 85);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let classifier = FallbackClassifier::new();
        let cls = classifier.classify_text("BUY NOW while stocks last");
        assert_eq!(cls.category, Category::Spam);
    }

    #[test]
    fn hate_speech_outranks_spam() {
        let classifier = FallbackClassifier::new();
        // Contains both a hate keyword and a spam keyword.
        let cls = classifier.classify_text("racist content, buy now");
        assert_eq!(cls.category, Category::HateSpeech);
        assert_eq!(cls.confidence, 75);
    }

    #[test]
    fn harassment_outranks_explicit_and_spam() {
        let classifier = FallbackClassifier::new();
        let cls = classifier.classify_text("a threat with explicit language, click here");
        assert_eq!(cls.category, Category::Harassment);
    }

    #[test]
    fn deterministic_over_repeated_calls() {
        let classifier = FallbackClassifier::new();
        let input = "free money, click here, buy now";
        let first = classifier.classify_text(input);
        for _ in 0..10 {
            assert_eq!(classifier.classify_text(input), first);
        }
    }

    #[test]
    fn fallback_never_sets_flagged_hint() {
        let classifier = FallbackClassifier::new();
        for input in ["racist", "bully", "porn", "buy now", "hello"] {
            assert!(!classifier.classify_text(input).flagged_hint);
        }
    }
}
