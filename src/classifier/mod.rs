//! Classifier adapter — two interchangeable strategies behind one contract.
//!
//! `classify` never fails: the external strategy degrades to the
//! deterministic keyword fallback on any transport or parse error, and the
//! fallback itself is infallible.

pub mod external;
pub mod fallback;
pub mod provider;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use external::ExternalClassifier;
pub use fallback::FallbackClassifier;
pub use provider::{CompletionBackend, LlmBackend, LlmConfig, create_backend};

use crate::error::ClassifierError;
use crate::model::Category;

/// Outcome of classifying one text blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// 0–100.
    pub confidence: u8,
    /// Classifier's own flag signal, independent of the rule set.
    /// The keyword fallback never sets this.
    pub flagged_hint: bool,
    /// Human-readable reasons, passed through as rationale.
    pub reasons: Vec<String>,
}

impl Classification {
    pub fn safe() -> Self {
        Self {
            category: Category::Safe,
            confidence: 0,
            flagged_hint: false,
            reasons: Vec::new(),
        }
    }

    /// Raw rationale payload persisted alongside the analysis.
    pub fn rationale(&self) -> serde_json::Value {
        serde_json::json!({
            "category": self.category,
            "confidence": self.confidence,
            "reasons": self.reasons,
            "flagged": self.flagged_hint,
        })
    }
}

/// The classification contract. Implementations must not error — degrade
/// to a deterministic safe default instead.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Classification;

    /// Short name for logging.
    fn name(&self) -> &str;
}

/// Build the configured classifier: external (with built-in fallback) when
/// an LLM backend is configured, keyword fallback only otherwise.
pub fn build_classifier(
    llm: Option<&LlmConfig>,
) -> Result<Arc<dyn Classifier>, ClassifierError> {
    match llm {
        Some(config) => {
            let backend = create_backend(config)?;
            Ok(Arc::new(ExternalClassifier::new(backend)))
        }
        None => {
            tracing::info!("No LLM backend configured, using keyword fallback classifier");
            Ok(Arc::new(FallbackClassifier::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_classification_has_zero_confidence() {
        let cls = Classification::safe();
        assert_eq!(cls.category, Category::Safe);
        assert_eq!(cls.confidence, 0);
        assert!(!cls.flagged_hint);
    }

    #[test]
    fn rationale_carries_raw_output() {
        let cls = Classification {
            category: Category::Spam,
            confidence: 90,
            flagged_hint: false,
            reasons: vec!["Contains keywords associated with spam".into()],
        };
        let rationale = cls.rationale();
        assert_eq!(rationale["category"], "spam");
        assert_eq!(rationale["confidence"], 90);
        assert_eq!(rationale["reasons"][0], "Contains keywords associated with spam");
        assert_eq!(rationale["flagged"], false);
    }

    #[test]
    fn build_without_llm_uses_fallback() {
        let classifier = build_classifier(None).unwrap();
        assert_eq!(classifier.name(), "keyword-fallback");
    }
}
