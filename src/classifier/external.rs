//! External classification strategy — one LLM call, fallback on any failure.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::fallback::FallbackClassifier;
use super::provider::CompletionBackend;
use super::{Classification, Classifier};
use crate::model::Category;

/// Classifier that delegates to an external completion backend and
/// degrades to the keyword fallback on transport or parse failures.
/// A single external attempt per classification — no retries.
pub struct ExternalClassifier {
    backend: Arc<dyn CompletionBackend>,
    fallback: FallbackClassifier,
}

impl ExternalClassifier {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            fallback: FallbackClassifier::new(),
        }
    }
}

#[async_trait]
impl Classifier for ExternalClassifier {
    async fn classify(&self, text: &str) -> Classification {
        let raw = match self.backend.complete(text).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    model = self.backend.model_name(),
                    error = %e,
                    "External classification failed, using keyword fallback"
                );
                return self.fallback.classify_text(text);
            }
        };

        match parse_verdict(&raw) {
            Ok(classification) => {
                debug!(
                    model = self.backend.model_name(),
                    category = %classification.category,
                    confidence = classification.confidence,
                    "External classification complete"
                );
                classification
            }
            Err(e) => {
                warn!(
                    model = self.backend.model_name(),
                    raw_response = %raw,
                    error = %e,
                    "Unparseable classifier response, using keyword fallback"
                );
                self.fallback.classify_text(text)
            }
        }
    }

    fn name(&self) -> &str {
        self.backend.model_name()
    }
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct RawVerdict {
    category: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    flagged: bool,
}

/// Parse the model's verdict into a `Classification`.
fn parse_verdict(raw: &str) -> Result<Classification, String> {
    let json_str = extract_json_object(raw);
    let verdict: RawVerdict =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let category = Category::from_str(&verdict.category)
        .map_err(|_| format!("unknown category: '{}'", verdict.category))?;

    Ok(Classification {
        category,
        confidence: verdict.confidence.clamp(0.0, 100.0).round() as u8,
        flagged_hint: verdict.flagged,
        reasons: verdict.reasons,
    })
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
