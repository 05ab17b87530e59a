//! LLM completion backends for the external classifier.
//!
//! Uses rig-core for HTTP transport. The moderation system prompt is baked
//! into the agent as its preamble; `complete` sends one content blob and
//! returns the raw model output.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::ExposeSecret;

use crate::error::ClassifierError;

/// System prompt for the moderation completion. Requests a structured JSON
/// verdict constrained to the known categories.
pub const MODERATION_PREAMBLE: &str = "You are a content moderation AI. Analyze the following \
content and determine if it violates any content policies. Specifically look for: hate speech, \
harassment, explicit content, or spam.\n\n\
Respond with ONLY a JSON object with the following fields:\n\
- category: one of hate_speech, spam, harassment, explicit, safe\n\
- confidence: a number between 0 and 100 indicating your confidence\n\
- reasons: an array of short reasons why the content might violate policies\n\
- flagged: a boolean indicating if the content should be flagged for review";

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a completion backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// One-shot completion contract consumed by the external classifier.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send one content blob, return the raw model output. A single
    /// attempt — retries are not part of this contract.
    async fn complete(&self, content: &str) -> Result<String, ClassifierError>;
}

struct RigBackend<M: rig::completion::CompletionModel> {
    agent: rig::agent::Agent<M>,
    model: String,
    provider: &'static str,
}

#[async_trait]
impl<M> CompletionBackend for RigBackend<M>
where
    M: rig::completion::CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, content: &str) -> Result<String, ClassifierError> {
        self.agent
            .prompt(content)
            .await
            .map_err(|e| ClassifierError::Backend {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Create a completion backend from configuration.
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn CompletionBackend>, ClassifierError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_backend(config),
        LlmBackend::OpenAi => create_openai_backend(config),
    }
}

fn create_anthropic_backend(
    config: &LlmConfig,
) -> Result<Arc<dyn CompletionBackend>, ClassifierError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ClassifierError::Backend {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .preamble(MODERATION_PREAMBLE)
        .temperature(0.0)
        .build();
    tracing::info!("Using Anthropic classifier backend (model: {})", config.model);
    Ok(Arc::new(RigBackend {
        agent,
        model: config.model.clone(),
        provider: "anthropic",
    }))
}

fn create_openai_backend(
    config: &LlmConfig,
) -> Result<Arc<dyn CompletionBackend>, ClassifierError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ClassifierError::Backend {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .preamble(MODERATION_PREAMBLE)
        .temperature(0.0)
        .build();
    tracing::info!("Using OpenAI classifier backend (model: {})", config.model);
    Ok(Arc::new(RigBackend {
        agent,
        model: config.model.clone(),
        provider: "openai",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_backend_constructs_with_any_key() {
        // rig-core clients accept any string as API key at construction
        // time; auth failures happen at request time.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-sonnet-4-20250514".to_string(),
        };
        let backend = create_backend(&config);
        assert!(backend.is_ok());
        assert_eq!(backend.unwrap().model_name(), "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn create_openai_backend_constructs() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let backend = create_backend(&config);
        assert!(backend.is_ok());
        assert_eq!(backend.unwrap().model_name(), "gpt-4o");
    }

    #[test]
    fn preamble_names_every_category() {
        for category in ["hate_speech", "spam", "harassment", "explicit", "safe"] {
            assert!(MODERATION_PREAMBLE.contains(category));
        }
    }
}
