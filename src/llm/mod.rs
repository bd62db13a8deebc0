//! AI generation for outreach drafts.
//!
//! The engine only needs single-shot text generation, so the provider trait
//! is one call. The Anthropic implementation goes through rig-core.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::anthropic;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

/// A text generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt` under the given system preamble.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u64,
        temperature: f64,
    ) -> Result<String, LlmError>;
}

/// Anthropic via rig-core.
pub struct AnthropicProvider {
    client: rig::client::Client<anthropic::client::AnthropicExt>,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &SecretString, model: &str) -> Result<Self, LlmError> {
        let client: rig::client::Client<anthropic::client::AnthropicExt> =
            anthropic::Client::new(api_key.expose_secret()).map_err(|e| {
                LlmError::RequestFailed {
                    provider: "anthropic".to_string(),
                    reason: format!("Failed to create Anthropic client: {}", e),
                }
            })?;
        Ok(Self {
            client,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u64,
        temperature: f64,
    ) -> Result<String, LlmError> {
        let agent = self
            .client
            .agent(self.model.as_str())
            .preamble(system)
            .max_tokens(max_tokens)
            .temperature(temperature)
            .build();

        let text = agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: e.to_string(),
            })?;

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: "anthropic".to_string(),
                reason: "empty completion".to_string(),
            });
        }
        Ok(text)
    }
}

/// Build the generation provider, or `None` when no credential is configured.
pub fn create_provider(
    api_key: Option<&SecretString>,
    model: &str,
) -> Result<Option<Arc<dyn LlmProvider>>, LlmError> {
    let Some(key) = api_key else {
        tracing::warn!("ANTHROPIC_API_KEY not set; drafts will not be composed");
        return Ok(None);
    };
    let provider = AnthropicProvider::new(key, model)?;
    tracing::info!("Using Anthropic (model: {})", model);
    Ok(Some(Arc::new(provider)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_disables_generation() {
        let provider = create_provider(None, "claude-test").unwrap();
        assert!(provider.is_none());
    }
}
