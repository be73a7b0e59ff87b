//! Assistant bridge: detected disease plus user question in, model text out
//!
//! Topic filtering is left entirely to the hosted model through the prompt;
//! nothing here classifies the question.

use crate::config::{AssistantConfig, ChatRequest, Message};
use crate::error::{LLMError, Result};
use crate::providers::{GoogleProvider, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// The one sentence the model must reply with for off-topic questions
pub const OFF_TOPIC_REFUSAL: &str = "Maaf, saya hanya dapat menjawab pertanyaan seputar penyakit tanaman stroberi, pertanian, dan perawatan tanaman.";

/// Build the single prompt sent for one chatbot turn
pub fn build_prompt(disease: &str, message: &str) -> String {
    format!(
        "You are a plant disease expert specializing in strawberry diseases. \
Provide helpful information about the following:

Disease detected: {disease}

User question: {message}

Rules:
- Only answer questions about the detected plant disease, farming, or plant care.
- If the question is about anything else, reply with exactly this sentence and nothing more: \"{refusal}\"
- Respond in Indonesian language only.
- Format your response using Markdown: ** for bold, * for bullet points.

Provide a concise, helpful response focusing on:
* Brief description of the disease
* Typical symptoms
* Potential treatments or management practices
* Prevention methods

Keep your response professional but easy to understand for farmers and gardeners.",
        disease = disease.trim(),
        message = message.trim(),
        refusal = OFF_TOPIC_REFUSAL,
    )
}

pub struct AssistantBridge {
    provider: Arc<dyn Provider>,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl AssistantBridge {
    pub fn new(provider: Arc<dyn Provider>, config: &AssistantConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: config.timeout(),
        }
    }

    /// Gemini-backed bridge; a missing key surfaces on the first `ask`
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        config.validate().map_err(LLMError::Config)?;
        let provider = GoogleProvider::from_config(config)?;
        if !provider.has_api_key() {
            warn!("GEMINI_API_KEY is not set; chatbot requests will fail");
        }
        Ok(Self::new(Arc::new(provider), config))
    }

    pub fn is_configured(&self) -> bool {
        self.provider.has_api_key()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Ask about `disease`; returns the model's raw text
    pub async fn ask(&self, disease: &str, message: &str) -> Result<String> {
        let request = ChatRequest {
            messages: vec![Message::user(build_prompt(disease, message))],
            model: None,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_output_tokens),
        };

        info!("Assistant question about '{}' via {}", disease, self.provider.name());
        let response = match tokio::time::timeout(self.timeout, self.provider.chat(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Assistant call failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                error!("Assistant call timed out after {:?}", self.timeout);
                return Err(LLMError::Timeout(self.timeout));
            }
        };

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_inputs() {
        let prompt = build_prompt("Gray Mold", "Bagaimana cara mengobatinya?");
        assert!(prompt.contains("Disease detected: Gray Mold"));
        assert!(prompt.contains("User question: Bagaimana cara mengobatinya?"));
    }

    #[test]
    fn test_prompt_constraints() {
        let prompt = build_prompt("Leaf Spot", "cuaca besok?");
        assert!(prompt.contains(OFF_TOPIC_REFUSAL));
        assert!(prompt.contains("Indonesian language only"));
        assert!(prompt.contains("** for bold"));
        assert!(prompt.contains("* for bullet points"));
        assert!(prompt.contains("farming, or plant care"));
    }

    #[test]
    fn test_prompt_trims_inputs() {
        let prompt = build_prompt("  Anthracnose Fruit Rot \n", "\tapa ini? ");
        assert!(prompt.contains("Disease detected: Anthracnose Fruit Rot\n"));
        assert!(prompt.contains("User question: apa ini?\n"));
    }

    #[test]
    fn test_from_config_rejects_plain_http() {
        let config = AssistantConfig {
            base_url: "http://example.com/v1beta".to_string(),
            ..AssistantConfig::default()
        };
        assert!(AssistantBridge::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_without_key() {
        let bridge = AssistantBridge::from_config(&AssistantConfig::default()).unwrap();
        assert!(!bridge.is_configured());
        assert_eq!(bridge.provider_name(), "google");
    }

    #[test]
    fn test_ask_without_key_fails_cleanly() {
        let bridge = AssistantBridge::from_config(&AssistantConfig::default()).unwrap();
        let err = tokio_test::block_on(bridge.ask("Leaf Spot", "apa ini?")).unwrap_err();
        assert!(matches!(err, LLMError::MissingApiKey(_)));
    }
}
