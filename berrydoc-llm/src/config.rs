use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Assistant settings; the API key normally comes from `GEMINI_API_KEY`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 2000,
            timeout_secs: 30,
        }
    }
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("assistant.model must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("assistant.temperature must be within [0, 2]".to_string());
        }
        if self.max_output_tokens == 0 || self.max_output_tokens > 8192 {
            return Err("assistant.max_output_tokens must be between 1 and 8192".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("assistant.timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// One user turn; the chatbot never replays history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
