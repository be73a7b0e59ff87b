use crate::config::*;
use crate::error::{LLMError, Result};
use crate::providers::trait_impl::Provider as ProviderTrait;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Gemini `generateContent` client
pub struct GoogleProvider {
    api_key: Arc<RwLock<Option<String>>>,
    client: Client,
    base_url: String,
    model: String,
}

impl GoogleProvider {
    pub fn new() -> Self {
        Self {
            api_key: Arc::new(RwLock::new(None)),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Build a provider from config; the client carries the request timeout
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(LLMError::HttpRequest)?;

        let mut provider = Self {
            api_key: Arc::new(RwLock::new(None)),
            client,
            base_url: String::new(),
            model: config.model.clone(),
        }
        .with_base_url(&config.base_url)?;

        if let Some(key) = config.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            provider.set_api_key(key.clone());
        }
        Ok(provider)
    }

    /// Point the provider at another endpoint. Only https is accepted, except
    /// for loopback hosts.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        validate_base_url(base_url)?;
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    fn get_api_key(&self) -> Result<String> {
        self.api_key
            .read()
            .as_ref()
            .cloned()
            .ok_or_else(|| LLMError::MissingApiKey("Google".to_string()))
    }
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_base_url(base_url: &str) -> Result<()> {
    let url = Url::parse(base_url)
        .map_err(|e| LLMError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;

    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(&url) => Ok(()),
        _ => Err(LLMError::Config(format!(
            "Base URL must use https: {}",
            base_url
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

/// Collect the reply text from a `generateContent` response body
fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    let candidates = json["candidates"].as_array().map(Vec::as_slice).unwrap_or(&[]);

    if candidates.is_empty() {
        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            return Err(LLMError::Blocked(reason.to_string()));
        }
        return Err(LLMError::InvalidResponse("No candidates in response".to_string()));
    }

    let text: String = candidates[0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        if let Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) =
            candidates[0]["finishReason"].as_str()
        {
            return Err(LLMError::Blocked(reason.to_string()));
        }
        return Err(LLMError::InvalidResponse("Candidate has no text".to_string()));
    }

    Ok(text)
}

#[async_trait]
impl ProviderTrait for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn has_api_key(&self) -> bool {
        self.api_key.read().is_some()
    }

    fn set_api_key(&mut self, key: String) {
        *self.api_key.write() = Some(key);
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let api_key = self.get_api_key()?;
        let model = request.model.unwrap_or_else(|| self.model.clone());

        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": "user", "parts": [{"text": m.content}]}))
            .collect();

        let mut generation_config = json!({});
        if let Some(temp) = request.temperature {
            generation_config["temperature"] = json!(temp.clamp(0.0, 2.0));
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens.min(8192));
        }

        let body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });

        // Key travels in a header so it never shows up in URLs or error text
        let model_encoded = urlencoding::encode(&model);
        let url = format!("{}/models/{}:generateContent", self.base_url, model_encoded);
        debug!("Gemini request to model {}", model);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::HttpRequest(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Gemini returned HTTP {}", status);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimit,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LLMError::AuthenticationFailed,
                _ => LLMError::Provider(format!(
                    "HTTP {}: {}",
                    status,
                    text.chars().take(512).collect::<String>()
                )),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("Body is not JSON: {}", e.without_url())))?;

        let content = parse_generate_response(&json)?;

        let usage = json.get("usageMetadata").and_then(|u| {
            Some(Usage {
                prompt_tokens: u["promptTokenCount"].as_u64()? as u32,
                completion_tokens: u["candidatesTokenCount"].as_u64()? as u32,
                total_tokens: u["totalTokenCount"].as_u64()? as u32,
            })
        });

        Ok(ChatResponse {
            content,
            model,
            usage,
            finish_reason: json["candidates"][0]["finishReason"].as_str().map(|s| s.to_string()),
        })
    }
}
